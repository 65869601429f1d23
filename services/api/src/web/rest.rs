//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::error::ErrorEnvelope;
use crate::web::{auth, cart, catalog, download, purchases};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::current_user_handler,
        catalog::list_datasets_handler,
        catalog::get_dataset_handler,
        cart::get_cart_handler,
        cart::add_to_cart_handler,
        cart::remove_from_cart_handler,
        purchases::checkout_handler,
        purchases::list_purchases_handler,
        purchases::get_purchase_handler,
        download::download_handler,
    ),
    components(
        schemas(
            ErrorEnvelope,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            catalog::DatasetView,
            cart::AddToCartRequest,
            cart::CartItemView,
            cart::CartResponse,
            purchases::PurchaseView,
            purchases::PurchaseSummaryView,
            purchases::PurchaseDetailResponse,
            purchases::CheckoutResponse,
        )
    ),
    tags(
        (name = "Data Marketplace API", description = "Catalog, checkout and encrypted dataset delivery.")
    )
)]
pub struct ApiDoc;
