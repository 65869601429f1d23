pub mod auth;
pub mod cart;
pub mod catalog;
pub mod download;
pub mod middleware;
pub mod purchases;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::error::ApiError;
pub use middleware::require_auth;
pub use rest::ApiDoc;
use state::AppState;

/// Parses a path segment as an id, answering with the error envelope on failure.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("'{}' is not a valid id", raw)))
}

/// Builds the complete application: `/api` routes, Swagger UI and the HTTP layers.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/datasets", get(catalog::list_datasets_handler))
        .route("/datasets/{dataset_id}", get(catalog::get_dataset_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/user", get(auth::current_user_handler))
        .route(
            "/cart",
            get(cart::get_cart_handler).post(cart::add_to_cart_handler),
        )
        .route("/cart/{dataset_id}", delete(cart::remove_from_cart_handler))
        .route("/purchase", post(purchases::checkout_handler))
        .route("/purchases", get(purchases::list_purchases_handler))
        .route("/purchases/{dataset_id}", get(purchases::get_purchase_handler))
        .route("/download/{dataset_id}", get(download::download_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state);

    Ok(Router::new()
        .nest("/api", api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
