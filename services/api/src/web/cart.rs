//! services/api/src/web/cart.rs
//!
//! The signed-in user's shopping cart.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use marketplace_core::CartLine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorEnvelope};
use crate::web::{parse_id, state::AppState};

#[derive(Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub dataset_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct CartItemView {
    pub dataset_id: Uuid,
    pub title: String,
    pub price: f64,
}

#[derive(Serialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemView>,
    pub total: f64,
}

impl From<Vec<CartLine>> for CartResponse {
    fn from(lines: Vec<CartLine>) -> Self {
        let total = lines.iter().map(|line| line.price).sum();
        let items = lines
            .into_iter()
            .map(|line| CartItemView {
                dataset_id: line.dataset_id,
                title: line.title,
                price: line.price,
            })
            .collect();
        Self { items, total }
    }
}

/// Show the cart.
#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 401, description = "Not signed in", body = ErrorEnvelope)
    )
)]
pub async fn get_cart_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<CartResponse>, ApiError> {
    let lines = state.carts.cart_items(user_id).await?;
    Ok(Json(lines.into()))
}

/// Add a dataset to the cart. Adding it twice keeps a single line.
#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 401, description = "Not signed in", body = ErrorEnvelope),
        (status = 404, description = "No such dataset", body = ErrorEnvelope)
    )
)]
pub async fn add_to_cart_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    if state.catalog.dataset_by_id(req.dataset_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Dataset {} not found",
            req.dataset_id
        )));
    }
    state.carts.add_to_cart(user_id, req.dataset_id).await?;
    let lines = state.carts.cart_items(user_id).await?;
    Ok(Json(lines.into()))
}

/// Remove a dataset from the cart.
#[utoipa::path(
    delete,
    path = "/api/cart/{dataset_id}",
    params(("dataset_id" = Uuid, Path, description = "Dataset id")),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 401, description = "Not signed in", body = ErrorEnvelope)
    )
)]
pub async fn remove_from_cart_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dataset_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let dataset_id = parse_id(&dataset_id)?;
    state.carts.remove_from_cart(user_id, dataset_id).await?;
    let lines = state.carts.cart_items(user_id).await?;
    Ok(Json(lines.into()))
}
