//! services/api/src/web/purchases.rs
//!
//! Checkout and purchase history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use marketplace_core::{checkout, Purchase, PurchaseSummary};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorEnvelope};
use crate::web::{catalog::DatasetView, parse_id, state::AppState};

/// A purchase as shown to its owner, including the archive password.
#[derive(Serialize, ToSchema)]
pub struct PurchaseView {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub amount: f64,
    pub encryption_key: String,
    pub purchase_date: DateTime<Utc>,
    pub status: String,
}

impl From<Purchase> for PurchaseView {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id,
            dataset_id: purchase.dataset_id,
            amount: purchase.amount,
            encryption_key: purchase.encryption_key.expose().to_string(),
            purchase_date: purchase.purchase_date,
            status: purchase.status.as_str().to_string(),
        }
    }
}

/// One line of the purchase history. Keys are only served per dataset.
#[derive(Serialize, ToSchema)]
pub struct PurchaseSummaryView {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub dataset_title: String,
    pub amount: f64,
    pub purchase_date: DateTime<Utc>,
    pub status: String,
}

impl From<PurchaseSummary> for PurchaseSummaryView {
    fn from(summary: PurchaseSummary) -> Self {
        let purchase = summary.purchase;
        Self {
            id: purchase.id,
            dataset_id: purchase.dataset_id,
            dataset_title: summary.dataset_title,
            amount: purchase.amount,
            purchase_date: purchase.purchase_date,
            status: purchase.status.as_str().to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub purchases: Vec<PurchaseView>,
}

/// Buy everything in the cart.
///
/// Mints one key per dataset and records all purchases atomically; the cart is
/// emptied in the same step.
#[utoipa::path(
    post,
    path = "/api/purchase",
    responses(
        (status = 201, description = "Purchases recorded", body = CheckoutResponse),
        (status = 400, description = "Cart is empty", body = ErrorEnvelope),
        (status = 401, description = "Not signed in", body = ErrorEnvelope),
        (status = 409, description = "A dataset in the cart is already owned", body = ErrorEnvelope)
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let purchases = checkout(state.carts.as_ref(), state.ledger.as_ref(), user_id).await?;
    info!(
        user_id = %user_id,
        count = purchases.len(),
        "Checkout completed"
    );
    let response = CheckoutResponse {
        purchases: purchases.into_iter().map(PurchaseView::from).collect(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// The signed-in user's purchase history, newest first.
#[utoipa::path(
    get,
    path = "/api/purchases",
    responses(
        (status = 200, description = "Purchase history", body = [PurchaseSummaryView]),
        (status = 401, description = "Not signed in", body = ErrorEnvelope)
    )
)]
pub async fn list_purchases_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<PurchaseSummaryView>>, ApiError> {
    let summaries = state.ledger.list_purchases(user_id).await?;
    Ok(Json(
        summaries.into_iter().map(PurchaseSummaryView::from).collect(),
    ))
}

/// A purchase together with the dataset it unlocks.
#[derive(Serialize, ToSchema)]
pub struct PurchaseDetailResponse {
    pub purchase: PurchaseView,
    pub dataset: DatasetView,
}

/// The purchase granting access to a dataset, with its key.
///
/// Only the owning user can see it; anyone else gets `access_denied`.
#[utoipa::path(
    get,
    path = "/api/purchases/{dataset_id}",
    params(("dataset_id" = Uuid, Path, description = "Dataset id")),
    responses(
        (status = 200, description = "The purchase and its dataset", body = PurchaseDetailResponse),
        (status = 401, description = "Not signed in", body = ErrorEnvelope),
        (status = 403, description = "Dataset not purchased", body = ErrorEnvelope),
        (status = 404, description = "Dataset no longer listed", body = ErrorEnvelope)
    )
)]
pub async fn get_purchase_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dataset_id): Path<String>,
) -> Result<Json<PurchaseDetailResponse>, ApiError> {
    let dataset_id = parse_id(&dataset_id)?;
    let purchase = state
        .guard
        .authorize_download(Some(user_id), dataset_id)
        .await?;
    let dataset = state
        .catalog
        .dataset_by_id(dataset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Dataset {} not found", dataset_id)))?;

    Ok(Json(PurchaseDetailResponse {
        purchase: purchase.into(),
        dataset: dataset.into(),
    }))
}
