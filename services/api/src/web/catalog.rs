//! services/api/src/web/catalog.rs
//!
//! Read-only dataset catalog endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use marketplace_core::Dataset;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorEnvelope};
use crate::web::{parse_id, state::AppState};

/// Public view of a dataset. The storage location is never exposed.
#[derive(Serialize, ToSchema)]
pub struct DatasetView {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
}

impl From<Dataset> for DatasetView {
    fn from(dataset: Dataset) -> Self {
        Self {
            id: dataset.id,
            title: dataset.title,
            slug: dataset.slug,
            description: dataset.description,
            price: dataset.price,
        }
    }
}

/// List every dataset on offer.
#[utoipa::path(
    get,
    path = "/api/datasets",
    responses(
        (status = 200, description = "The catalog", body = [DatasetView]),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
pub async fn list_datasets_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DatasetView>>, ApiError> {
    let datasets = state.catalog.list_datasets().await?;
    Ok(Json(datasets.into_iter().map(DatasetView::from).collect()))
}

/// Fetch one dataset.
#[utoipa::path(
    get,
    path = "/api/datasets/{dataset_id}",
    params(("dataset_id" = Uuid, Path, description = "Dataset id")),
    responses(
        (status = 200, description = "The dataset", body = DatasetView),
        (status = 404, description = "No such dataset", body = ErrorEnvelope)
    )
)]
pub async fn get_dataset_handler(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<DatasetView>, ApiError> {
    let dataset_id = parse_id(&dataset_id)?;
    let dataset = state
        .catalog
        .dataset_by_id(dataset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Dataset {} not found", dataset_id)))?;
    Ok(Json(dataset.into()))
}
