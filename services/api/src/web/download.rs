//! services/api/src/web/download.rs
//!
//! `GET /api/download/{dataset_id}`: authorize, package, stream, clean up.

use axum::{
    extract::{Path, State},
    response::Response,
    Extension,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::delivery::stream_and_cleanup;
use crate::error::{ApiError, ErrorEnvelope};
use crate::web::{parse_id, state::AppState};

/// Download a purchased dataset as a password-protected ZIP.
///
/// The archive is rebuilt for every request with the purchase's key and removed
/// from the server once the transfer ends.
#[utoipa::path(
    get,
    path = "/api/download/{dataset_id}",
    params(("dataset_id" = Uuid, Path, description = "Dataset id")),
    responses(
        (status = 200, description = "Encrypted archive", content_type = "application/zip", body = Vec<u8>),
        (status = 401, description = "Not signed in", body = ErrorEnvelope),
        (status = 403, description = "Dataset not purchased", body = ErrorEnvelope),
        (status = 404, description = "No such dataset", body = ErrorEnvelope),
        (status = 500, description = "Archive could not be prepared", body = ErrorEnvelope),
        (status = 504, description = "Packaging timed out", body = ErrorEnvelope)
    )
)]
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dataset_id): Path<String>,
) -> Result<Response, ApiError> {
    let dataset_id = parse_id(&dataset_id)?;

    // Nothing touches the disk before ownership is established.
    let purchase = state
        .guard
        .authorize_download(Some(user_id), dataset_id)
        .await?;

    let dataset = state
        .catalog
        .dataset_by_id(dataset_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Dataset {} not found", dataset_id)))?;

    let archive = state.delivery.prepare(&dataset, &purchase).await?;
    info!(
        purchase_id = %purchase.id,
        file = archive.download_name(),
        "Streaming encrypted archive"
    );
    stream_and_cleanup(archive).await
}
