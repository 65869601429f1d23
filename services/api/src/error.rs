//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and the single
//! error envelope every failed request is answered with.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marketplace_core::{AccessError, CheckoutError, PackagingError, PortError};
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The download gate refused the request.
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// The encrypted archive could not be produced.
    #[error("Packaging error: {0}")]
    Packaging(#[from] PackagingError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Machine-readable error kind, e.g. `access_denied`.
    pub kind: String,
    /// Human-readable message, safe to show to end users.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

const TRY_AGAIN: &str = "Something went wrong on our side. Please try again later.";

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotAuthenticated
            | ApiError::Access(AccessError::NotAuthenticated)
            | ApiError::Port(PortError::Unauthorized) => StatusCode::UNAUTHORIZED,
            ApiError::Access(AccessError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Conflict(_))
            | ApiError::Checkout(CheckoutError::AlreadyPurchased(_))
            | ApiError::Checkout(CheckoutError::Port(PortError::Conflict(_))) => {
                StatusCode::CONFLICT
            }
            ApiError::BadRequest(_) | ApiError::Checkout(CheckoutError::EmptyCart) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Packaging(PackagingError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotAuthenticated
            | ApiError::Access(AccessError::NotAuthenticated)
            | ApiError::Port(PortError::Unauthorized) => "not_authenticated",
            ApiError::Access(AccessError::AccessDenied { .. }) => "access_denied",
            ApiError::NotFound(_) | ApiError::Port(PortError::NotFound(_)) => "not_found",
            ApiError::Port(PortError::Conflict(_))
            | ApiError::Checkout(CheckoutError::AlreadyPurchased(_))
            | ApiError::Checkout(CheckoutError::Port(PortError::Conflict(_))) => "conflict",
            ApiError::Checkout(CheckoutError::EmptyCart) => "empty_cart",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Packaging(PackagingError::SourceMissing) => "source_missing",
            ApiError::Packaging(PackagingError::Timeout(_)) => "packaging_timeout",
            ApiError::Packaging(_) => "packaging_failed",
            _ => "internal",
        }
    }

    /// Builds the client-facing envelope. Server-side faults never expose their
    /// diagnostics; those only go to the log.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (message, detail) = match self {
            ApiError::NotAuthenticated
            | ApiError::Access(AccessError::NotAuthenticated)
            | ApiError::Port(PortError::Unauthorized) => {
                ("Not authenticated".to_string(), None)
            }
            ApiError::Access(AccessError::AccessDenied { .. }) => {
                ("You have not purchased this dataset".to_string(), None)
            }
            ApiError::NotFound(what) | ApiError::Port(PortError::NotFound(what)) => {
                ("Not found".to_string(), Some(what.clone()))
            }
            ApiError::Checkout(CheckoutError::AlreadyPurchased(id)) => (
                "Dataset has already been purchased".to_string(),
                Some(id.to_string()),
            ),
            ApiError::Port(PortError::Conflict(_))
            | ApiError::Checkout(CheckoutError::Port(PortError::Conflict(_))) => {
                ("Conflicting request".to_string(), None)
            }
            ApiError::Checkout(CheckoutError::EmptyCart) => ("Cart is empty".to_string(), None),
            ApiError::BadRequest(reason) => ("Bad request".to_string(), Some(reason.clone())),
            ApiError::Packaging(PackagingError::SourceMissing) => (
                "The dataset file is currently unavailable. Please try again later.".to_string(),
                None,
            ),
            ApiError::Packaging(PackagingError::Timeout(_)) => (
                "Preparing the download took too long. Please try again later.".to_string(),
                None,
            ),
            ApiError::Packaging(_) => (
                "The download could not be prepared. Please try again later.".to_string(),
                None,
            ),
            _ => (TRY_AGAIN.to_string(), None),
        };
        ErrorEnvelope {
            kind: self.kind().to_string(),
            message,
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            error!(kind, error = %self, "Request failed");
        } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            info!(kind, reason = %self, "Request denied");
        } else {
            warn!(kind, error = %self, "Request rejected");
        }
        (status, Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn access_denied_is_forbidden_without_detail() {
        let err = ApiError::from(AccessError::AccessDenied {
            user_id: Uuid::new_v4(),
            dataset_id: Uuid::new_v4(),
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let envelope = err.envelope();
        assert_eq!(envelope.kind, "access_denied");
        assert!(envelope.detail.is_none());
    }

    #[test]
    fn packaging_failures_hide_tool_output() {
        let err = ApiError::from(PackagingError::ToolFailed(
            "ERROR: /srv/data/finance/global.csv: cannot open".to_string(),
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = err.envelope();
        assert_eq!(envelope.kind, "packaging_failed");
        assert!(!envelope.message.contains("/srv/data"));
        assert!(envelope.detail.is_none());
    }

    #[test]
    fn timeout_has_its_own_kind() {
        let err = ApiError::from(PackagingError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "packaging_timeout");
    }

    #[test]
    fn source_missing_is_a_server_error() {
        let err = ApiError::from(PackagingError::SourceMissing);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "source_missing");
    }

    #[test]
    fn envelope_omits_empty_detail() {
        let json = serde_json::to_value(ApiError::NotAuthenticated.envelope()).unwrap();
        assert_eq!(json["kind"], "not_authenticated");
        assert!(json.get("detail").is_none());
    }
}
