//! Error types for the Vault API server.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vaultfall_engine::TickError;
use vaultfall_store::StoreError;

/// Errors that can occur in the Vault API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with the vault's current state (paused,
    /// or a tick already in flight).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An invalid query parameter was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VaultNotFound(id) => Self::NotFound(format!("vault {id}")),
            StoreError::IncidentNotFound(id) => Self::NotFound(format!("incident {id}")),
            StoreError::LeaseHeld(id) => {
                Self::Conflict(format!("vault {id} is being processed"))
            }
            StoreError::StaleCommit(id) => {
                Self::Conflict(format!("vault {id} changed while the tick was computing"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TickError> for ApiError {
    fn from(err: TickError) -> Self {
        match err {
            TickError::VaultNotFound(id) => Self::NotFound(format!("vault {id}")),
            TickError::VaultPaused(id) => Self::Conflict(format!("vault {id} is paused")),
            TickError::Contention(id) => {
                Self::Conflict(format!("vault {id} is already being processed"))
            }
            TickError::Timeout(id) => Self::Internal(format!("tick for vault {id} timed out")),
            TickError::Store(e) => Self::from(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::InvalidQuery(msg) | Self::InvalidUuid(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
