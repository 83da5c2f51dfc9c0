//! Error types for the explorer

use thiserror::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use rpc_core::RpcError;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Chain identity mismatch: expected {expected}, node reports {actual}")]
    ChainIdentityMismatch { expected: String, actual: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ExplorerError>;

impl ExplorerError {
    /// Whether ingesting the same block again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExplorerError::NotFound(_)
                | ExplorerError::UpstreamUnavailable(_)
                | ExplorerError::PersistenceConflict(_)
        )
    }

    /// Errors that must stop ingestion entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExplorerError::ChainIdentityMismatch { .. })
    }
}

impl From<RpcError> for ExplorerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::NotFound(what) => ExplorerError::NotFound(what),
            RpcError::Network(_) | RpcError::Timeout(_) => {
                ExplorerError::UpstreamUnavailable(err.to_string())
            }
            RpcError::Rpc { .. } | RpcError::Internal(_) => {
                ExplorerError::UpstreamUnavailable(err.to_string())
            }
        }
    }
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ExplorerError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            ExplorerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
            ExplorerError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, "Upstream unavailable"),
            ExplorerError::PersistenceConflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ExplorerError::ChainIdentityMismatch { .. } => (StatusCode::SERVICE_UNAVAILABLE, "Wrong chain"),
            ExplorerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            ExplorerError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error"),
            ExplorerError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO error"),
            ExplorerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
            ExplorerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
