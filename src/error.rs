//! Error types for the cache and its HTTP front-end
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::cache::RemoveReason;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No live entry exists for the key. `status` carries the last known
    /// removal reason when the key was removed recently.
    #[error("Entry not found: {key}")]
    NotFound {
        key: String,
        status: Option<RemoveReason>,
    },

    /// The entry cannot be stored under the configured limits
    #[error("Entry too large: {size} bytes exceeds limit of {limit} bytes")]
    EntryTooLarge { size: usize, limit: usize },

    /// The configuration was rejected at construction
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The cache was closed
    #[error("Cache is closed")]
    Closed,

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn not_found(key: impl Into<String>, status: Option<RemoveReason>) -> Self {
        CacheError::NotFound {
            key: key.into(),
            status,
        }
    }

    /// Removal reason attached to a `NotFound`, if any.
    pub fn entry_status(&self) -> Option<RemoveReason> {
        match self {
            CacheError::NotFound { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CacheError::NotFound { .. } => StatusCode::NOT_FOUND,
            CacheError::EntryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Config(_) | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            entry_status: self.entry_status(),
        });

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
