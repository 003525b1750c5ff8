//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.
//!
//! Cache operations are synchronous and only hold one shard lock for a short
//! copy, so the handlers call them directly.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::cache::ByteCache;
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::models::requests::validate_key;
use crate::models::{
    DeleteResponse, HealthResponse, InfoResponse, MetadataResponse, ResetResponse, SetRequest,
    SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Shared cache instance
    pub cache: Arc<ByteCache>,
}

impl AppState {
    /// Creates a new AppState with the given cache.
    pub fn new(cache: ByteCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// # Errors
    /// Fails if the configured cache parameters are invalid.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let cache = ByteCache::new(config.to_cache_config())?;
        Ok(Self::new(cache))
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(error_msg) => Err(CacheError::InvalidRequest(error_msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
///
/// Stores a JSON `{ key, value }` pair; the value is stored as UTF-8 bytes.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&req.key, req.value.as_bytes())?;

    Ok(Json(SetResponse::new(req.key, req.value.len())))
}

/// Handler for PUT /set/:key
///
/// Stores the raw request body under the key from the path.
pub async fn set_raw_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<SetResponse>> {
    check_key(&key)?;
    state.cache.set(&key, &body)?;

    Ok(Json(SetResponse::new(key, body.len())))
}

/// Handler for GET /get/:key
///
/// Returns the stored bytes as `application/octet-stream`.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let value = state.cache.get(&key)?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], value))
}

/// Handler for GET /info/:key
///
/// Describes the entry, or answers 404 with the reason it was removed.
pub async fn info_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InfoResponse>> {
    let (value, response) = state.cache.get_with_info(&key)?;

    Ok(Json(InfoResponse {
        key,
        size: value.len(),
        entry_status: response.entry_status,
    }))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key)?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /metadata/:key
pub async fn metadata_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<MetadataResponse> {
    let metadata = state.cache.key_metadata(&key);
    Json(MetadataResponse::new(key, metadata))
}

/// Handler for POST /reset
pub async fn reset_handler(State(state): State<AppState>) -> Result<Json<ResetResponse>> {
    state.cache.reset()?;
    Ok(Json(ResetResponse::new()))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = &state.cache;
    Json(StatsResponse::new(cache.stats(), cache.len(), cache.capacity()))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    if state.cache.is_closed() {
        Json(HealthResponse::closed())
    } else {
        Json(HealthResponse::healthy())
    }
}
