//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, info_handler, metadata_handler, reset_handler,
    set_handler, set_raw_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a JSON key-value pair
/// - `PUT /set/:key` - Store the raw request body
/// - `GET /get/:key` - Retrieve the raw value
/// - `GET /info/:key` - Describe an entry or why it is gone
/// - `DELETE /del/:key` - Delete a key
/// - `GET /metadata/:key` - Request count of an entry
/// - `POST /reset` - Drop all entries
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router with all endpoints
    Router::new()
        .route("/set", put(set_handler))
        .route("/set/:key", put(set_raw_handler))
        .route("/get/:key", get(get_handler))
        .route("/info/:key", get(info_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/metadata/:key", get(metadata_handler))
        .route("/reset", post(reset_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
