//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `PUT /set/:key` - Store a value
//! - `GET /get/:key`, `GET /info/:key` - Retrieve a value or its status
//! - `DELETE /del/:key` - Delete a key
//! - `GET /metadata/:key` - Entry request count
//! - `POST /reset` - Drop all entries
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
