//! bytecache - A sharded in-process byte cache
//!
//! Stores byte values under string keys in per-shard arenas, expires them
//! after a life window and evicts the oldest entries when memory runs out.
//! An optional HTTP front-end serves one cache instance over REST.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{ByteCache, Metadata, RemoveReason, Response, Stats};
pub use config::{CacheConfig, ServerConfig};
pub use error::{CacheError, Result};
