//! Cache Module
//!
//! Provides a sharded in-memory byte cache with expiry windows and oldest-first
//! eviction.
//!
//! Keys are hashed once; the hash selects a shard and indexes the entry inside
//! it. Each shard keeps its entries serialized back to back in a single byte
//! arena behind its own lock, so storing an entry never allocates per entry.

mod arena;
mod clock;
mod entry;
mod eviction;
mod hash;
mod json;
mod shard;
mod stats;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use eviction::{
    OnRemoveFn, OnRemoveWithMetadataFn, OnRemoveWithReasonFn, ReasonSet, RemovalEvent, RemoveReason,
};
pub use hash::{Fnv64a, KeyHasher, ShardRouter, SharedHasher};
pub use stats::{Metadata, Stats};
pub use store::{ByteCache, Response};

// == Public Constants ==
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;
pub const GB: usize = 1024 * MB;

/// Lower bound for the expected number of entries per shard
pub const MIN_SHARD_ENTRIES: usize = 10;

/// Number of recent removals remembered per shard for `get_with_info`
pub const REMOVAL_LOG_CAPACITY: usize = 1024;
