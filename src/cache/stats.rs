//! Cache Statistics Module
//!
//! Tracks hits, misses, delete hits/misses and key collisions per shard, and
//! the per-entry request metadata reported by `key_metadata`.

use std::ops::AddAssign;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

// == Stats Snapshot ==
/// Point-in-time view of the cache counters.
///
/// Each counter is read atomically on its own; under concurrent load the
/// counters of one snapshot may be slightly skewed against each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of successfully found keys
    pub hits: i64,
    /// Number of lookups that found nothing (absent, expired or deleted)
    pub misses: i64,
    /// Number of successfully deleted keys
    #[serde(rename = "delete_hits")]
    pub del_hits: i64,
    /// Number of deletes for keys that were not present
    #[serde(rename = "delete_misses")]
    pub del_misses: i64,
    /// Number of times two distinct keys shared a full hash
    pub collisions: i64,
}

impl Stats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.del_hits += other.del_hits;
        self.del_misses += other.del_misses;
        self.collisions += other.collisions;
    }
}

// == Key Metadata ==
/// Per-entry information tracked when stats are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Number of successful lookups of the entry since it was set
    pub request_count: u32,
}

// == Shard Stats ==
/// Lock-free counters owned by one shard.
#[derive(Debug, Default)]
pub(crate) struct ShardStats {
    hits: AtomicI64,
    misses: AtomicI64,
    del_hits: AtomicI64,
    del_misses: AtomicI64,
    collisions: AtomicI64,
}

impl ShardStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_del_hit(&self) {
        self.del_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_del_miss(&self) {
        self.del_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            del_misses: self.del_misses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
        }
    }
}
