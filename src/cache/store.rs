//! Cache Store Module
//!
//! Main cache engine: routes keys to shards, stamps entries with the clock,
//! owns the background sweeper and delivers removal events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::cache::clock::millis;
use crate::cache::eviction::{Notifier, RemovalEvent};
use crate::cache::shard::{Lookup, Shard, ShardSettings};
use crate::cache::{Clock, Metadata, RemoveReason, SharedHasher, ShardRouter, Stats, REMOVAL_LOG_CAPACITY};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_cleanup_task, CleanupHandle, ExpirySweep};

// == Response ==
/// Extra information returned by [`ByteCache::get_with_info`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Removal reason of the entry, if it was removed
    pub entry_status: Option<RemoveReason>,
}

// == Cache Core ==
/// State shared between the cache handle and its sweeper thread.
struct CacheCore {
    shards: Box<[Shard]>,
    router: ShardRouter,
    hasher: SharedHasher,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    closed: AtomicBool,
}

impl CacheCore {
    #[inline]
    fn shard(&self, hash: u64) -> &Shard {
        &self.shards[self.router.route(hash)]
    }

    /// Runs `op` against the shard owning `key` and delivers the removal
    /// events it produced once the shard lock is released.
    fn with_shard<T>(&self, key: &str, op: impl FnOnce(&Shard, u64, &mut Vec<RemovalEvent>) -> T) -> T {
        let hash = self.hasher.sum64(key);
        let mut events = Vec::new();
        let result = op(self.shard(hash), hash, &mut events);
        self.notifier.dispatch(events);
        result
    }
}

impl ExpirySweep for CacheCore {
    fn sweep(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let now = self.clock.now_ms();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut events = Vec::new();
            removed += shard.sweep_expired(now, &mut events);
            self.notifier.dispatch(events);
        }
        removed
    }
}

// == Byte Cache ==
/// Concurrent, sharded byte cache.
///
/// Entries live for the configured life window and are evicted oldest first
/// when a shard runs out of space. All methods take `&self`; share the cache
/// between threads behind an `Arc`. Dropping the cache stops its sweeper.
pub struct ByteCache {
    core: Arc<CacheCore>,
    sweeper: Mutex<Option<CleanupHandle>>,
}

impl ByteCache {
    // == Constructor ==
    /// Creates a cache and starts its sweeper when `clean_window` is non-zero.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Internal` if the sweeper cannot be started
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let router = ShardRouter::new(config.shards)?;

        let notifier = Notifier::select(
            config.on_remove.clone(),
            config.on_remove_with_reason.clone(),
            config.on_remove_with_metadata.clone(),
            config.on_remove_filter,
        );
        let settings = ShardSettings {
            life_window_ms: millis(config.life_window),
            max_entry_size: config.max_entry_size,
            initial_capacity: config.initial_shard_size(),
            max_capacity: config.max_shard_size(),
            index_capacity: config.initial_shard_entries(),
            removal_log_capacity: REMOVAL_LOG_CAPACITY,
            stats_enabled: config.stats_enabled,
            interest: notifier.interest(),
            verbose: config.verbose,
        };
        let shards: Box<[Shard]> = (0..config.shards)
            .map(|id| Shard::new(id, settings.clone()))
            .collect();

        let core = Arc::new(CacheCore {
            shards,
            router,
            hasher: config.hasher.clone(),
            clock: config.clock.clone(),
            notifier,
            closed: AtomicBool::new(false),
        });

        let sweeper = if config.clean_window.is_zero() {
            None
        } else {
            Some(spawn_cleanup_task(core.clone(), config.clean_window)?)
        };

        info!(
            shards = config.shards,
            life_window = ?config.life_window,
            clean_window = ?config.clean_window,
            shard_size = settings.initial_capacity,
            "Cache initialized"
        );

        Ok(Self {
            core,
            sweeper: Mutex::new(sweeper),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// May evict the oldest entries of the key's shard to make room.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let now = self.core.clock.now_ms();
        self.core
            .with_shard(key, |shard, hash, events| shard.set(hash, key, value, now, events))
    }

    // == Get ==
    /// Returns a copy of the value stored under `key`.
    ///
    /// # Errors
    /// `NotFound` if the key was never set, has expired or was removed.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.get_with_info(key).map(|(value, _)| value)
    }

    /// Like [`get`](Self::get), and on a miss the error carries the reason
    /// the entry was last removed, when still known.
    pub fn get_with_info(&self, key: &str) -> Result<(Vec<u8>, Response)> {
        self.ensure_open()?;
        let now = self.core.clock.now_ms();
        let lookup = self
            .core
            .with_shard(key, |shard, hash, events| shard.get(hash, key, now, events))?;

        match lookup {
            Lookup::Hit(value) => Ok((value, Response::default())),
            Lookup::Miss(status) => Err(CacheError::not_found(key, status)),
        }
    }

    // == Delete ==
    /// Removes the entry for `key`.
    ///
    /// # Errors
    /// `NotFound` if there is no live entry for the key.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        let removed = self
            .core
            .with_shard(key, |shard, hash, events| shard.delete(hash, key, events))?;
        if removed {
            Ok(())
        } else {
            Err(CacheError::not_found(key, None))
        }
    }

    // == Reset ==
    /// Removes every entry and shrinks all shards back to their initial size.
    /// No removal events are emitted.
    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        for shard in self.core.shards.iter() {
            shard.reset()?;
        }
        info!("Cache reset");
        Ok(())
    }

    // == Introspection ==
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.core.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated arena bytes across all shards, including dead entries.
    pub fn capacity(&self) -> usize {
        self.core.shards.iter().map(Shard::capacity).sum()
    }

    /// Sum of the counters of all shards.
    pub fn stats(&self) -> Stats {
        let mut total = Stats::default();
        for shard in self.core.shards.iter() {
            total += shard.stats();
        }
        total
    }

    /// Request metadata of the live entry for `key`. Zero when the key is
    /// absent or stats are disabled.
    pub fn key_metadata(&self, key: &str) -> Metadata {
        let hash = self.core.hasher.sum64(key);
        self.core.shard(hash).key_metadata(hash, key)
    }

    pub fn shard_count(&self) -> usize {
        self.core.router.shard_count()
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    // == Close ==
    /// Stops the sweeper and frees all entries. Every later operation fails
    /// with `Closed`.
    ///
    /// # Errors
    /// `Closed` if the cache was already closed.
    pub fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Closed);
        }
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        for shard in self.core.shards.iter() {
            shard.release();
        }
        info!("Cache closed");
        Ok(())
    }
}

impl fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteCache")
            .field("shards", &self.core.shards.len())
            .field("notifier", &self.core.notifier)
            .field("closed", &self.is_closed())
            .field("sweeper", &self.sweeper.lock().is_some())
            .finish()
    }
}
