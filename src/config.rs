//! Configuration Module
//!
//! `CacheConfig` describes one cache instance and is built in code.
//! `ServerConfig` loads the HTTP server settings from environment variables
//! and turns them into a `CacheConfig`.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    Clock, KeyHasher, Metadata, OnRemoveFn, OnRemoveWithMetadataFn, OnRemoveWithReasonFn, ReasonSet,
    RemoveReason, SharedHasher, SystemClock, MIN_SHARD_ENTRIES,
};
use crate::error::{CacheError, Result};

// == Cache Config ==
/// Parameters of one cache instance.
///
/// Build with [`CacheConfig::new`] and the `with_*` methods; the values are
/// validated when the cache is constructed.
#[derive(Clone)]
pub struct CacheConfig {
    /// Number of shards, must be a power of two
    pub shards: usize,
    /// Age after which an entry counts as expired
    pub life_window: Duration,
    /// Interval of the background expiry sweep, zero disables it
    pub clean_window: Duration,
    /// Expected number of entries within one life window; only sizes the
    /// initial arenas and indexes
    pub max_entries_in_window: usize,
    /// Expected and maximum value size in bytes
    pub max_entry_size: usize,
    /// Upper bound for all arenas together in bytes, 0 = unlimited
    pub hard_max_cache_size: usize,
    /// Track per-entry request counts
    pub stats_enabled: bool,
    /// Log arena growth at info level
    pub verbose: bool,
    pub hasher: SharedHasher,
    pub clock: Arc<dyn Clock>,
    pub on_remove: Option<OnRemoveFn>,
    pub on_remove_with_reason: Option<OnRemoveWithReasonFn>,
    pub on_remove_with_metadata: Option<OnRemoveWithMetadataFn>,
    /// Reasons passed to the reason and metadata callbacks
    pub on_remove_filter: ReasonSet,
}

impl CacheConfig {
    /// Creates a configuration with default values and the given life window.
    pub fn new(life_window: Duration) -> Self {
        Self {
            shards: 1024,
            life_window,
            clean_window: Duration::from_secs(1),
            max_entries_in_window: 1000 * 10 * 60,
            max_entry_size: 500,
            hard_max_cache_size: 0,
            stats_enabled: false,
            verbose: false,
            hasher: SharedHasher::default(),
            clock: Arc::new(SystemClock),
            on_remove: None,
            on_remove_with_reason: None,
            on_remove_with_metadata: None,
            on_remove_filter: ReasonSet::ALL,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_clean_window(mut self, clean_window: Duration) -> Self {
        self.clean_window = clean_window;
        self
    }

    pub fn with_max_entries_in_window(mut self, entries: usize) -> Self {
        self.max_entries_in_window = entries;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn with_hard_max_cache_size(mut self, bytes: usize) -> Self {
        self.hard_max_cache_size = bytes;
        self
    }

    pub fn with_stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_hasher(mut self, hasher: impl KeyHasher + 'static) -> Self {
        self.hasher = SharedHasher::new(hasher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_on_remove<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.on_remove = Some(Arc::new(callback));
        self
    }

    pub fn with_on_remove_with_reason<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8], RemoveReason) + Send + Sync + 'static,
    {
        self.on_remove_with_reason = Some(Arc::new(callback));
        self
    }

    pub fn with_on_remove_with_metadata<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &[u8], Metadata) + Send + Sync + 'static,
    {
        self.on_remove_with_metadata = Some(Arc::new(callback));
        self
    }

    /// Restricts the reason and metadata callbacks to `reasons`.
    pub fn with_on_remove_filter(mut self, reasons: impl IntoIterator<Item = RemoveReason>) -> Self {
        self.on_remove_filter = reasons.into_iter().collect();
        self
    }

    // == Validation ==
    /// Checks the parameters that would make a cache unusable.
    ///
    /// # Errors
    /// Returns `CacheError::Config` describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 || !self.shards.is_power_of_two() {
            return Err(CacheError::Config(format!(
                "shard count must be a power of two, got {}",
                self.shards
            )));
        }
        if self.max_entry_size == 0 {
            return Err(CacheError::Config("max_entry_size must be greater than zero".to_string()));
        }
        if self.hard_max_cache_size > 0 && self.hard_max_cache_size < self.shards {
            return Err(CacheError::Config(format!(
                "hard_max_cache_size of {} bytes leaves no room for {} shards",
                self.hard_max_cache_size, self.shards
            )));
        }
        Ok(())
    }

    // == Derived Sizes ==
    /// Largest arena of one shard in bytes, 0 = unbounded.
    pub fn max_shard_size(&self) -> usize {
        if self.hard_max_cache_size > 0 {
            self.hard_max_cache_size / self.shards
        } else {
            0
        }
    }

    /// Expected number of entries per shard.
    pub fn initial_shard_entries(&self) -> usize {
        (self.max_entries_in_window / self.shards.max(1)).max(MIN_SHARD_ENTRIES)
    }

    /// Initial arena size of one shard in bytes.
    pub fn initial_shard_size(&self) -> usize {
        let size = self.initial_shard_entries().saturating_mul(self.max_entry_size);
        match self.max_shard_size() {
            0 => size,
            max => size.min(max),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10 * 60))
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("shards", &self.shards)
            .field("life_window", &self.life_window)
            .field("clean_window", &self.clean_window)
            .field("max_entries_in_window", &self.max_entries_in_window)
            .field("max_entry_size", &self.max_entry_size)
            .field("hard_max_cache_size", &self.hard_max_cache_size)
            .field("stats_enabled", &self.stats_enabled)
            .field("verbose", &self.verbose)
            .field("on_remove", &self.on_remove.is_some())
            .field("on_remove_with_reason", &self.on_remove_with_reason.is_some())
            .field("on_remove_with_metadata", &self.on_remove_with_metadata.is_some())
            .field("on_remove_filter", &self.on_remove_filter)
            .finish_non_exhaustive()
    }
}

// == Server Config ==
/// HTTP server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub shards: usize,
    /// Entry life window in seconds
    pub life_window: u64,
    /// Sweep interval in seconds
    pub clean_window: u64,
    pub max_entries_in_window: usize,
    pub max_entry_size: usize,
    pub hard_max_cache_size: usize,
    pub stats_enabled: bool,
    pub verbose: bool,
    /// HTTP server port
    pub server_port: u16,
}

impl ServerConfig {
    /// Creates a new ServerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SHARDS` - Number of shards (default: 16)
    /// - `LIFE_WINDOW` - Entry life window in seconds (default: 300)
    /// - `CLEAN_WINDOW` - Sweep interval in seconds, 0 disables (default: 1)
    /// - `MAX_ENTRIES_IN_WINDOW` - Expected entry count (default: 1024)
    /// - `MAX_ENTRY_SIZE` - Maximum value size in bytes (default: 16384)
    /// - `HARD_MAX_CACHE_SIZE` - Memory ceiling in bytes, 0 = unlimited (default: 0)
    /// - `STATS_ENABLED` - Track per-entry request counts (default: true)
    /// - `VERBOSE` - Log arena growth at info level (default: false)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shards: env_or("SHARDS", defaults.shards),
            life_window: env_or("LIFE_WINDOW", defaults.life_window),
            clean_window: env_or("CLEAN_WINDOW", defaults.clean_window),
            max_entries_in_window: env_or("MAX_ENTRIES_IN_WINDOW", defaults.max_entries_in_window),
            max_entry_size: env_or("MAX_ENTRY_SIZE", defaults.max_entry_size),
            hard_max_cache_size: env_or("HARD_MAX_CACHE_SIZE", defaults.hard_max_cache_size),
            stats_enabled: env_or("STATS_ENABLED", defaults.stats_enabled),
            verbose: env_or("VERBOSE", defaults.verbose),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Builds the configuration of the served cache.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new(Duration::from_secs(self.life_window))
            .with_shards(self.shards)
            .with_clean_window(Duration::from_secs(self.clean_window))
            .with_max_entries_in_window(self.max_entries_in_window)
            .with_max_entry_size(self.max_entry_size)
            .with_hard_max_cache_size(self.hard_max_cache_size)
            .with_stats_enabled(self.stats_enabled)
            .with_verbose(self.verbose)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            life_window: 300,
            clean_window: 1,
            max_entries_in_window: 1024,
            max_entry_size: 16 * 1024,
            hard_max_cache_size: 0,
            stats_enabled: true,
            verbose: false,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
