//! Key Hashing and Shard Routing
//!
//! Maps string keys to 64-bit hashes and hashes to shard indices.

use std::fmt;
use std::sync::Arc;

use crate::error::{CacheError, Result};

// == FNV-1a Constants ==
const FNV_OFFSET64: u64 = 14695981039346656037;
const FNV_PRIME64: u64 = 1099511628211;

// == Key Hasher ==
/// Hashes a key into the 64-bit value used for routing and indexing.
///
/// Implementations must be deterministic. The hasher is fixed for the lifetime
/// of a cache instance: every index entry is keyed by its output.
pub trait KeyHasher: Send + Sync {
    fn sum64(&self, key: &str) -> u64;
}

impl<F> KeyHasher for F
where
    F: Fn(&str) -> u64 + Send + Sync,
{
    fn sum64(&self, key: &str) -> u64 {
        self(key)
    }
}

/// FNV-1a 64-bit hasher. Allocation-free and the default for new caches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv64a;

impl KeyHasher for Fnv64a {
    fn sum64(&self, key: &str) -> u64 {
        let mut hash = FNV_OFFSET64;
        for byte in key.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME64);
        }
        hash
    }
}

/// Shared handle to a hasher, as stored in the cache configuration.
#[derive(Clone)]
pub struct SharedHasher(Arc<dyn KeyHasher>);

impl SharedHasher {
    pub fn new(hasher: impl KeyHasher + 'static) -> Self {
        Self(Arc::new(hasher))
    }

    #[inline]
    pub fn sum64(&self, key: &str) -> u64 {
        self.0.sum64(key)
    }
}

impl Default for SharedHasher {
    fn default() -> Self {
        Self::new(Fnv64a)
    }
}

impl fmt::Debug for SharedHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedHasher(..)")
    }
}

// == Shard Router ==
/// Selects a shard for a key hash with a bitmask.
///
/// The shard count must be a power of two so that `hash & mask` covers every
/// shard uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    mask: u64,
}

impl ShardRouter {
    // == Constructor ==
    /// Creates a router for `shards` shards.
    ///
    /// # Errors
    /// Returns `CacheError::Config` if `shards` is zero or not a power of two.
    pub fn new(shards: usize) -> Result<Self> {
        if shards == 0 || !shards.is_power_of_two() {
            return Err(CacheError::Config(format!(
                "shard count must be a power of two, got {}",
                shards
            )));
        }
        Ok(Self {
            mask: (shards - 1) as u64,
        })
    }

    /// Returns the shard index for a key hash.
    #[inline]
    pub fn route(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    pub fn shard_count(&self) -> usize {
        self.mask as usize + 1
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv_known_vectors() {
        // Reference values for FNV-1a 64
        assert_eq!(Fnv64a.sum64(""), 0xcbf29ce484222325);
        assert_eq!(Fnv64a.sum64("a"), 0xaf63dc4c8601ec8c);
        assert_eq!(Fnv64a.sum64("foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_fnv_is_deterministic() {
        let first = Fnv64a.sum64("user:123");
        let second = Fnv64a.sum64("user:123");
        assert_eq!(first, second);
        assert_ne!(first, Fnv64a.sum64("user:124"));
    }

    #[test]
    fn test_closure_hasher() {
        let hasher = SharedHasher::new(|key: &str| key.len() as u64);
        assert_eq!(hasher.sum64("abcd"), 4);
    }

    #[test]
    fn test_router_rejects_non_power_of_two() {
        assert!(matches!(ShardRouter::new(0), Err(CacheError::Config(_))));
        assert!(matches!(ShardRouter::new(3), Err(CacheError::Config(_))));
        assert!(matches!(ShardRouter::new(1000), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_router_masks_hash() {
        let router = ShardRouter::new(16).unwrap();
        assert_eq!(router.shard_count(), 16);
        assert_eq!(router.route(0x1234), 0x4);
        assert_eq!(router.route(u64::MAX), 15);

        let single = ShardRouter::new(1).unwrap();
        assert_eq!(single.route(u64::MAX), 0);
    }

    #[test]
    fn test_router_distribution_covers_all_shards() {
        let router = ShardRouter::new(8).unwrap();
        let mut seen = [false; 8];
        for i in 0..1000 {
            seen[router.route(Fnv64a.sum64(&format!("key_{}", i)))] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
