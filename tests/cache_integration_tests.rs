//! Integration Tests for the Cache API
//!
//! Exercises the public `ByteCache` surface: expiry, eviction under a memory
//! ceiling, removal callbacks, collisions and concurrent use.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytecache::cache::{ByteCache, ManualClock, Metadata, RemoveReason, KB};
use bytecache::{CacheConfig, CacheError};
use parking_lot::Mutex;

// == Helper Functions ==

fn manual_config(life_window: Duration) -> (CacheConfig, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let config = CacheConfig::new(life_window)
        .with_shards(16)
        .with_clean_window(Duration::ZERO)
        .with_max_entries_in_window(256)
        .with_max_entry_size(256)
        .with_clock(clock.clone());
    (config, clock)
}

type Removed = Arc<Mutex<Vec<(String, RemoveReason)>>>;

fn recording(config: CacheConfig) -> (CacheConfig, Removed) {
    let removed: Removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    let config = config.with_on_remove_with_reason(move |key, _, reason| {
        sink.lock().push((key.to_string(), reason));
    });
    (config, removed)
}

// == Basic Examples ==

#[test]
fn test_single_shard_roundtrip() {
    let config = CacheConfig::new(Duration::from_secs(10))
        .with_shards(1)
        .with_clean_window(Duration::ZERO)
        .with_max_entries_in_window(16);
    let cache = ByteCache::new(config).unwrap();

    cache.set("abc", b"123").unwrap();
    assert_eq!(cache.get("abc").unwrap(), b"123");
}

#[test]
fn test_expired_after_life_window() {
    let (config, clock) = manual_config(Duration::from_secs(1));
    let cache = ByteCache::new(config).unwrap();

    cache.set("abc", b"x").unwrap();
    clock.advance(Duration::from_secs(2));

    assert!(matches!(cache.get("abc"), Err(CacheError::NotFound { .. })));
    // The removal is remembered for later lookups
    let err = cache.get_with_info("abc").unwrap_err();
    assert_eq!(err.entry_status(), Some(RemoveReason::Expired));
}

#[test]
fn test_set_again_clears_removal_status() {
    let (config, _) = manual_config(Duration::from_secs(60));
    let cache = ByteCache::new(config).unwrap();

    cache.set("k", b"1").unwrap();
    cache.delete("k").unwrap();
    cache.set("k", b"2").unwrap();
    cache.delete("k").unwrap();
    assert_eq!(cache.get_with_info("k").unwrap_err().entry_status(), Some(RemoveReason::Deleted));

    cache.set("k", b"3").unwrap();
    let (value, response) = cache.get_with_info("k").unwrap();
    assert_eq!(value, b"3");
    assert_eq!(response.entry_status, None);
}

// == Background Sweep ==

#[test]
fn test_background_sweep_reports_expired() {
    let (config, clock) = manual_config(Duration::from_secs(5));
    let (config, removed) = recording(config.with_clean_window(Duration::from_millis(10)));
    let cache = ByteCache::new(config).unwrap();

    for i in 0..10 {
        cache.set(&format!("key_{}", i), b"value").unwrap();
    }
    clock.advance(Duration::from_secs(6));

    let mut waited = Duration::ZERO;
    while removed.lock().len() < 10 && waited < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    let removed = removed.lock().clone();
    assert_eq!(removed.len(), 10);
    assert!(removed.iter().all(|(_, reason)| *reason == RemoveReason::Expired));
    assert_eq!(cache.len(), 0);
    cache.close().unwrap();
}

// == Space Pressure ==

#[test]
fn test_evicts_oldest_under_hard_limit() {
    let (config, _) = manual_config(Duration::from_secs(600));
    let config = config
        .with_shards(1)
        .with_max_entries_in_window(1)
        .with_max_entry_size(100)
        .with_hard_max_cache_size(KB);
    let (config, removed) = recording(config);
    let cache = ByteCache::new(config).unwrap();

    // Each entry takes 4 + 22 + 5 + 100 = 131 bytes, so 7 fit into 1 KB
    let value = [1u8; 100];
    for i in 0..7 {
        cache.set(&format!("key_{}", i), &value).unwrap();
    }
    assert!(removed.lock().is_empty());

    cache.set("key_7", &value).unwrap();
    cache.set("key_8", &value).unwrap();

    let removed = removed.lock().clone();
    assert_eq!(
        removed,
        vec![
            ("key_0".to_string(), RemoveReason::NoSpace),
            ("key_1".to_string(), RemoveReason::NoSpace),
        ]
    );
    assert_eq!(cache.len(), 7);
    assert!(cache.capacity() <= KB);
    assert_eq!(cache.get_with_info("key_0").unwrap_err().entry_status(), Some(RemoveReason::NoSpace));
    assert!(cache.get("key_8").is_ok());
}

#[test]
fn test_rejects_entry_larger_than_shard() {
    let (config, _) = manual_config(Duration::from_secs(600));
    let config = config
        .with_shards(2)
        .with_max_entry_size(4 * KB)
        .with_hard_max_cache_size(2 * KB);
    let cache = ByteCache::new(config).unwrap();

    let result = cache.set("big", &[0u8; 2 * KB]);
    assert!(matches!(result, Err(CacheError::EntryTooLarge { .. })));
    assert_eq!(cache.len(), 0);
}

// == Callbacks ==

#[test]
fn test_callback_precedence_and_filter() {
    let (config, _) = manual_config(Duration::from_secs(60));
    let bare_calls = Arc::new(Mutex::new(0));
    let metadata_calls = Arc::new(Mutex::new(Vec::new()));

    let bare = bare_calls.clone();
    let with_metadata = metadata_calls.clone();
    let config = config
        .with_stats_enabled(true)
        .with_on_remove(move |_, _| *bare.lock() += 1)
        .with_on_remove_with_metadata(move |key, value, metadata| {
            with_metadata.lock().push((key.to_string(), value.to_vec(), metadata));
        })
        .with_on_remove_filter([RemoveReason::Deleted]);
    let cache = ByteCache::new(config).unwrap();

    cache.set("a", b"1").unwrap();
    cache.get("a").unwrap();
    cache.get("a").unwrap();
    cache.delete("a").unwrap();

    assert_eq!(*bare_calls.lock(), 0, "metadata callback takes precedence");
    assert_eq!(
        *metadata_calls.lock(),
        vec![("a".to_string(), b"1".to_vec(), Metadata { request_count: 2 })]
    );
}

#[test]
fn test_filtered_reason_is_not_reported() {
    let (config, clock) = manual_config(Duration::from_secs(1));
    let (config, removed) = recording(config.with_on_remove_filter([RemoveReason::Deleted]));
    let cache = ByteCache::new(config).unwrap();

    cache.set("expiring", b"v").unwrap();
    clock.advance(Duration::from_secs(2));
    assert!(cache.get("expiring").is_err());
    assert!(removed.lock().is_empty());

    cache.set("deleted", b"v").unwrap();
    cache.delete("deleted").unwrap();
    assert_eq!(*removed.lock(), vec![("deleted".to_string(), RemoveReason::Deleted)]);
}

// == Collisions ==

#[test]
fn test_hash_collisions_are_resolved_by_key() {
    let (config, _) = manual_config(Duration::from_secs(60));
    let cache = ByteCache::new(config.with_hasher(|_: &str| 42u64)).unwrap();

    cache.set("a", b"1").unwrap();
    cache.set("b", b"2").unwrap();
    assert_eq!(cache.get("a").unwrap(), b"1");
    assert_eq!(cache.get("b").unwrap(), b"2");

    // One collision on insert of "b", one on the lookup that had to skip "a"
    assert_eq!(cache.stats().collisions, 2);
    assert_eq!(cache.len(), 2);
}

// == Concurrency ==

const WORKERS: usize = 8;
const ROUNDS: usize = 500;

/// Value written by `worker` in `round`: a `key|worker|round|` unit repeated
/// one to five times.
fn value_for(key: &str, worker: usize, round: usize) -> Vec<u8> {
    format!("{}|{}|{}|", key, worker, round)
        .repeat(round % 5 + 1)
        .into_bytes()
}

/// Asserts `value` is exactly one write made for `key`.
fn assert_written_for(key: &str, value: &[u8]) {
    let text = std::str::from_utf8(value).unwrap();
    let mut fields = text.splitn(4, '|');
    let (stored_key, worker, round) = (
        fields.next().unwrap(),
        fields.next().unwrap().parse::<usize>().unwrap(),
        fields.next().unwrap().parse::<usize>().unwrap(),
    );
    assert_eq!(stored_key, key);
    assert!(worker < WORKERS);
    assert_eq!(round % 3, 0);
    assert_eq!(value, &value_for(key, worker, round)[..]);
}

fn run_mixed_workload(cache: &Arc<ByteCache>) {
    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let cache = cache.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let key = format!("key_{}", (worker * 7 + round) % 64);
                    match round % 3 {
                        0 => cache.set(&key, &value_for(&key, worker, round)).unwrap(),
                        1 => {
                            if let Ok(value) = cache.get(&key) {
                                assert_written_for(&key, &value);
                            }
                        }
                        _ => {
                            let _ = cache.delete(&key);
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = cache.stats();
    // Each worker ran 167 gets and 166 deletes
    assert_eq!(stats.hits + stats.misses, (WORKERS * 167) as i64);
    assert_eq!(stats.del_hits + stats.del_misses, (WORKERS * 166) as i64);
    assert!(cache.len() <= 64);

    for i in 0..64 {
        let key = format!("key_{}", i);
        if let Ok(value) = cache.get(&key) {
            assert_written_for(&key, &value);
        }
    }
}

#[test]
fn test_concurrent_access_never_mixes_values() {
    let (config, _) = manual_config(Duration::from_secs(600));
    let cache = Arc::new(ByteCache::new(config.with_max_entries_in_window(64)).unwrap());
    run_mixed_workload(&cache);
}

#[test]
fn test_concurrent_access_under_hard_limit() {
    let (config, _) = manual_config(Duration::from_secs(600));
    // One shard starts at 960 bytes, grows once to 1 KB and then evicts.
    // About 14 entries fit, fewer than stay live between deletes.
    let config = config
        .with_shards(1)
        .with_max_entries_in_window(4)
        .with_max_entry_size(96)
        .with_hard_max_cache_size(KB);
    let (config, removed) = recording(config);
    let cache = Arc::new(ByteCache::new(config).unwrap());

    run_mixed_workload(&cache);

    assert!(cache.capacity() <= KB);
    assert!(removed
        .lock()
        .iter()
        .any(|(_, reason)| *reason == RemoveReason::NoSpace));
}

#[test]
fn test_close_stops_operations_across_threads() {
    let (config, _) = manual_config(Duration::from_secs(600));
    let cache = Arc::new(ByteCache::new(config.with_clean_window(Duration::from_millis(5))).unwrap());
    cache.set("k", b"v").unwrap();

    let closer = {
        let cache = cache.clone();
        thread::spawn(move || cache.close())
    };
    closer.join().unwrap().unwrap();

    assert!(matches!(cache.get("k"), Err(CacheError::Closed)));
    assert!(matches!(cache.close(), Err(CacheError::Closed)));
}
