//! Shard Module
//!
//! One independently locked partition of the cache: a byte arena holding the
//! encoded entries and an index from key hash to arena location.
//!
//! Distinct keys sharing a full 64-bit hash live in the same index slot; the
//! first location is kept inline and the rest go to a small overflow list
//! that is resolved by comparing the stored key bytes.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::arena::{ByteArena, Relocation};
use crate::cache::entry::{self, EntryView};
use crate::cache::eviction::{ReasonSet, RemovalEvent, RemovalLog, RemoveReason};
use crate::cache::stats::{Metadata, ShardStats, Stats};
use crate::error::{CacheError, Result};

// == Shard Settings ==
/// Per-shard parameters derived from the cache configuration.
#[derive(Debug, Clone)]
pub(crate) struct ShardSettings {
    pub life_window_ms: u64,
    /// Largest accepted value in bytes, 0 = no limit
    pub max_entry_size: usize,
    pub initial_capacity: usize,
    /// Largest arena size in bytes, 0 = unbounded
    pub max_capacity: usize,
    pub index_capacity: usize,
    pub removal_log_capacity: usize,
    pub stats_enabled: bool,
    /// Reasons for which removed entries are decoded into events
    pub interest: ReasonSet,
    pub verbose: bool,
}

// == Lookup Result ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup {
    Hit(Vec<u8>),
    /// Carries the last known removal reason for the key, if any
    Miss(Option<RemoveReason>),
}

// == Index ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    offset: usize,
    request_count: u32,
}

impl Location {
    fn new(offset: usize) -> Self {
        Self {
            offset,
            request_count: 0,
        }
    }
}

#[derive(Debug)]
struct Slot {
    primary: Location,
    overflow: Vec<Location>,
}

impl Slot {
    fn iter(&self) -> impl Iterator<Item = &Location> {
        std::iter::once(&self.primary).chain(self.overflow.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Location> {
        std::iter::once(&mut self.primary).chain(self.overflow.iter_mut())
    }

    fn get_mut(&mut self, position: usize) -> Option<&mut Location> {
        match position {
            0 => Some(&mut self.primary),
            n => self.overflow.get_mut(n - 1),
        }
    }

    /// Removes a location; the flag is true when the slot became empty.
    fn remove(&mut self, position: usize) -> Option<(Location, bool)> {
        if position == 0 {
            let removed = self.primary;
            return match self.overflow.pop() {
                Some(next) => {
                    self.primary = next;
                    Some((removed, false))
                }
                None => Some((removed, true)),
            };
        }
        if position - 1 < self.overflow.len() {
            Some((self.overflow.swap_remove(position - 1), false))
        } else {
            None
        }
    }
}

/// Result of probing the index for a key.
#[derive(Debug, Default, Clone, Copy)]
struct Probe {
    position: Option<usize>,
    /// Another key occupies the slot, so key bytes had to be compared
    collision: bool,
}

#[derive(Debug, Default)]
struct Index {
    slots: HashMap<u64, Slot>,
    live: usize,
}

impl Index {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            live: 0,
        }
    }

    fn probe(&self, hash: u64, key: &[u8], arena: &ByteArena) -> Probe {
        let Some(slot) = self.slots.get(&hash) else {
            return Probe::default();
        };
        for (position, location) in slot.iter().enumerate() {
            let matches = arena
                .read(location.offset)
                .and_then(EntryView::decode)
                .is_some_and(|entry| entry.matches(hash, key));
            if matches {
                return Probe {
                    position: Some(position),
                    collision: position > 0,
                };
            }
        }
        Probe {
            position: None,
            collision: true,
        }
    }

    fn location(&self, hash: u64, position: usize) -> Option<Location> {
        self.slots.get(&hash).and_then(|slot| slot.iter().nth(position).copied())
    }

    fn location_mut(&mut self, hash: u64, position: usize) -> Option<&mut Location> {
        self.slots.get_mut(&hash).and_then(|slot| slot.get_mut(position))
    }

    fn position_of(&self, hash: u64, offset: usize) -> Option<usize> {
        self.slots
            .get(&hash)?
            .iter()
            .position(|location| location.offset == offset)
    }

    /// Adds a location; returns true when the slot already held other keys.
    fn insert(&mut self, hash: u64, location: Location) -> bool {
        self.live += 1;
        match self.slots.get_mut(&hash) {
            Some(slot) => {
                slot.overflow.push(location);
                true
            }
            None => {
                self.slots.insert(
                    hash,
                    Slot {
                        primary: location,
                        overflow: Vec::new(),
                    },
                );
                false
            }
        }
    }

    fn remove(&mut self, hash: u64, position: usize) -> Option<Location> {
        let slot = self.slots.get_mut(&hash)?;
        let (removed, emptied) = slot.remove(position)?;
        if emptied {
            self.slots.remove(&hash);
        }
        self.live -= 1;
        Some(removed)
    }

    /// Drops locations whose arena run no longer carries this hash.
    fn purge_stale(&mut self, hash: u64, arena: &ByteArena) -> usize {
        let Some(slot) = self.slots.get(&hash) else {
            return 0;
        };
        let stale: Vec<usize> = slot
            .iter()
            .enumerate()
            .filter(|(_, location)| {
                arena
                    .read(location.offset)
                    .and_then(EntryView::decode)
                    .map_or(true, |entry| entry.hash != hash)
            })
            .map(|(position, _)| position)
            .collect();

        // Highest position first so earlier positions stay valid
        for position in stale.iter().rev() {
            self.remove(hash, *position);
        }
        stale.len()
    }

    fn relocate(&mut self, relocation: Relocation) {
        for slot in self.slots.values_mut() {
            for location in slot.iter_mut() {
                location.offset = relocation.apply(location.offset);
            }
        }
    }
}

// == Shard State ==
#[derive(Debug)]
struct ShardState {
    arena: ByteArena,
    index: Index,
    removals: RemovalLog,
    released: bool,
}

impl ShardState {
    fn new(settings: &ShardSettings) -> Self {
        Self {
            arena: ByteArena::new(settings.initial_capacity, settings.max_capacity),
            index: Index::with_capacity(settings.index_capacity),
            removals: RemovalLog::new(settings.removal_log_capacity),
            released: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Removes the live entry at `position` of `hash`'s slot and tombstones
    /// its run.
    fn remove_at(
        &mut self,
        hash: u64,
        position: usize,
        reason: RemoveReason,
        interest: ReasonSet,
        events: &mut Vec<RemovalEvent>,
    ) -> bool {
        let Some(location) = self.index.remove(hash, position) else {
            return false;
        };
        if let Some(run) = self.arena.read_mut(location.offset) {
            if interest.contains(reason) {
                if let Some(entry) = EntryView::decode(run) {
                    events.push(RemovalEvent::from_entry(&entry, reason, location.request_count));
                }
            }
            entry::clear_hash(run);
        }
        self.removals.record(hash, reason);
        true
    }

    /// Pops the oldest run. If it was live, the entry is removed with
    /// `reason`. Returns false when the arena is empty.
    fn pop_oldest(&mut self, reason: RemoveReason, interest: ReasonSet, events: &mut Vec<RemovalEvent>) -> bool {
        let Some((offset, run)) = self.arena.oldest() else {
            return false;
        };
        let hash = EntryView::decode(run).map(|entry| entry.hash);

        if let Some(hash) = hash {
            if let Some(position) = self.index.position_of(hash, offset) {
                self.remove_at(hash, position, reason, interest, events);
            }
        }
        self.arena.pop_oldest().is_some()
    }

    /// Pops the oldest run once it is past the life window. Only a live
    /// entry produces an `Expired` removal.
    fn evict_oldest_if_expired(&mut self, now_ms: u64, settings: &ShardSettings, events: &mut Vec<RemovalEvent>) {
        let expired = self
            .arena
            .oldest()
            .and_then(|(_, run)| EntryView::decode(run))
            .is_some_and(|entry| entry.is_expired(now_ms, settings.life_window_ms));
        if expired {
            self.pop_oldest(RemoveReason::Expired, settings.interest, events);
        }
    }

    /// Pops tombstoned and replaced runs off the arena head.
    fn trim_dead_head(&mut self) -> usize {
        let mut trimmed = 0;
        loop {
            let dead = match self.arena.oldest() {
                Some((offset, run)) => EntryView::decode(run)
                    .map_or(true, |entry| self.index.position_of(entry.hash, offset).is_none()),
                None => false,
            };
            if !dead || self.arena.pop_oldest().is_none() {
                return trimmed;
            }
            trimmed += 1;
        }
    }
}

// == Shard ==
/// One partition of the cache, guarded by its own lock.
///
/// Removal events are appended to the caller's buffer while the lock is held
/// and must be dispatched by the caller after the call returns.
#[derive(Debug)]
pub(crate) struct Shard {
    id: usize,
    state: Mutex<ShardState>,
    stats: ShardStats,
    settings: ShardSettings,
}

impl Shard {
    // == Constructor ==
    pub fn new(id: usize, settings: ShardSettings) -> Self {
        Self {
            id,
            state: Mutex::new(ShardState::new(&settings)),
            stats: ShardStats::default(),
            settings,
        }
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry for the key.
    ///
    /// # Errors
    /// - `EntryTooLarge` if the key is longer than `u16::MAX` bytes, the value
    ///   exceeds `max_entry_size`, or the encoded entry exceeds the arena limit
    /// - `Closed` if the shard was released
    pub fn set(&self, hash: u64, key: &str, value: &[u8], now_ms: u64, events: &mut Vec<RemovalEvent>) -> Result<()> {
        let key_len = u16::try_from(key.len()).map_err(|_| CacheError::EntryTooLarge {
            size: key.len(),
            limit: u16::MAX as usize,
        })?;
        if self.settings.max_entry_size > 0 && value.len() > self.settings.max_entry_size {
            return Err(CacheError::EntryTooLarge {
                size: value.len(),
                limit: self.settings.max_entry_size,
            });
        }
        let value_len = u32::try_from(value.len()).map_err(|_| CacheError::EntryTooLarge {
            size: value.len(),
            limit: u32::MAX as usize,
        })?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;

        let encoded = entry::encoded_len(key.len(), value.len());
        if !state.arena.can_hold(encoded) {
            return Err(CacheError::EntryTooLarge {
                size: encoded,
                limit: self.settings.max_capacity,
            });
        }

        state.evict_oldest_if_expired(now_ms, &self.settings, events);

        // Replacing a key tombstones the previous bytes without an event
        state.index.purge_stale(hash, &state.arena);
        if let Some(position) = state.index.probe(hash, key.as_bytes(), &state.arena).position {
            if let Some(previous) = state.index.remove(hash, position) {
                if let Some(run) = state.arena.read_mut(previous.offset) {
                    entry::clear_hash(run);
                }
            }
        }
        state.trim_dead_head();

        let header = entry::encode_header(now_ms, hash, key_len, value_len);
        let capacity_before = state.arena.capacity();
        let pushed = loop {
            match state.arena.push(&[&header[..], key.as_bytes(), value]) {
                Ok(pushed) => break pushed,
                Err(_) => {
                    if !state.pop_oldest(RemoveReason::NoSpace, self.settings.interest, events) {
                        return Err(CacheError::EntryTooLarge {
                            size: encoded,
                            limit: state.arena.capacity(),
                        });
                    }
                }
            }
        };

        if let Some(relocation) = pushed.relocation {
            state.index.relocate(relocation);
        }
        if state.arena.capacity() != capacity_before {
            self.log_capacity(state.arena.capacity());
        }

        if state.index.insert(hash, Location::new(pushed.offset)) {
            self.stats.record_collision();
        }
        state.removals.forget(hash);
        Ok(())
    }

    // == Get ==
    /// Looks up `key`. Expired entries are removed on the spot and reported
    /// as a miss with reason `Expired`.
    pub fn get(&self, hash: u64, key: &str, now_ms: u64, events: &mut Vec<RemovalEvent>) -> Result<Lookup> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;

        state.index.purge_stale(hash, &state.arena);
        let probe = state.index.probe(hash, key.as_bytes(), &state.arena);
        if probe.collision {
            self.stats.record_collision();
        }

        let Some(position) = probe.position else {
            self.stats.record_miss();
            return Ok(Lookup::Miss(state.removals.last(hash)));
        };
        let Some(location) = state.index.location(hash, position) else {
            self.stats.record_miss();
            return Ok(Lookup::Miss(None));
        };

        let found = state.arena.read(location.offset).and_then(EntryView::decode).map(|entry| {
            if entry.is_expired(now_ms, self.settings.life_window_ms) {
                None
            } else {
                Some(entry.value.to_vec())
            }
        });

        match found {
            Some(Some(value)) => {
                if self.settings.stats_enabled {
                    if let Some(location) = state.index.location_mut(hash, position) {
                        location.request_count = location.request_count.saturating_add(1);
                    }
                }
                self.stats.record_hit();
                Ok(Lookup::Hit(value))
            }
            Some(None) => {
                state.remove_at(hash, position, RemoveReason::Expired, self.settings.interest, events);
                self.stats.record_miss();
                Ok(Lookup::Miss(Some(RemoveReason::Expired)))
            }
            None => {
                state.index.remove(hash, position);
                self.stats.record_miss();
                Ok(Lookup::Miss(None))
            }
        }
    }

    // == Delete ==
    /// Removes `key`. Returns false if there was no live entry for it.
    pub fn delete(&self, hash: u64, key: &str, events: &mut Vec<RemovalEvent>) -> Result<bool> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.ensure_open()?;

        state.index.purge_stale(hash, &state.arena);
        let removed = match state.index.probe(hash, key.as_bytes(), &state.arena).position {
            Some(position) => state.remove_at(hash, position, RemoveReason::Deleted, self.settings.interest, events),
            None => false,
        };

        if removed {
            self.stats.record_del_hit();
        } else {
            self.stats.record_del_miss();
        }
        Ok(removed)
    }

    // == Key Metadata ==
    pub fn key_metadata(&self, hash: u64, key: &str) -> Metadata {
        if !self.settings.stats_enabled {
            return Metadata::default();
        }
        let state = self.state.lock();
        state
            .index
            .probe(hash, key.as_bytes(), &state.arena)
            .position
            .and_then(|position| state.index.location(hash, position))
            .map(|location| Metadata {
                request_count: location.request_count,
            })
            .unwrap_or_default()
    }

    // == Sweep Expired ==
    /// Removes every live entry older than the life window and reclaims dead
    /// runs at the arena head. Returns the number of expired entries.
    pub fn sweep_expired(&self, now_ms: u64, events: &mut Vec<RemovalEvent>) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.released {
            return 0;
        }

        let expired: Vec<(u64, usize)> = state
            .index
            .slots
            .iter()
            .flat_map(|(hash, slot)| slot.iter().map(move |location| (*hash, location.offset)))
            .filter(|(_, offset)| {
                state
                    .arena
                    .read(*offset)
                    .and_then(EntryView::decode)
                    .is_some_and(|entry| entry.is_expired(now_ms, self.settings.life_window_ms))
            })
            .collect();

        let mut removed = 0;
        for (hash, offset) in expired {
            if let Some(position) = state.index.position_of(hash, offset) {
                if state.remove_at(hash, position, RemoveReason::Expired, self.settings.interest, events) {
                    removed += 1;
                }
            }
        }

        let trimmed = state.trim_dead_head();
        if removed > 0 || trimmed > 0 {
            debug!(shard = self.id, removed, trimmed, "Shard sweep reclaimed entries");
        }
        removed
    }

    // == Reset and Release ==
    /// Discards all entries and returns the arena to its initial size.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.arena.reset();
        state.index = Index::with_capacity(self.settings.index_capacity);
        state.removals.clear();
        Ok(())
    }

    /// Frees all memory. Every later operation fails with `Closed`.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.arena.release();
        state.index = Index::default();
        state.removals.clear();
        state.released = true;
    }

    // == Length and Capacity ==
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.lock().index.live
    }

    /// Allocated arena bytes.
    pub fn capacity(&self) -> usize {
        self.state.lock().arena.capacity()
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    fn log_capacity(&self, capacity: usize) {
        if self.settings.verbose {
            info!(shard = self.id, capacity, "Shard arena grown");
        } else {
            debug!(shard = self.id, capacity, "Shard arena grown");
        }
    }
}
