//! Eviction Module
//!
//! Remove reasons, removal events and their delivery to user callbacks.
//!
//! Shards collect a [`RemovalEvent`] for every entry that leaves the cache
//! while their lock is held. The cache hands the batch to the [`Notifier`]
//! once the lock is released, so a callback never runs inside a shard lock.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::entry::EntryView;
use crate::cache::stats::Metadata;

// == Remove Reason ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    /// The entry outlived the life window.
    Expired = 1,
    /// The entry was the oldest when space was needed.
    NoSpace = 2,
    /// `delete` was called for the key.
    Deleted = 3,
}

impl RemoveReason {
    pub const ALL: [RemoveReason; 3] = [Self::Expired, Self::NoSpace, Self::Deleted];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NoSpace => "no_space",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Reason Set ==
/// Small bit set of remove reasons.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasonSet(u8);

impl ReasonSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self =
        Self(RemoveReason::Expired.bit() | RemoveReason::NoSpace.bit() | RemoveReason::Deleted.bit());

    pub fn insert(&mut self, reason: RemoveReason) {
        self.0 |= reason.bit();
    }

    #[inline]
    pub fn contains(&self, reason: RemoveReason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<RemoveReason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = RemoveReason>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for reason in iter {
            set.insert(reason);
        }
        set
    }
}

impl fmt::Debug for ReasonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(RemoveReason::ALL.iter().filter(|reason| self.contains(**reason)))
            .finish()
    }
}

// == Removal Event ==
/// An entry that left the cache, decoded for delivery to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalEvent {
    pub key: String,
    pub value: Vec<u8>,
    pub reason: RemoveReason,
    pub metadata: Metadata,
}

impl RemovalEvent {
    pub(crate) fn from_entry(entry: &EntryView<'_>, reason: RemoveReason, request_count: u32) -> Self {
        Self {
            key: entry.key_string(),
            value: entry.value.to_vec(),
            reason,
            metadata: Metadata { request_count },
        }
    }
}

// == Callbacks ==
/// Fired for every removal, whatever the reason.
pub type OnRemoveFn = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;
/// Fired for removals whose reason passes the filter set.
pub type OnRemoveWithReasonFn = Arc<dyn Fn(&str, &[u8], RemoveReason) + Send + Sync>;
/// Fired for removals whose reason passes the filter set, with entry metadata.
pub type OnRemoveWithMetadataFn = Arc<dyn Fn(&str, &[u8], Metadata) + Send + Sync>;

// == Notifier ==
/// The single removal callback selected for a cache instance.
///
/// Precedence: metadata callback, then reason callback, then bare callback.
#[derive(Clone, Default)]
pub(crate) enum Notifier {
    #[default]
    Silent,
    Bare(OnRemoveFn),
    WithReason(OnRemoveWithReasonFn, ReasonSet),
    WithMetadata(OnRemoveWithMetadataFn, ReasonSet),
}

impl Notifier {
    pub fn select(
        on_remove: Option<OnRemoveFn>,
        on_remove_with_reason: Option<OnRemoveWithReasonFn>,
        on_remove_with_metadata: Option<OnRemoveWithMetadataFn>,
        filter: ReasonSet,
    ) -> Self {
        match (on_remove_with_metadata, on_remove_with_reason, on_remove) {
            (Some(callback), _, _) => Self::WithMetadata(callback, filter),
            (None, Some(callback), _) => Self::WithReason(callback, filter),
            (None, None, Some(callback)) => Self::Bare(callback),
            (None, None, None) => Self::Silent,
        }
    }

    /// Reasons for which shards must decode removed entries into events.
    pub fn interest(&self) -> ReasonSet {
        match self {
            Self::Silent => ReasonSet::EMPTY,
            Self::Bare(_) => ReasonSet::ALL,
            Self::WithReason(_, filter) | Self::WithMetadata(_, filter) => *filter,
        }
    }

    /// Delivers events in order. Must be called without any shard lock held.
    pub fn dispatch(&self, events: Vec<RemovalEvent>) {
        for event in events {
            match self {
                Self::Silent => return,
                Self::Bare(callback) => callback(&event.key, &event.value),
                Self::WithReason(callback, filter) => {
                    if filter.contains(event.reason) {
                        callback(&event.key, &event.value, event.reason);
                    }
                }
                Self::WithMetadata(callback, filter) => {
                    if filter.contains(event.reason) {
                        callback(&event.key, &event.value, event.metadata);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("Silent"),
            Self::Bare(_) => f.write_str("Bare"),
            Self::WithReason(_, filter) => f.debug_tuple("WithReason").field(filter).finish(),
            Self::WithMetadata(_, filter) => f.debug_tuple("WithMetadata").field(filter).finish(),
        }
    }
}

// == Removal Log ==
/// Bounded record of the last removal reason per key hash.
///
/// Lets a miss tell "expired" or "deleted" apart from "never set". Oldest
/// records are forgotten first once `capacity` is exceeded.
#[derive(Debug)]
pub(crate) struct RemovalLog {
    reasons: HashMap<u64, (RemoveReason, u64)>,
    order: VecDeque<(u64, u64)>,
    seq: u64,
    capacity: usize,
}

impl RemovalLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            reasons: HashMap::new(),
            order: VecDeque::new(),
            seq: 0,
            capacity,
        }
    }

    pub fn record(&mut self, hash: u64, reason: RemoveReason) {
        if self.capacity == 0 {
            return;
        }
        self.seq += 1;
        self.reasons.insert(hash, (reason, self.seq));
        self.order.push_back((hash, self.seq));

        while self.order.len() > self.capacity {
            if let Some((old_hash, old_seq)) = self.order.pop_front() {
                // A newer record for the same hash stays
                if self.reasons.get(&old_hash).map(|(_, seq)| *seq) == Some(old_seq) {
                    self.reasons.remove(&old_hash);
                }
            }
        }
    }

    pub fn forget(&mut self, hash: u64) {
        self.reasons.remove(&hash);
    }

    pub fn last(&self, hash: u64) -> Option<RemoveReason> {
        self.reasons.get(&hash).map(|(reason, _)| *reason)
    }

    pub fn clear(&mut self) {
        self.reasons = HashMap::new();
        self.order = VecDeque::new();
    }
}
