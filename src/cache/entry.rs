//! Cache Entry Module
//!
//! Defines the byte layout of one entry inside a shard arena.
//!
//! ```text
//! | timestamp u64 | hash u64 | key_len u16 | value_len u32 | key | value |
//! ```
//!
//! All integers are little endian. The hash doubles as a guard: it is zeroed
//! when the entry is deleted or replaced, so a run whose guard no longer
//! matches its index slot is never served.

// == Layout ==
const TIMESTAMP: std::ops::Range<usize> = 0..8;
const HASH: std::ops::Range<usize> = 8..16;
const KEY_LEN: std::ops::Range<usize> = 16..18;
const VALUE_LEN: std::ops::Range<usize> = 18..22;

/// Size of the fixed entry header in bytes.
pub(crate) const HEADER_SIZE: usize = 22;

/// Builds the header for an entry.
pub(crate) fn encode_header(timestamp: u64, hash: u64, key_len: u16, value_len: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[TIMESTAMP].copy_from_slice(&timestamp.to_le_bytes());
    header[HASH].copy_from_slice(&hash.to_le_bytes());
    header[KEY_LEN].copy_from_slice(&key_len.to_le_bytes());
    header[VALUE_LEN].copy_from_slice(&value_len.to_le_bytes());
    header
}

/// Total encoded size of an entry.
pub(crate) fn encoded_len(key_len: usize, value_len: usize) -> usize {
    HEADER_SIZE + key_len + value_len
}

/// Zeroes the hash guard, turning the run into a tombstone.
pub(crate) fn clear_hash(run: &mut [u8]) {
    if let Some(guard) = run.get_mut(HASH) {
        guard.fill(0);
    }
}

// == Entry View ==
/// Borrowed, decoded view of one entry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryView<'a> {
    /// Insertion time (Unix milliseconds)
    pub timestamp: u64,
    pub hash: u64,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> EntryView<'a> {
    /// Decodes a run. Returns `None` if the run is truncated or its lengths
    /// do not add up.
    pub fn decode(run: &'a [u8]) -> Option<Self> {
        let timestamp = u64::from_le_bytes(run.get(TIMESTAMP)?.try_into().ok()?);
        let hash = u64::from_le_bytes(run.get(HASH)?.try_into().ok()?);
        let key_len = u16::from_le_bytes(run.get(KEY_LEN)?.try_into().ok()?) as usize;
        let value_len = u32::from_le_bytes(run.get(VALUE_LEN)?.try_into().ok()?) as usize;

        if run.len() != encoded_len(key_len, value_len) {
            return None;
        }
        let (key, value) = run[HEADER_SIZE..].split_at(key_len);

        Some(Self {
            timestamp,
            hash,
            key,
            value,
        })
    }

    // == Is Expired ==
    /// Checks if the entry is older than the life window.
    ///
    /// An entry whose age equals the life window is still live.
    pub fn is_expired(&self, now_ms: u64, life_window_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > life_window_ms
    }

    /// Whether this run is the live entry for `hash` and `key`.
    pub fn matches(&self, hash: u64, key: &[u8]) -> bool {
        self.hash == hash && self.key == key
    }

    pub fn key_string(&self) -> String {
        String::from_utf8_lossy(self.key).into_owned()
    }
}
