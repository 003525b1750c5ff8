//! Byte Arena Module
//!
//! Wrap-around byte buffer that stores the encoded entries of one shard.
//!
//! Every run is written as a 4-byte little-endian length prefix followed by
//! the payload. Runs are appended at `tail` and popped from `head`, so the
//! arena always pops in insertion order. When the space after `tail` runs
//! out, writing wraps to offset 0 as long as the oldest run at `head` is far
//! enough away; the end of the upper segment is remembered in `right_margin`.
//!
//! ```text
//! unwrapped:  [ free | head ... tail | free ]
//! wrapped:    [ ... tail | free | head ... right_margin | unused ]
//! ```

use std::fmt;

// == Constants ==
/// Size of the length prefix in front of every run.
pub(crate) const LEN_PREFIX: usize = 4;

// == Errors and Outcomes ==
/// Returned when a run cannot be placed without evicting older runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArenaFull;

/// Offsets moved by a grow of a wrapped arena.
///
/// Every offset strictly below `below` moved up by `shift`; all other offsets
/// are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Relocation {
    pub below: usize,
    pub shift: usize,
}

impl Relocation {
    #[inline]
    pub fn apply(&self, offset: usize) -> usize {
        if offset < self.below {
            offset + self.shift
        } else {
            offset
        }
    }
}

/// Where a pushed run landed, and whether existing runs moved to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pushed {
    pub offset: usize,
    pub relocation: Option<Relocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    AfterTail(usize),
    Wrap,
}

// == Byte Arena ==
pub(crate) struct ByteArena {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    right_margin: usize,
    wrapped: bool,
    count: usize,
    initial_capacity: usize,
    /// Upper bound for growth, 0 = unbounded
    max_capacity: usize,
}

impl ByteArena {
    // == Constructor ==
    /// Creates an arena with `initial_capacity` bytes that may grow up to
    /// `max_capacity` bytes (0 for no limit).
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        let initial_capacity = if max_capacity > 0 {
            initial_capacity.min(max_capacity)
        } else {
            initial_capacity
        };
        Self {
            buf: vec![0; initial_capacity],
            head: 0,
            tail: 0,
            right_margin: 0,
            wrapped: false,
            count: 0,
            initial_capacity,
            max_capacity,
        }
    }

    /// Allocated size in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of runs currently held, live or not.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if a payload of `len` bytes could ever be stored.
    pub fn can_hold(&self, len: usize) -> bool {
        let need = LEN_PREFIX.saturating_add(len);
        len <= u32::MAX as usize && (self.max_capacity == 0 || need <= self.max_capacity)
    }

    // == Push ==
    /// Appends a run made of the concatenation of `parts`.
    ///
    /// Grows the buffer when possible. Returns `ArenaFull` when the run only
    /// fits after older runs are popped; nothing is modified in that case.
    pub fn push(&mut self, parts: &[&[u8]]) -> Result<Pushed, ArenaFull> {
        let len: usize = parts.iter().map(|part| part.len()).sum();
        if !self.can_hold(len) {
            return Err(ArenaFull);
        }
        let need = LEN_PREFIX + len;

        if self.count == 0 {
            self.clear_positions();
        }

        let mut relocation = None;
        let slot = match find_slot(self.buf.len(), self.head, self.tail, self.wrapped, need) {
            Some(slot) => slot,
            None => {
                let (slot, moved) = self.grow(need)?;
                relocation = moved;
                slot
            }
        };

        let offset = match slot {
            Slot::AfterTail(offset) => offset,
            Slot::Wrap => {
                self.right_margin = self.tail;
                self.wrapped = true;
                0
            }
        };

        self.buf[offset..offset + LEN_PREFIX].copy_from_slice(&(len as u32).to_le_bytes());
        let mut cursor = offset + LEN_PREFIX;
        for part in parts {
            self.buf[cursor..cursor + part.len()].copy_from_slice(part);
            cursor += part.len();
        }

        self.tail = cursor;
        if !self.wrapped {
            self.right_margin = self.tail;
        }
        self.count += 1;

        Ok(Pushed { offset, relocation })
    }

    // == Grow ==
    /// Reallocates to a larger buffer if the run fits afterwards.
    ///
    /// A wrapped arena is linearized: the lower segment `[0, tail)` moves to
    /// the end of the upper segment, which keeps insertion order intact.
    fn grow(&mut self, need: usize) -> Result<(Slot, Option<Relocation>), ArenaFull> {
        let capacity = self.buf.len();
        if self.max_capacity > 0 && capacity >= self.max_capacity {
            return Err(ArenaFull);
        }

        let mut new_capacity = capacity;
        if new_capacity < need {
            new_capacity += need;
        }
        new_capacity = new_capacity.saturating_mul(2);
        if self.max_capacity > 0 {
            new_capacity = new_capacity.min(self.max_capacity);
        }

        let (new_tail, relocation) = if self.wrapped {
            (
                self.right_margin + self.tail,
                Some(Relocation {
                    below: self.tail,
                    shift: self.right_margin,
                }),
            )
        } else {
            (self.tail, None)
        };
        if new_tail > new_capacity {
            return Err(ArenaFull);
        }
        let slot = find_slot(new_capacity, self.head, new_tail, false, need).ok_or(ArenaFull)?;

        let mut grown = vec![0; new_capacity];
        if self.wrapped {
            grown[self.head..self.right_margin]
                .copy_from_slice(&self.buf[self.head..self.right_margin]);
            grown[self.right_margin..new_tail].copy_from_slice(&self.buf[..self.tail]);
        } else {
            grown[self.head..self.tail].copy_from_slice(&self.buf[self.head..self.tail]);
        }

        self.buf = grown;
        self.tail = new_tail;
        self.right_margin = new_tail;
        self.wrapped = false;

        Ok((slot, relocation))
    }

    // == Read ==
    /// Returns the payload of the run starting at `offset`.
    pub fn read(&self, offset: usize) -> Option<&[u8]> {
        let len = self.run_len(offset)?;
        self.buf.get(offset + LEN_PREFIX..offset + LEN_PREFIX + len)
    }

    pub fn read_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
        let len = self.run_len(offset)?;
        self.buf.get_mut(offset + LEN_PREFIX..offset + LEN_PREFIX + len)
    }

    fn run_len(&self, offset: usize) -> Option<usize> {
        let prefix = self.buf.get(offset..offset.checked_add(LEN_PREFIX)?)?;
        let bytes: [u8; LEN_PREFIX] = prefix.try_into().ok()?;
        Some(u32::from_le_bytes(bytes) as usize)
    }

    // == Oldest ==
    /// Returns the offset and payload of the oldest run.
    pub fn oldest(&self) -> Option<(usize, &[u8])> {
        if self.count == 0 {
            return None;
        }
        self.read(self.head).map(|payload| (self.head, payload))
    }

    /// Drops the oldest run and returns its offset.
    pub fn pop_oldest(&mut self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        let offset = self.head;
        let len = self.run_len(offset)?;

        self.head += LEN_PREFIX + len;
        self.count -= 1;

        if self.count == 0 {
            self.clear_positions();
        } else if self.wrapped && self.head >= self.right_margin {
            // Upper segment drained; the remaining runs start at 0
            self.head = 0;
            self.wrapped = false;
            self.right_margin = self.tail;
        }

        Some(offset)
    }

    // == Reset and Release ==
    /// Discards every run and returns to the initial allocation.
    pub fn reset(&mut self) {
        self.buf = vec![0; self.initial_capacity];
        self.count = 0;
        self.clear_positions();
    }

    /// Discards every run and frees the buffer.
    pub fn release(&mut self) {
        self.buf = Vec::new();
        self.count = 0;
        self.clear_positions();
    }

    fn clear_positions(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.right_margin = 0;
        self.wrapped = false;
    }
}

impl fmt::Debug for ByteArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArena")
            .field("capacity", &self.buf.len())
            .field("max_capacity", &self.max_capacity)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("right_margin", &self.right_margin)
            .field("wrapped", &self.wrapped)
            .field("count", &self.count)
            .finish()
    }
}

/// Finds room for `need` bytes given a buffer layout.
fn find_slot(capacity: usize, head: usize, tail: usize, wrapped: bool, need: usize) -> Option<Slot> {
    if wrapped {
        // Free space is the gap between the newest and the oldest run
        return (head - tail >= need).then_some(Slot::AfterTail(tail));
    }
    if capacity - tail >= need {
        Some(Slot::AfterTail(tail))
    } else if head >= need {
        Some(Slot::Wrap)
    } else {
        None
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn payload(byte: u8, len: usize) -> Vec<u8> {
        vec![byte; len]
    }

    #[test]
    fn test_push_and_read() {
        let mut arena = ByteArena::new(64, 0);
        let first = arena.push(&[b"abc", b"def"]).unwrap();
        let second = arena.push(&[b"xyz"]).unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, LEN_PREFIX + 6);
        assert_eq!(arena.read(first.offset).unwrap(), b"abcdef");
        assert_eq!(arena.read(second.offset).unwrap(), b"xyz");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_empty_payload_is_a_run() {
        let mut arena = ByteArena::new(16, 0);
        let pushed = arena.push(&[]).unwrap();
        assert_eq!(arena.read(pushed.offset).unwrap(), b"");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_pop_in_insertion_order() {
        let mut arena = ByteArena::new(128, 0);
        let offsets: Vec<usize> = (0..4u8)
            .map(|i| arena.push(&[&payload(i, 5)]).unwrap().offset)
            .collect();

        for offset in offsets {
            assert_eq!(arena.oldest().unwrap().0, offset);
            assert_eq!(arena.pop_oldest(), Some(offset));
        }
        assert!(arena.is_empty());
        assert_eq!(arena.pop_oldest(), None);
    }

    #[test]
    fn test_wraps_to_front_when_head_has_moved() {
        // Runs are 10 bytes: 4 prefix + 6 payload
        let mut arena = ByteArena::new(32, 32);
        let a = arena.push(&[&payload(1, 6)]).unwrap().offset;
        arena.push(&[&payload(2, 6)]).unwrap();
        arena.push(&[&payload(3, 6)]).unwrap();
        assert_eq!(arena.push(&[&payload(4, 6)]), Err(ArenaFull));

        assert_eq!(arena.pop_oldest(), Some(a));
        let d = arena.push(&[&payload(4, 6)]).unwrap();
        assert_eq!(d.offset, 0);
        assert!(d.relocation.is_none());
        assert_eq!(arena.read(0).unwrap(), &payload(4, 6)[..]);

        // Full again: the gap between tail and head is zero
        assert_eq!(arena.push(&[&payload(5, 6)]), Err(ArenaFull));

        // Drain keeps FIFO order across the wrap
        let order: Vec<u8> = std::iter::from_fn(|| {
            let first = arena.oldest().map(|(_, run)| run[0]);
            arena.pop_oldest();
            first
        })
        .collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn test_grow_when_unbounded() {
        let mut arena = ByteArena::new(16, 0);
        arena.push(&[&payload(1, 8)]).unwrap();
        let pushed = arena.push(&[&payload(2, 8)]).unwrap();

        assert!(arena.capacity() > 16);
        assert_eq!(pushed.relocation, None);
        assert_eq!(arena.read(0).unwrap(), &payload(1, 8)[..]);
        assert_eq!(arena.read(pushed.offset).unwrap(), &payload(2, 8)[..]);
    }

    #[test]
    fn test_grow_of_wrapped_arena_relocates_lower_segment() {
        let mut arena = ByteArena::new(32, 0);
        let a = arena.push(&[&payload(1, 6)]).unwrap().offset;
        let b = arena.push(&[&payload(2, 6)]).unwrap().offset;
        let c = arena.push(&[&payload(3, 6)]).unwrap().offset;
        assert_eq!(arena.pop_oldest(), Some(a));
        let d = arena.push(&[&payload(4, 6)]).unwrap().offset;
        assert_eq!(d, 0);

        let e = arena.push(&[&payload(5, 6)]).unwrap();
        let relocation = e.relocation.expect("wrapped grow must relocate");
        assert_eq!(relocation, Relocation { below: 10, shift: 30 });
        assert_eq!(arena.capacity(), 64);

        // Upper segment kept its offsets, the lower one moved
        assert_eq!(relocation.apply(b), b);
        assert_eq!(relocation.apply(c), c);
        let d = relocation.apply(d);
        assert_eq!(d, 30);
        assert_eq!(arena.read(b).unwrap()[0], 2);
        assert_eq!(arena.read(c).unwrap()[0], 3);
        assert_eq!(arena.read(d).unwrap()[0], 4);
        assert_eq!(arena.read(e.offset).unwrap()[0], 5);

        let order: Vec<usize> = std::iter::from_fn(|| arena.pop_oldest()).collect();
        assert_eq!(order, vec![b, c, d, e.offset]);
    }

    #[test]
    fn test_growth_stops_at_max_capacity() {
        let mut arena = ByteArena::new(16, 40);
        arena.push(&[&payload(1, 6)]).unwrap();
        arena.push(&[&payload(2, 6)]).unwrap();
        arena.push(&[&payload(3, 6)]).unwrap();
        arena.push(&[&payload(4, 6)]).unwrap();
        assert_eq!(arena.capacity(), 40);
        assert_eq!(arena.push(&[&payload(5, 6)]), Err(ArenaFull));
        assert_eq!(arena.len(), 4);
    }

    #[test]
    fn test_can_hold_respects_max_capacity() {
        let arena = ByteArena::new(8, 32);
        assert!(arena.can_hold(28));
        assert!(!arena.can_hold(29));
        assert!(ByteArena::new(8, 0).can_hold(1 << 20));
    }

    #[test]
    fn test_initial_capacity_clamped_to_max() {
        let arena = ByteArena::new(1024, 100);
        assert_eq!(arena.capacity(), 100);
    }

    #[test]
    fn test_reset_and_release() {
        let mut arena = ByteArena::new(32, 0);
        arena.push(&[&payload(1, 40)]).unwrap();
        assert!(arena.capacity() > 32);

        arena.reset();
        assert_eq!(arena.capacity(), 32);
        assert!(arena.is_empty());
        assert!(arena.oldest().is_none());

        arena.release();
        assert_eq!(arena.capacity(), 0);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let arena = ByteArena::new(8, 0);
        assert!(arena.read(100).is_none());
        assert!(arena.read(usize::MAX).is_none());
    }
}
