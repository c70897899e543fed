//! A shared transposition table caching the results of game tree searches
//!
//! # Notes
//! The table is a flat, open-addressed array of 64-bit entries shared by
//! every search thread. Entries are read and written with relaxed atomic
//! loads and stores without per-slot locking: a torn or stale read at worst
//! produces a partial-hash mismatch, which is treated as a miss, and the
//! table is only ever a hint.
//!
//! # Entry packing
//! An entry packs the following information into 64 bits:
//!
//! ```comment
//!    bits: data
//!  0 -  6: score (shifted to non-negative)
//!  7 -  8: node type
//!  9 - 12: best move column
//! 13 - 17: work
//! 18 - 63: partial hash
//! ```
//!
//! Only the high bits of the hash are stored. The number of entries is odd,
//! so by the Chinese Remainder Theorem the pair (index, partial hash)
//! uniquely recovers the full hash as long as
//! `log2(num_entries) + HASH_BITS` exceeds the hash width.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Result};
use static_assertions::const_assert;

use crate::bits::Bits;
use crate::position::Position;
use crate::{HEIGHT, WIDTH};

const SCORE_BITS: u32 = 7;
const SCORE_MASK: u64 = (1 << SCORE_BITS) - 1;
const SCORE_SHIFT: u32 = 0;

const TYPE_BITS: u32 = 2;
const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;
const TYPE_SHIFT: u32 = SCORE_SHIFT + SCORE_BITS;

const MOVE_BITS: u32 = 4;
const MOVE_MASK: u64 = (1 << MOVE_BITS) - 1;
const MOVE_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;

const WORK_BITS: u32 = 5;
const WORK_MASK: u64 = (1 << WORK_BITS) - 1;
const WORK_SHIFT: u32 = MOVE_SHIFT + MOVE_BITS;

/// The number of hash bits stored in each entry
pub const HASH_BITS: u32 = 64 - WORK_SHIFT - WORK_BITS;
const HASH_MASK: u64 = ((1 as u64) << HASH_BITS) - 1;
const HASH_SHIFT: u32 = WORK_SHIFT + WORK_BITS;

// move bits must be wide enough to store any valid move
const_assert!((1usize << MOVE_BITS) >= WIDTH);

// score bits must be wide enough to store the entire range of scores
const_assert!((1usize << SCORE_BITS) > (Position::MAX_SCORE - Position::MIN_SCORE) as usize);

/// The bound kind of a stored search result
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeType {
    /// The true score is greater than or equal to the stored score
    Lower = 1,
    /// The true score is less than or equal to the stored score
    Upper = 2,
    /// The stored score is the exact minimax value
    Exact = 3,
}

impl NodeType {
    fn from_bits(bits: u64) -> Self {
        match bits {
            1 => NodeType::Lower,
            2 => NodeType::Upper,
            _ => NodeType::Exact,
        }
    }
}

/// A single packed transposition table entry
#[derive(Copy, Clone, Default)]
pub struct Entry {
    data: u64,
}

impl Entry {
    fn new(hash: Bits, best_move: usize, node_type: NodeType, score: i32, num_nodes: u64) -> Self {
        debug_assert!(best_move < WIDTH);
        debug_assert!(Position::MIN_SCORE <= score && score <= Position::MAX_SCORE);

        // shift so we don't store negative numbers in the table
        let shifted_score = (score - Position::MIN_SCORE) as u64;

        // the type bits are never zero, so a non-empty entry never packs to 0
        let data = (partial_hash(hash) << HASH_SHIFT)
            | (num_nodes_to_work(num_nodes) << WORK_SHIFT)
            | ((best_move as u64) << MOVE_SHIFT)
            | ((node_type as u64) << TYPE_SHIFT)
            | (shifted_score << SCORE_SHIFT);

        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data == 0
    }

    fn matches(&self, hash: Bits) -> bool {
        self.data != 0 && partial_hash(hash) == self.data >> HASH_SHIFT
    }

    /// Returns the stored best-move column, mirrored back if the lookup was
    /// made with a mirrored hash
    pub fn get_move(&self, is_mirrored: bool) -> usize {
        let column = ((self.data >> MOVE_SHIFT) & MOVE_MASK) as usize;

        if is_mirrored {
            WIDTH - column - 1
        } else {
            column
        }
    }

    /// Returns the stored score
    pub fn get_score(&self) -> i32 {
        let bits = ((self.data >> SCORE_SHIFT) & SCORE_MASK) as i32;

        // scores are shifted by the minimum possible score when stored
        bits + Position::MIN_SCORE
    }

    /// Returns the stored node type
    pub fn get_type(&self) -> NodeType {
        NodeType::from_bits((self.data >> TYPE_SHIFT) & TYPE_MASK)
    }

    /// Returns the stored work estimate
    pub fn get_work(&self) -> u64 {
        (self.data >> WORK_SHIFT) & WORK_MASK
    }
}

fn partial_hash(hash: Bits) -> u64 {
    // equivalent to hash % 2^HASH_BITS
    (hash & HASH_MASK as Bits) as u64
}

// Compress a subtree node count into the work field as floor(log8).
fn num_nodes_to_work(mut num_nodes: u64) -> u64 {
    let mut work = 0;
    while num_nodes > 1 {
        work += 1;
        num_nodes >>= 3;
    }

    work.min(WORK_MASK)
}

/// The result of a table probe
pub enum Lookup {
    /// The position was found
    Hit(Entry),
    /// The slot holds a different position
    Collision,
    /// The slot is empty
    Miss,
}

/// The effect of a table store
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Store {
    /// The entry went into an empty slot
    New,
    /// The entry replaced an older entry for the same position
    Rewrite,
    /// The entry evicted a different position
    Overwrite,
    /// The slot held more expensive work, so the store was dropped
    Skipped,
}

/// A transposition table shared between all search threads
///
/// Cloning the table is cheap and shares the underlying storage, so each
/// worker can hold its own handle (see [`Entry`] for the slot layout).
///
/// [`Entry`]: struct.Entry.html
#[derive(Clone)]
pub struct TranspositionTable {
    entries: Arc<[AtomicU64]>,
}

impl TranspositionTable {
    /// Allocates a table with the given entry count
    ///
    /// The count must be odd (prime preferred) and large enough that
    /// `log2(count) + HASH_BITS` covers the whole hash width, otherwise two
    /// different positions could be mistaken for each other.
    ///
    /// Huge-page backing is not implemented on this platform; requesting it
    /// logs a warning and falls back to a normal allocation.
    pub fn new(num_entries: usize, enable_huge_pages: bool) -> Result<Self> {
        ensure!(
            num_entries % 2 == 1,
            "the number of table entries must be odd for unique hashing"
        );

        let index_bits = (usize::BITS - num_entries.leading_zeros() - 1) as usize;
        ensure!(
            index_bits + HASH_BITS as usize > WIDTH * (HEIGHT + 1),
            "a table of {} entries is too small to guarantee unique hashing, increase the table size",
            num_entries,
        );

        if enable_huge_pages {
            log::warn!("huge pages requested but not implemented, using a normal allocation");
        }

        let mut entries = Vec::with_capacity(num_entries);
        entries.resize_with(num_entries, || AtomicU64::new(0));

        Ok(Self {
            entries: entries.into(),
        })
    }

    /// The capacity of the table in entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table has no capacity
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resets every slot to empty
    pub fn clear(&self) {
        for slot in self.entries.iter() {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Hints that the slot for `hash` will be accessed soon
    #[inline]
    pub fn prefetch(&self, hash: Bits) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let index = self.index(hash);
            let addr = self.entries.as_ptr().add(index) as *const i8;
            std::arch::x86_64::_mm_prefetch(addr, std::arch::x86_64::_MM_HINT_T0);
        }

        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = hash;
        }
    }

    /// Probes the table for a previously stored search result
    pub fn get(&self, hash: Bits) -> Lookup {
        let entry = Entry {
            data: self.entries[self.index(hash)].load(Ordering::Relaxed),
        };

        if entry.is_empty() {
            Lookup::Miss
        } else if !entry.matches(hash) {
            Lookup::Collision
        } else {
            Lookup::Hit(entry)
        }
    }

    /// Stores a search result
    ///
    /// The slot is rewritten only when empty or when the incoming work is at
    /// least the work already stored, which protects expensive deep results
    /// from eviction by shallow ones.
    pub fn put(
        &self,
        hash: Bits,
        is_mirrored: bool,
        best_move: usize,
        node_type: NodeType,
        score: i32,
        num_nodes: u64,
    ) -> Store {
        // the best move is stored in the canonical orientation
        let best_move = if is_mirrored {
            WIDTH - best_move - 1
        } else {
            best_move
        };

        let entry = Entry::new(hash, best_move, node_type, score, num_nodes);
        let slot = &self.entries[self.index(hash)];

        let current = Entry {
            data: slot.load(Ordering::Relaxed),
        };

        if current.is_empty() {
            slot.store(entry.data, Ordering::Relaxed);
            return Store::New;
        }

        if entry.get_work() < current.get_work() {
            return Store::Skipped;
        }

        slot.store(entry.data, Ordering::Relaxed);
        if current.matches(hash) {
            Store::Rewrite
        } else {
            Store::Overwrite
        }
    }

    /// Formats the table's memory footprint for display
    pub fn size_string(&self) -> String {
        let bytes = self.entries.len() * std::mem::size_of::<AtomicU64>();
        let kb = bytes as f64 / 1024.0;
        let mb = kb / 1024.0;
        let gb = mb / 1024.0;

        if kb < 1.0 {
            format!("{} B", bytes)
        } else if mb < 1.0 {
            format!("{:.2} kB", kb)
        } else if gb < 1.0 {
            format!("{:.2} MB", mb)
        } else {
            format!("{:.2} GB", gb)
        }
    }

    fn index(&self, hash: Bits) -> usize {
        (hash % self.entries.len() as Bits) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // odd prime, small enough for tests but large enough for unique hashing
    const TEST_ENTRIES: usize = 131_101;

    #[test]
    fn construction_rejects_bad_sizes() {
        assert!(TranspositionTable::new(1 << 20, false).is_err());
        assert!(TranspositionTable::new(15, false).is_err());
        assert!(TranspositionTable::new(TEST_ENTRIES, false).is_ok());
    }

    #[test]
    fn put_then_get_returns_the_same_fields() {
        let table = TranspositionTable::new(TEST_ENTRIES, false).unwrap();
        let hash = 0x1234_5678_9abc as Bits;

        table.put(hash, false, 5, NodeType::Exact, -11, 12_345);

        match table.get(hash) {
            Lookup::Hit(entry) => {
                assert_eq!(entry.get_move(false), 5);
                assert_eq!(entry.get_score(), -11);
                assert_eq!(entry.get_type(), NodeType::Exact);
            }
            _ => panic!("expected a hit"),
        }
    }

    #[test]
    fn mirrored_moves_roundtrip() {
        let table = TranspositionTable::new(TEST_ENTRIES, false).unwrap();
        let hash = 42 as Bits;

        table.put(hash, true, 1, NodeType::Lower, 3, 1);

        match table.get(hash) {
            Lookup::Hit(entry) => {
                // a mirrored lookup sees the move in its own orientation
                assert_eq!(entry.get_move(true), 1);
                assert_eq!(entry.get_move(false), WIDTH - 2);
            }
            _ => panic!("expected a hit"),
        }
    }

    #[test]
    fn same_index_different_hash_is_a_collision() {
        let table = TranspositionTable::new(TEST_ENTRIES, false).unwrap();
        let hash = 777 as Bits;
        let clashing = hash + TEST_ENTRIES as Bits;

        table.put(hash, false, 0, NodeType::Upper, 0, 100);

        assert!(matches!(table.get(clashing), Lookup::Collision));
        assert!(matches!(table.get(hash), Lookup::Hit(_)));
        assert!(matches!(table.get(hash ^ 1), Lookup::Miss));
    }

    #[test]
    fn cheap_results_do_not_evict_expensive_ones() {
        let table = TranspositionTable::new(TEST_ENTRIES, false).unwrap();
        let expensive = 9 as Bits;
        let cheap = expensive + TEST_ENTRIES as Bits;

        assert_eq!(
            table.put(expensive, false, 2, NodeType::Exact, 4, 1 << 30),
            Store::New
        );
        assert_eq!(
            table.put(cheap, false, 3, NodeType::Exact, -4, 8),
            Store::Skipped
        );
        assert!(matches!(table.get(expensive), Lookup::Hit(_)));

        // heavier work replaces the slot
        assert_eq!(
            table.put(cheap, false, 3, NodeType::Exact, -4, 1 << 40),
            Store::Overwrite
        );
        assert!(matches!(table.get(cheap), Lookup::Hit(_)));
    }

    #[test]
    fn rewrites_of_the_same_position_are_recognised() {
        let table = TranspositionTable::new(TEST_ENTRIES, false).unwrap();
        let hash = 4096 as Bits;

        table.put(hash, false, 2, NodeType::Lower, 1, 64);
        assert_eq!(
            table.put(hash, false, 2, NodeType::Exact, 2, 64),
            Store::Rewrite
        );

        match table.get(hash) {
            Lookup::Hit(entry) => assert_eq!(entry.get_type(), NodeType::Exact),
            _ => panic!("expected a hit"),
        }
    }

    #[test]
    fn work_encoding_is_monotonic_and_clamped() {
        assert_eq!(num_nodes_to_work(0), 0);
        assert_eq!(num_nodes_to_work(1), 0);
        assert_eq!(num_nodes_to_work(8), 1);
        assert_eq!(num_nodes_to_work(64), 2);
        assert!(num_nodes_to_work(u64::MAX) <= WORK_MASK);
    }
}
