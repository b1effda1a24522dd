//! RAM-resident directory of live records.
//!
//! Each live key is represented by one six-byte [`Entry`] pairing the key's
//! 16-bit hash with the record's offset inside the active area. Entries live
//! in a sequence sorted by hash; equal hashes are adjacent, and the store
//! disambiguates them by reading the key bytes off the medium. Keeping a
//! sorted parallel sequence instead of a hash table is a memory decision:
//! six bytes per key, no buckets, no stored keys.
//!
//! Capacity starts at 32 entries and doubles when full. Growth goes through
//! `try_reserve_exact` so exhausted memory is reported instead of aborting.

use std::collections::TryReserveError;
use std::ops::Range;
use thiserror::Error;

/// Entries allocated up front; doubled each time the index fills.
pub const INITIAL_CAPACITY: usize = 32;

/// One live record: key hash and offset from the active area's base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub hash: u16,
    pub offset: u32,
}

/// Errors from index maintenance.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Growing the entry sequence failed.
    #[error("ram index allocation failed")]
    Alloc(#[from] TryReserveError),
}

/// Sorted sequence of `(hash, offset)` entries.
#[derive(Debug)]
pub struct RamIndex {
    entries: Vec<Entry>,
}

impl RamIndex {
    pub fn new() -> Result<Self, IndexError> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(INITIAL_CAPACITY)?;
        Ok(Self { entries })
    }

    /// Half-open range of entries whose hash equals `hash`.
    ///
    /// The range end doubles as the insertion index for a key that turns out
    /// to be absent: inserting there keeps the sequence sorted and appends
    /// the newcomer to its equal-hash run in insertion order.
    pub fn run(&self, hash: u16) -> Range<usize> {
        let start = self.entries.partition_point(|e| e.hash < hash);
        let end = start + self.entries[start..].partition_point(|e| e.hash == hash);
        start..end
    }

    pub fn get(&self, idx: usize) -> Entry {
        self.entries[idx]
    }

    /// Ensures one more entry fits, doubling the capacity if the index is
    /// full. Called before medium writes so an allocation failure surfaces
    /// while the store is still untouched.
    pub fn reserve_for_insert(&mut self) -> Result<(), IndexError> {
        if self.entries.len() == self.entries.capacity() {
            self.entries.try_reserve_exact(self.entries.capacity())?;
        }
        Ok(())
    }

    /// Inserts at `idx`, shifting the tail right.
    pub fn insert(&mut self, idx: usize, entry: Entry) -> Result<(), IndexError> {
        self.reserve_for_insert()?;
        self.entries.insert(idx, entry);
        Ok(())
    }

    /// Replaces the entry at `idx`.
    pub fn update(&mut self, idx: usize, entry: Entry) {
        self.entries[idx] = entry;
    }

    /// Removes the entry at `idx`, shifting the tail left.
    pub fn remove(&mut self, idx: usize) -> Entry {
        self.entries.remove(idx)
    }

    /// Rewrites the offset at `idx` in place (compaction relocates records
    /// without changing their hash).
    pub fn set_offset(&mut self, idx: usize, offset: u32) {
        self.entries[idx].offset = offset;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: u16, offset: u32) -> Entry {
        Entry { hash, offset }
    }

    #[test]
    fn run_on_empty_index_is_empty() {
        let idx = RamIndex::new().unwrap();
        assert_eq!(idx.run(7), 0..0);
    }

    #[test]
    fn run_finds_equal_hash_span() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(10, 100)).unwrap();
        idx.insert(1, entry(20, 200)).unwrap();
        idx.insert(2, entry(20, 300)).unwrap();
        idx.insert(3, entry(30, 400)).unwrap();

        assert_eq!(idx.run(10), 0..1);
        assert_eq!(idx.run(20), 1..3);
        assert_eq!(idx.run(30), 3..4);
        // absent hashes: empty range at the sorted position
        assert_eq!(idx.run(15), 1..1);
        assert_eq!(idx.run(40), 4..4);
    }

    #[test]
    fn insert_at_run_end_keeps_insertion_order_among_equals() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(idx.run(5).end, entry(5, 1)).unwrap();
        idx.insert(idx.run(5).end, entry(5, 2)).unwrap();
        idx.insert(idx.run(5).end, entry(5, 3)).unwrap();

        let offsets: Vec<u32> = idx.run(5).map(|i| idx.get(i).offset).collect();
        assert_eq!(offsets, vec![1, 2, 3]);
    }

    #[test]
    fn remove_shifts_tail_left() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(1, 10)).unwrap();
        idx.insert(1, entry(2, 20)).unwrap();
        idx.insert(2, entry(3, 30)).unwrap();

        let removed = idx.remove(1);
        assert_eq!(removed, entry(2, 20));
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.get(1), entry(3, 30));
    }

    #[test]
    fn update_and_set_offset_replace_in_place() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(1, 10)).unwrap();
        idx.update(0, entry(1, 99));
        assert_eq!(idx.get(0).offset, 99);
        idx.set_offset(0, 123);
        assert_eq!(idx.get(0).offset, 123);
    }

    #[test]
    fn capacity_doubles_when_full() {
        let mut idx = RamIndex::new().unwrap();
        let initial = idx.entries.capacity();
        assert!(initial >= INITIAL_CAPACITY);

        for i in 0..initial {
            idx.insert(i, entry(i as u16, i as u32)).unwrap();
        }
        assert_eq!(idx.entries.capacity(), initial);

        idx.insert(initial, entry(u16::MAX, 0)).unwrap();
        assert!(idx.entries.capacity() >= initial * 2);
    }

    #[test]
    fn clear_empties_without_error() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(1, 1)).unwrap();
        idx.clear();
        assert!(idx.is_empty());
        assert_eq!(idx.run(1), 0..0);
    }
}
