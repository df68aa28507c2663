//! Zobrist-keyed transposition table.
//!
//! Single-entry buckets with depth-preferred replacement. Mate scores are
//! never stored (the caller filters), so no ply adjustment is needed here.

use crate::types::{Bound, Depth, Move, Value};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry {
    pub key: u64,
    pub value: Value,
    pub depth: Depth,
    pub bound: Bound,
    pub mv: Option<Move>,
}

const EMPTY: Entry = Entry {
    key: 0,
    value: Value::ZERO,
    depth: Depth::NONE,
    bound: Bound::Upper,
    mv: None,
};

pub(crate) struct TransTable {
    entries: Vec<Entry>,
    mask: usize,
}

impl TransTable {
    /// Allocate roughly `megabytes` of entries, rounded down to a power of
    /// two. A zero request still gets a minimal table.
    pub(crate) fn new(megabytes: usize) -> TransTable {
        let bytes = megabytes.max(1) * 1024 * 1024;
        let mut count = bytes / std::mem::size_of::<Entry>();
        count = count.next_power_of_two();
        if count * std::mem::size_of::<Entry>() > bytes {
            count /= 2;
        }
        let count = count.max(1024);
        TransTable { entries: vec![EMPTY; count], mask: count - 1 }
    }

    pub(crate) fn probe(&self, key: u64) -> Option<Entry> {
        let entry = self.entries[key as usize & self.mask];
        (entry.key == key).then_some(entry)
    }

    pub(crate) fn store(&mut self, key: u64, value: Value, depth: Depth, bound: Bound, mv: Option<Move>) {
        let slot = &mut self.entries[key as usize & self.mask];
        // Same-key shallow results never overwrite deeper ones.
        if slot.key == key && slot.depth > depth {
            return;
        }
        *slot = Entry { key, value, depth, bound, mv };
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }
}
