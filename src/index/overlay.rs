//! Overlay buffer - insert-only delta over a base index
//!
//! While an overlay is active every write lands here and reads merge
//! overlay-over-base. The buffer has the same logical size as the base it
//! shadows; writing `EMPTY_SLOT` into the overlay masks the base slot, so a
//! clear is observable without touching the base.
//!
//! `put_if_equal` linearizes at the overlay entry write: the entry lock is
//! held across the compare and the install, and a vacant entry compares
//! against the base while the lock is held, so no concurrent `put` can
//! slip between the observation and the write.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::errors::IndexResult;
use super::BaseIndex;

/// Delta slots buffered above a base index.
#[derive(Debug, Default)]
pub(crate) struct OverlayBuffer {
    slots: DashMap<u64, i64>,
    /// Highest slot index written plus one.
    high: AtomicU64,
}

impl OverlayBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Merged read: the overlay value if present, else the base value.
    pub(crate) fn get(&self, index: u64, base: &dyn BaseIndex) -> IndexResult<i64> {
        match self.slots.get(&index) {
            Some(value) => Ok(*value),
            None => base.get(index),
        }
    }

    /// Buffers a write.
    pub(crate) fn put(&self, index: u64, value: i64) {
        self.slots.insert(index, value);
        self.high.fetch_max(index + 1, Ordering::SeqCst);
    }

    /// Conditional write against the merged view.
    pub(crate) fn put_if_equal(
        &self,
        index: u64,
        expected: i64,
        new_value: i64,
        base: &dyn BaseIndex,
    ) -> IndexResult<bool> {
        let installed = match self.slots.entry(index) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() == expected {
                    occupied.insert(new_value);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if base.get(index)? == expected {
                    vacant.insert(new_value);
                    true
                } else {
                    false
                }
            }
        };
        if installed {
            self.high.fetch_max(index + 1, Ordering::SeqCst);
        }
        Ok(installed)
    }

    /// Logical size of the merged view.
    pub(crate) fn size(&self, base: &dyn BaseIndex) -> u64 {
        self.high.load(Ordering::SeqCst).max(base.size())
    }

    /// Snapshot of the buffered slot indices.
    pub(crate) fn indices(&self) -> Vec<u64> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    /// Direct access to the buffered slots; the write-down holds entry
    /// locks through this map while it moves values into the base.
    pub(crate) fn slots(&self) -> &DashMap<u64, i64> {
        &self.slots
    }
}
