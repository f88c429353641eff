//! In-memory base index with snapshot persistence
//!
//! A growable slot vector behind a read-write lock. Unset slots read as
//! `EMPTY_SLOT`. Snapshots stream every non-empty slot as a checksummed
//! frame; loading validates every frame and treats corruption as fatal.

use std::io::Write;
use std::path::Path;
use std::sync::RwLock;

use super::errors::IndexResult;
use super::{BaseIndex, EMPTY_SLOT};
use crate::storage::{FrameReader, FrameWriter, SlotRecord, StorageError};

/// Growable in-memory slot store.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    slots: RwLock<Vec<i64>>,
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index preloaded with `values` at slots `0..values.len()`.
    pub fn with_values(values: Vec<i64>) -> Self {
        Self {
            slots: RwLock::new(values),
        }
    }

    /// Loads an index from a snapshot file written by `write_to_path`.
    pub fn load_from_path(path: &Path) -> IndexResult<Self> {
        let mut reader = FrameReader::open(path)?;
        let index = Self::new();
        {
            let mut slots = index.slots.write().expect("memory index lock poisoned");
            while let Some(body) = reader.next_frame()? {
                let record = SlotRecord::from_body(&body, reader.offset())?;
                let at = record.index as usize;
                if slots.len() <= at {
                    slots.resize(at + 1, EMPTY_SLOT);
                }
                slots[at] = record.value;
            }
        }
        Ok(index)
    }

    /// Writes a snapshot of every non-empty slot to `path` and syncs it.
    pub fn write_to_path(&self, path: &Path) -> IndexResult<u64> {
        let mut writer = FrameWriter::open(path)?;
        let written = {
            let slots = self.slots.read().expect("memory index lock poisoned");
            let mut written = 0u64;
            for (at, value) in slots.iter().enumerate() {
                if *value != EMPTY_SLOT {
                    let record = SlotRecord {
                        index: at as u64,
                        value: *value,
                    };
                    writer.append(&record.to_frame())?;
                    written += 1;
                }
            }
            written
        };
        writer.fsync()?;
        Ok(written)
    }
}

impl BaseIndex for MemoryIndex {
    fn get(&self, index: u64) -> IndexResult<i64> {
        let slots = self.slots.read().expect("memory index lock poisoned");
        Ok(slots.get(index as usize).copied().unwrap_or(EMPTY_SLOT))
    }

    fn put(&self, index: u64, value: i64) -> IndexResult<()> {
        let mut slots = self.slots.write().expect("memory index lock poisoned");
        let at = index as usize;
        if slots.len() <= at {
            slots.resize(at + 1, EMPTY_SLOT);
        }
        slots[at] = value;
        Ok(())
    }

    fn put_if_equal(&self, index: u64, expected: i64, new_value: i64) -> IndexResult<bool> {
        let mut slots = self.slots.write().expect("memory index lock poisoned");
        let at = index as usize;
        let current = slots.get(at).copied().unwrap_or(EMPTY_SLOT);
        if current != expected {
            return Ok(false);
        }
        if slots.len() <= at {
            slots.resize(at + 1, EMPTY_SLOT);
        }
        slots[at] = new_value;
        Ok(true)
    }

    fn size(&self) -> u64 {
        let slots = self.slots.read().expect("memory index lock poisoned");
        slots.len() as u64
    }

    fn write_to(&self, out: &mut dyn Write) -> IndexResult<u64> {
        let slots = self.slots.read().expect("memory index lock poisoned");
        let mut written = 0u64;
        for (at, value) in slots.iter().enumerate() {
            if *value != EMPTY_SLOT {
                let record = SlotRecord {
                    index: at as u64,
                    value: *value,
                };
                out.write_all(&record.to_frame())
                    .map_err(|e| StorageError::write_failed("index snapshot write", e))?;
                written += 1;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unset_slots_read_empty() {
        let index = MemoryIndex::new();
        assert_eq!(index.get(999).unwrap(), EMPTY_SLOT);
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_put_get_and_growth() {
        let index = MemoryIndex::new();
        index.put(5, 50).unwrap();
        assert_eq!(index.get(5).unwrap(), 50);
        assert_eq!(index.get(4).unwrap(), EMPTY_SLOT);
        assert_eq!(index.size(), 6);
    }

    #[test]
    fn test_put_if_equal() {
        let index = MemoryIndex::new();
        index.put(1, 10).unwrap();
        assert!(index.put_if_equal(1, 10, 11).unwrap());
        assert_eq!(index.get(1).unwrap(), 11);
        assert!(!index.put_if_equal(1, 10, 12).unwrap());
        assert_eq!(index.get(1).unwrap(), 11);
        // Unset slots compare against the empty value.
        assert!(index.put_if_equal(7, EMPTY_SLOT, 70).unwrap());
        assert_eq!(index.get(7).unwrap(), 70);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.dat");

        let index = MemoryIndex::with_values(vec![0, 11, 0, 33]);
        index.put(9, 99).unwrap();
        let written = index.write_to_path(&path).unwrap();
        assert_eq!(written, 3); // slots 1, 3, 9

        let loaded = MemoryIndex::load_from_path(&path).unwrap();
        assert_eq!(loaded.get(1).unwrap(), 11);
        assert_eq!(loaded.get(3).unwrap(), 33);
        assert_eq!(loaded.get(9).unwrap(), 99);
        assert_eq!(loaded.get(0).unwrap(), EMPTY_SLOT);
        assert_eq!(loaded.size(), 10);
    }

    #[test]
    fn test_write_to_stream() {
        let index = MemoryIndex::with_values(vec![7, 0, 9]);
        let mut out = Vec::new();
        assert_eq!(index.write_to(&mut out).unwrap(), 2);
        assert!(!out.is_empty());
    }
}
