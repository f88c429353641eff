//! Overlay and write-down tests
//!
//! The versioned value index must present exactly one consistent view in
//! every state, merge the overlay down without losing concurrent writes,
//! and keep conditional writes linearizable against the merged view.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use fcstate::index::{
    BaseIndex, IndexError, IndexResult, MemoryIndex, OverlayMode, VersionedValueIndex, EMPTY_SLOT,
};

fn seeded_index(len: u64, offset: i64) -> VersionedValueIndex<MemoryIndex> {
    let values = (0..len).map(|i| i as i64 + offset).collect();
    VersionedValueIndex::new(MemoryIndex::with_values(values))
}

// =============================================================================
// Overlay Equivalence
// =============================================================================

/// In every state, get(i) is overlay[i] if buffered, else base[i].
#[test]
fn test_reads_merge_in_every_state() {
    let index = seeded_index(100, 10);
    for i in 0..100 {
        assert_eq!(index.get(i).unwrap(), i as i64 + 10);
    }

    index.set_overlay(true).unwrap();
    for i in 0..100 {
        index.put(i, i as i64 + 100).unwrap();
    }
    for i in 0..100 {
        assert_eq!(index.get(i).unwrap(), i as i64 + 100);
        // The base still carries the pre-overlay values.
        assert_eq!(index.base().get(i).unwrap(), i as i64 + 10);
    }

    index.set_overlay(false).unwrap();
    for i in 0..100 {
        assert_eq!(index.get(i).unwrap(), i as i64 + 100);
        assert_eq!(index.base().get(i).unwrap(), i as i64 + 100);
    }
}

/// Write-down merges exactly the pre-transition view plus whatever
/// concurrent writers landed after their slots drained.
#[test]
fn test_write_down_with_concurrent_writer() {
    let index = Arc::new(seeded_index(100, 10));
    index.set_overlay(true).unwrap();
    for i in 0..100 {
        index.put(i, i as i64 + 100).unwrap();
    }

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 0..50 {
                index.put(i, i as i64 + 200).unwrap();
            }
        })
    };

    index.set_overlay(false).unwrap();
    writer.join().expect("writer thread");

    assert_eq!(index.mode(), OverlayMode::Base);
    for i in 0..50 {
        assert_eq!(index.base().get(i).unwrap(), i as i64 + 200);
    }
    for i in 50..100 {
        assert_eq!(index.base().get(i).unwrap(), i as i64 + 100);
    }
}

/// Readers racing a write-down always see a full view, never a gap.
#[test]
fn test_readers_never_observe_a_gap() {
    let index = Arc::new(seeded_index(256, 1));
    index.set_overlay(true).unwrap();
    for i in 0..256 {
        index.put(i, i as i64 + 1000).unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                for i in 0..256 {
                    let value = index.get(i).unwrap();
                    // Either the overlay value or nothing else: the base
                    // was fully shadowed before the write-down started.
                    assert_eq!(value, i as i64 + 1000);
                }
            }
        })
    };

    index.set_overlay(false).unwrap();
    stop.store(true, Ordering::SeqCst);
    reader.join().expect("reader thread");
}

// =============================================================================
// Conditional Writes
// =============================================================================

/// A conditional write compares against the merged view and survives the
/// write-down.
#[test]
fn test_put_if_equal_through_overlay_and_write_down() {
    let index = seeded_index(1001, 10);
    assert_eq!(index.get(1000).unwrap(), 1010);

    index.set_overlay(true).unwrap();
    assert!(index.put_if_equal(1000, 1010, 1100).unwrap());
    assert_eq!(index.get(1000).unwrap(), 1100);

    index.set_overlay(false).unwrap();
    assert_eq!(index.base().get(1000).unwrap(), 1100);
}

/// Concurrent conditional increments agree on a single sequential order:
/// every success is observed by the next, so no increment is lost.
#[test]
fn test_put_if_equal_is_linearizable() {
    let index = Arc::new(seeded_index(1, 0));
    index.set_overlay(true).unwrap();

    let threads = 8;
    let increments = 200;
    let mut handles = Vec::new();
    for _ in 0..threads {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for _ in 0..increments {
                loop {
                    let seen = index.get(0).unwrap();
                    if index.put_if_equal(0, seen, seen + 1).unwrap() {
                        break;
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("incrementing thread");
    }

    assert_eq!(index.get(0).unwrap(), (threads * increments) as i64);
    index.set_overlay(false).unwrap();
    assert_eq!(index.base().get(0).unwrap(), (threads * increments) as i64);
}

// =============================================================================
// Transition Rules
// =============================================================================

/// Enabling twice and disabling twice are no-ops; the view is unchanged.
#[test]
fn test_idempotent_transitions() {
    let index = seeded_index(4, 0);
    index.set_overlay(true).unwrap();
    index.put(0, 42).unwrap();
    index.set_overlay(true).unwrap();
    assert_eq!(index.get(0).unwrap(), 42);

    index.set_overlay(false).unwrap();
    index.set_overlay(false).unwrap();
    assert_eq!(index.mode(), OverlayMode::Base);
    assert_eq!(index.get(0).unwrap(), 42);
}

/// An unset slot reads as the empty value in every state.
#[test]
fn test_unset_slots_read_empty_everywhere() {
    let index = seeded_index(0, 0);
    assert_eq!(index.get(7).unwrap(), EMPTY_SLOT);
    index.set_overlay(true).unwrap();
    assert_eq!(index.get(7).unwrap(), EMPTY_SLOT);
    index.set_overlay(false).unwrap();
    assert_eq!(index.get(7).unwrap(), EMPTY_SLOT);
}

// =============================================================================
// Write-Down Failure and Retry
// =============================================================================

/// A base that fails on demand: flipping `fail` makes every put error.
#[derive(Debug)]
struct FlakyBase {
    inner: MemoryIndex,
    fail: AtomicBool,
}

impl FlakyBase {
    fn new(values: Vec<i64>) -> Self {
        Self {
            inner: MemoryIndex::with_values(values),
            fail: AtomicBool::new(false),
        }
    }
}

impl BaseIndex for FlakyBase {
    fn get(&self, index: u64) -> IndexResult<i64> {
        self.inner.get(index)
    }

    fn put(&self, index: u64, value: i64) -> IndexResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IndexError::Storage(
                fcstate::storage::StorageError::write_failed(
                    "injected base failure",
                    std::io::Error::new(std::io::ErrorKind::Other, "disk detached"),
                ),
            ));
        }
        self.inner.put(index, value)
    }

    fn put_if_equal(&self, index: u64, expected: i64, new_value: i64) -> IndexResult<bool> {
        self.inner.put_if_equal(index, expected, new_value)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn write_to(&self, out: &mut dyn Write) -> IndexResult<u64> {
        self.inner.write_to(out)
    }
}

/// A failed write-down rolls back to an active overlay with the merged
/// view intact, and a retry completes the merge.
#[test]
fn test_write_down_failure_rolls_back_and_retries() {
    let index = VersionedValueIndex::new(FlakyBase::new(vec![1, 2, 3]));
    index.set_overlay(true).unwrap();
    index.put(0, 10).unwrap();
    index.put(2, 30).unwrap();

    index.base().fail.store(true, Ordering::SeqCst);
    let err = index.set_overlay(false).unwrap_err();
    assert!(err.is_retryable_write_down());
    assert_eq!(index.mode(), OverlayMode::OverlayActive);
    // The merged view is untouched by the aborted merge.
    assert_eq!(index.get(0).unwrap(), 10);
    assert_eq!(index.get(1).unwrap(), 2);
    assert_eq!(index.get(2).unwrap(), 30);

    index.base().fail.store(false, Ordering::SeqCst);
    index.set_overlay(false).unwrap();
    assert_eq!(index.mode(), OverlayMode::Base);
    assert_eq!(index.base().get(0).unwrap(), 10);
    assert_eq!(index.base().get(2).unwrap(), 30);
}

// =============================================================================
// Snapshot While Buffered
// =============================================================================

/// The reason the overlay exists: the base can be streamed to a snapshot
/// while writers keep mutating the merged view.
#[test]
fn test_base_snapshot_is_stable_under_overlay_writes() {
    let index = seeded_index(16, 100);
    index.set_overlay(true).unwrap();
    for i in 0..16 {
        index.put(i, -1).unwrap();
    }

    let mut snapshot = Vec::new();
    let written = index.base().write_to(&mut snapshot).unwrap();
    assert_eq!(written, 16);

    // Every streamed slot carries the pre-overlay value.
    let mut cursor = std::io::Cursor::new(snapshot);
    let mut offset = 0u64;
    while let Some(body) = fcstate::storage::read_frame(&mut cursor, offset).unwrap() {
        let record = fcstate::storage::SlotRecord::from_body(&body, offset).unwrap();
        assert_eq!(record.value, record.index as i64 + 100);
        offset += body.len() as u64 + 8;
    }

    index.set_overlay(false).unwrap();
    for i in 0..16 {
        assert_eq!(index.base().get(i).unwrap(), -1);
    }
}
