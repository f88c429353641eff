//! Metrics registry
//!
//! Monotonic counters only, reset on process start. Thread-safe with
//! relaxed atomics; metrics never take locks and never affect execution.
//! Collector queue depth and liveness are gauges and live on the worker
//! handle instead, where they are exact.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one map root.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Copies created via `copy()`
    copies_created: AtomicU64,
    /// Copies released (explicitly or on drop)
    copies_released: AtomicU64,
    /// GC events enqueued by writers
    gc_events_enqueued: AtomicU64,
    /// Chain nodes unlinked by the collector
    mutations_pruned: AtomicU64,
    /// Keys removed after collapsing to a lone tombstone
    keys_collected: AtomicU64,
    /// Value release hooks that failed (absorbed)
    value_release_failures: AtomicU64,
    /// Archives written
    archives_written: AtomicU64,
    /// Rebuilds completed
    rebuilds_completed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment copies created.
    pub fn increment_copies_created(&self) {
        self.copies_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment copies released.
    pub fn increment_copies_released(&self) {
        self.copies_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment GC events enqueued.
    pub fn increment_gc_events_enqueued(&self) {
        self.gc_events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Add pruned chain nodes.
    pub fn add_mutations_pruned(&self, count: u64) {
        self.mutations_pruned.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment keys fully collected.
    pub fn increment_keys_collected(&self) {
        self.keys_collected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment absorbed value release failures.
    pub fn increment_value_release_failures(&self) {
        self.value_release_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment archives written.
    pub fn increment_archives_written(&self) {
        self.archives_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rebuilds completed.
    pub fn increment_rebuilds_completed(&self) {
        self.rebuilds_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            copies_created: self.copies_created.load(Ordering::Relaxed),
            copies_released: self.copies_released.load(Ordering::Relaxed),
            gc_events_enqueued: self.gc_events_enqueued.load(Ordering::Relaxed),
            mutations_pruned: self.mutations_pruned.load(Ordering::Relaxed),
            keys_collected: self.keys_collected.load(Ordering::Relaxed),
            value_release_failures: self.value_release_failures.load(Ordering::Relaxed),
            archives_written: self.archives_written.load(Ordering::Relaxed),
            rebuilds_completed: self.rebuilds_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub copies_created: u64,
    pub copies_released: u64,
    pub gc_events_enqueued: u64,
    pub mutations_pruned: u64,
    pub keys_collected: u64,
    pub value_release_failures: u64,
    pub archives_written: u64,
    pub rebuilds_completed: u64,
}
