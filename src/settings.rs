//! Map construction settings
//!
//! Configuration is explicit and per-root: a settings value is handed to
//! the map constructor and applies to that root for its whole lifetime.
//! There is no process-wide settings state.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

/// Settings for one map root.
#[derive(Debug, Clone)]
pub struct MapSettings {
    /// Soft bound on pending GC events. Exceeding it never blocks writers;
    /// a persistent overrun logs a throttled warning.
    pub max_gc_queue_size: usize,
    /// Minimum time the GC queue must stay over the bound before a warning
    /// is logged, and the minimum time between repeat warnings.
    pub gc_queue_threshold_period: Duration,
    /// Opt-in to archival of immutable copies.
    pub archive_enabled: bool,
    /// Number of shards a rebuild splits its input into.
    pub rebuild_split_factor: usize,
    /// Number of threads a rebuild runs. Defaults to hardware parallelism.
    pub rebuild_thread_count: usize,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            max_gc_queue_size: 200,
            gc_queue_threshold_period: Duration::from_secs(60),
            archive_enabled: false,
            rebuild_split_factor: 8,
            rebuild_thread_count: default_thread_count(),
        }
    }
}

impl MapSettings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns settings with archival enabled.
    pub fn with_archive_enabled(mut self) -> Self {
        self.archive_enabled = true;
        self
    }

    /// Returns settings with the given GC queue bound and warning period.
    pub fn with_gc_queue(mut self, max_size: usize, threshold_period: Duration) -> Self {
        self.max_gc_queue_size = max_size;
        self.gc_queue_threshold_period = threshold_period;
        self
    }

    /// Returns settings with the given rebuild parallelism.
    pub fn with_rebuild_parallelism(mut self, split_factor: usize, thread_count: usize) -> Self {
        self.rebuild_split_factor = split_factor.max(1);
        self.rebuild_thread_count = thread_count.max(1);
        self
    }
}

fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
