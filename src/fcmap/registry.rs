//! Version registry - live snapshot reservations
//!
//! Tracks a reservation count per live version. The smallest version with a
//! reservation is the visibility floor: no mutation at or above the floor
//! may be collected. Stale floor reads are harmless; the collector may do
//! extra work but never wrong work.
//!
//! The registry is also the collector's waiting room: pruning an event for
//! version v must wait until v has retired (every reservation at or below v
//! dropped). Releases signal the condvar so waiting prune work advances.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use super::Version;

/// Reservation counts for all live versions of one map root.
#[derive(Debug)]
pub(crate) struct VersionRegistry {
    live: Mutex<BTreeMap<u64, u32>>,
    retired: Condvar,
}

impl VersionRegistry {
    /// Creates an empty registry. The map constructor registers the origin
    /// version itself.
    pub(crate) fn new() -> Self {
        Self {
            live: Mutex::new(BTreeMap::new()),
            retired: Condvar::new(),
        }
    }

    /// Registers a reservation for `version`.
    pub(crate) fn register(&self, version: Version) {
        let mut live = self.live.lock().expect("version registry mutex poisoned");
        *live.entry(version.value()).or_insert(0) += 1;
    }

    /// Drops one reservation for `version`. Returns true when no live
    /// version remains, i.e. the caller released the last copy.
    pub(crate) fn release(&self, version: Version) -> bool {
        let mut live = self.live.lock().expect("version registry mutex poisoned");
        if let Some(count) = live.get_mut(&version.value()) {
            *count -= 1;
            if *count == 0 {
                live.remove(&version.value());
            }
        }
        self.retired.notify_all();
        live.is_empty()
    }

    /// The smallest version still holding a reservation.
    pub(crate) fn lowest_live(&self) -> Option<Version> {
        let live = self.live.lock().expect("version registry mutex poisoned");
        live.keys().next().map(|v| Version::new(*v))
    }

    /// Current reservation count for `version`.
    #[cfg(test)]
    pub(crate) fn reservation(&self, version: Version) -> u32 {
        let live = self.live.lock().expect("version registry mutex poisoned");
        live.get(&version.value()).copied().unwrap_or(0)
    }

    /// Blocks until every reservation at or below `below` is gone, or until
    /// `cancelled` is raised.
    pub(crate) fn wait_until_retired(&self, below: Version, cancelled: &AtomicBool) {
        let mut live = self.live.lock().expect("version registry mutex poisoned");
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            match live.keys().next() {
                Some(&lowest) if lowest <= below.value() => {
                    live = self
                        .retired
                        .wait(live)
                        .expect("version registry mutex poisoned");
                }
                _ => return,
            }
        }
    }

    /// Wakes any waiter; used when the collector is asked to stop.
    pub(crate) fn nudge(&self) {
        let _live = self.live.lock().expect("version registry mutex poisoned");
        self.retired.notify_all();
    }
}
