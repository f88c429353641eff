//! FcMap - fast-copyable versioned map
//!
//! A handle identifies one version of the map. All copies descending from
//! one root share the table, the version registry, and the garbage
//! collector; the version, the immutability flag, the released flag, and
//! the size counter are per-copy.
//!
//! Lifecycle: a copy is mutable until the next `copy()` freezes it, and
//! holds its version's reservation until `release()`. The collector prunes
//! a key's history once the versions that could see it have all retired,
//! and terminates when the last copy releases.
//!
//! Thread rules callers must obey: one writer per mutable copy at a time,
//! no reads or writes concurrent with `release()` of the same handle, and
//! no writes concurrent with `copy()` of the same handle. Reads on
//! immutable copies are always safe.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use super::errors::{MapError, MapResult};
use super::gc::{GcStatus, GcWorker};
use super::mutation::Mutation;
use super::registry::VersionRegistry;
use super::value::{DeepCopy, MapKey, MapValue};
use super::Version;
use crate::observability::MetricsRegistry;
use crate::settings::MapSettings;

/// State shared by every copy descending from one root.
#[derive(Debug)]
struct MapCore<K: MapKey, V: MapValue> {
    table: Arc<DashMap<K, Mutation<V>>>,
    registry: Arc<VersionRegistry>,
    gc: GcWorker<K>,
    metrics: Arc<MetricsRegistry>,
    settings: MapSettings,
}

/// One versioned copy of the map.
#[derive(Debug)]
pub struct FcMap<K: MapKey, V: MapValue> {
    core: Arc<MapCore<K, V>>,
    version: Version,
    immutable: AtomicBool,
    released: AtomicBool,
    size: AtomicU64,
}

impl<K: MapKey, V: MapValue> FcMap<K, V> {
    /// Creates an empty mutable map at the origin version with default
    /// settings.
    pub fn new() -> Self {
        Self::with_settings(MapSettings::default())
    }

    /// Creates an empty mutable map at the origin version.
    pub fn with_settings(settings: MapSettings) -> Self {
        let table = Arc::new(DashMap::new());
        let registry = Arc::new(VersionRegistry::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let gc = GcWorker::spawn(
            Arc::clone(&table),
            Arc::clone(&registry),
            &settings,
            Arc::clone(&metrics),
        );
        registry.register(Version::ORIGIN);
        Self {
            core: Arc::new(MapCore {
                table,
                registry,
                gc,
                metrics,
                settings,
            }),
            version: Version::ORIGIN,
            immutable: AtomicBool::new(false),
            released: AtomicBool::new(false),
            size: AtomicU64::new(0),
        }
    }

    /// The version of this copy.
    pub fn version(&self) -> Version {
        self.version
    }

    /// True once a newer copy has been made from this one.
    pub fn is_immutable(&self) -> bool {
        self.immutable.load(Ordering::SeqCst)
    }

    /// True once this copy has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of keys present at this version. The count is an atomic
    /// snapshot and may trail an in-flight `put`.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// The settings this root was constructed with.
    pub fn settings(&self) -> &MapSettings {
        &self.core.settings
    }

    /// Operational counters for this root.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.core.metrics
    }

    /// Collector gauges: queue depth and liveness.
    pub fn gc_status(&self) -> GcStatus {
        self.core.gc.status()
    }

    /// Blocks until the collector has processed every queued event or the
    /// timeout expires. Returns true if the queue is empty.
    pub fn wait_gc_quiesced(&self, timeout: Duration) -> bool {
        self.core.gc.wait_quiesced(timeout)
    }

    fn ensure_live(&self) -> MapResult<()> {
        if self.core.gc.is_poisoned() {
            return Err(MapError::GcWorkerFault);
        }
        if self.released.load(Ordering::SeqCst) {
            return Err(MapError::AlreadyReleased(self.version));
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> MapResult<()> {
        self.ensure_live()?;
        if self.immutable.load(Ordering::SeqCst) {
            return Err(MapError::Immutable(self.version));
        }
        Ok(())
    }

    /// Returns the value for `key` visible at this copy's version.
    pub fn get(&self, key: &K) -> MapResult<Option<V>> {
        self.ensure_live()?;
        Ok(self
            .core
            .table
            .get(key)
            .and_then(|chain| chain.value_at(self.version).cloned()))
    }

    /// True if `key` is present at this copy's version.
    pub fn contains_key(&self, key: &K) -> MapResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts or replaces the value for `key`. Returns the value that was
    /// visible at this version before the write.
    pub fn put(&self, key: K, value: V) -> MapResult<Option<V>> {
        self.write(key, Some(value))
    }

    /// Removes `key` by writing a tombstone. Returns the value that was
    /// visible at this version before the write.
    pub fn remove(&self, key: &K) -> MapResult<Option<V>> {
        self.write(key.clone(), None)
    }

    fn write(&self, key: K, value: Option<V>) -> MapResult<Option<V>> {
        self.ensure_mutable()?;
        let version = self.version;
        let inserting = value.is_some();
        let mut needs_event = false;
        let prior: Option<V>;

        match self.core.table.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let head = occupied.get_mut();
                prior = head.value_at(version).cloned();
                if head.version == version {
                    // The head at the writer's own version is the one node
                    // that may be overwritten in place.
                    head.value = value;
                } else {
                    let older = std::mem::replace(head, Mutation::new(version, value, None));
                    head.prev = Some(Box::new(older));
                    needs_event = true;
                }
            }
            Entry::Vacant(vacant) => {
                prior = None;
                if let Some(live) = value {
                    vacant.insert(Mutation::new(version, Some(live), None));
                }
                // A tombstone for an absent key changes nothing.
            }
        }

        if needs_event {
            self.core.gc.enqueue(key, version.prior());
            self.core.metrics.increment_gc_events_enqueued();
        }
        match (prior.is_some(), inserting) {
            (false, true) => {
                self.size.fetch_add(1, Ordering::SeqCst);
            }
            (true, false) => {
                self.size.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(prior)
    }

    /// Freezes this copy and returns a new mutable copy at the next
    /// version.
    pub fn copy(&self) -> MapResult<FcMap<K, V>> {
        self.ensure_live()?;
        if self.immutable.swap(true, Ordering::SeqCst) {
            return Err(MapError::Immutable(self.version));
        }
        let child_version = self.version.next();
        self.core.registry.register(child_version);
        self.core.metrics.increment_copies_created();
        Ok(FcMap {
            core: Arc::clone(&self.core),
            version: child_version,
            immutable: AtomicBool::new(false),
            released: AtomicBool::new(false),
            size: AtomicU64::new(self.size.load(Ordering::SeqCst)),
        })
    }

    /// Drops this copy's reservation. The second call reports
    /// `AlreadyReleased` without touching shared state. Releasing the last
    /// copy stops the collector after it drains.
    ///
    /// Release is accepted even on a poisoned map so the last holder can
    /// free the root.
    pub fn release(&self) -> MapResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(MapError::AlreadyReleased(self.version));
        }
        self.immutable.store(true, Ordering::SeqCst);
        self.release_reservation();
        Ok(())
    }

    fn release_reservation(&self) {
        let last = self.core.registry.release(self.version);
        self.core.metrics.increment_copies_released();
        if last {
            self.core.gc.shutdown();
        }
    }

    /// Emits the entries visible at this version ordered by key hash. The
    /// stream is lazy: values are resolved as it is consumed.
    pub fn export_by_key_hash(&self) -> MapResult<impl Iterator<Item = (K, V)>> {
        self.ensure_live()?;
        let version = self.version;
        let mut hashed: Vec<(u64, K)> = self
            .core
            .table
            .iter()
            .filter(|entry| entry.value().value_at(version).is_some())
            .map(|entry| (key_hash(entry.key()), entry.key().clone()))
            .collect();
        hashed.sort_unstable_by_key(|(hash, _)| *hash);

        let core = Arc::clone(&self.core);
        Ok(hashed.into_iter().filter_map(move |(_, key)| {
            let value = core
                .table
                .get(&key)
                .and_then(|chain| chain.value_at(version).cloned());
            value.map(|v| (key, v))
        }))
    }

    /// Inserts an entry at this copy's version during rebuild, bypassing
    /// the mutation protocol. Only valid on a fresh origin copy.
    pub(crate) fn ingest(&self, key: K, value: V) {
        let prior = self
            .core
            .table
            .insert(key, Mutation::new(self.version, Some(value), None));
        if prior.is_none() {
            self.size.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Depth of the retained mutation history for `key`: the head plus
    /// every older node some live copy can still see. Zero when the key
    /// has no chain at all.
    pub fn history_depth(&self, key: &K) -> MapResult<usize> {
        self.ensure_live()?;
        Ok(self
            .core
            .table
            .get(key)
            .map(|chain| chain.len())
            .unwrap_or(0))
    }

    /// The smallest version still holding a reservation, i.e. the
    /// collector's visibility floor.
    pub fn lowest_live_version(&self) -> Option<Version> {
        self.core.registry.lowest_live()
    }
}

impl<K: MapKey, V: DeepCopy> FcMap<K, V> {
    /// Returns a mutable handle to the value for `key` at this version.
    ///
    /// If the head mutation is already at this version the value is
    /// returned in place; otherwise the visible value is deep-copied into a
    /// new head mutation first, so older copies keep reading the original.
    /// Absent keys and tombstones return `None`.
    pub fn get_for_modify(&self, key: &K) -> MapResult<Option<ValueMut<'_, K, V>>> {
        self.ensure_mutable()?;
        let version = self.version;

        match self.core.table.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let head = occupied.get_mut();
                if head.version == version {
                    if head.value.is_none() {
                        return Ok(None);
                    }
                } else {
                    let copied = match head.value_at(version) {
                        Some(value) => value.deep_copy(),
                        None => return Ok(None),
                    };
                    let older = std::mem::replace(head, Mutation::new(version, Some(copied), None));
                    head.prev = Some(Box::new(older));
                    self.core.gc.enqueue(key.clone(), version.prior());
                    self.core.metrics.increment_gc_events_enqueued();
                }
                Ok(Some(ValueMut {
                    guard: occupied.into_ref(),
                }))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }
}

impl<K: MapKey, V: MapValue> Default for FcMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, V: MapValue> Drop for FcMap<K, V> {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.immutable.store(true, Ordering::SeqCst);
            self.release_reservation();
        }
    }
}

/// Mutable access to a value installed at the writer's version. Holds the
/// table entry lock for the key; drop it before touching the same key
/// again.
pub struct ValueMut<'a, K: MapKey, V: MapValue> {
    guard: RefMut<'a, K, Mutation<V>>,
}

impl<K: MapKey, V: MapValue> Deref for ValueMut<'_, K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.guard
            .value
            .as_ref()
            .expect("head mutation holds a live value")
    }
}

impl<K: MapKey, V: MapValue> DerefMut for ValueMut<'_, K, V> {
    fn deref_mut(&mut self) -> &mut V {
        self.guard
            .value
            .as_mut()
            .expect("head mutation holds a live value")
    }
}

fn key_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
