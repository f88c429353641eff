//! Background garbage collection of mutation chains
//!
//! One dedicated worker per map root consumes prune events from a channel.
//! An event `(key, below)` means: once every version ≤ `below` has retired,
//! the chain for `key` can be pruned to the visibility floor.
//!
//! Rules the worker obeys:
//! - Events are consumed in arrival order
//! - A prune waits until its watermark version retires, then keeps every
//!   node above the floor plus the node visible at the floor
//! - A chain reduced to a lone tombstone is removed from the table
//! - Evicted releasable values get their `release` hook; a failure is
//!   logged and absorbed
//! - The per-entry table lock is never held across a channel or condvar
//!   wait
//!
//! The queue is unbounded with a soft size bound: producers are never
//! blocked and events are never dropped, but a queue that stays over the
//! bound for longer than the threshold period logs a throttled warning.
//!
//! A panic inside the worker poisons the map: the worker stops and every
//! subsequent public call on any copy reports the fault.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;

use super::mutation::Mutation;
use super::registry::VersionRegistry;
use super::value::{MapKey, MapValue};
use super::Version;
use crate::observability::{Logger, MetricsRegistry};
use crate::settings::MapSettings;

/// A queued prune request.
#[derive(Debug)]
pub(crate) struct GcEvent<K> {
    pub(crate) key: K,
    /// Prune may proceed once every version ≤ this watermark has retired.
    pub(crate) below: Version,
}

/// Observable collector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStatus {
    /// Events enqueued but not yet fully processed.
    pub pending_events: u64,
    /// False once the worker has terminated or panicked.
    pub running: bool,
}

#[derive(Debug)]
struct GcShared {
    pending: AtomicU64,
    running: AtomicBool,
    poisoned: AtomicBool,
    stop: AtomicBool,
    idle: Mutex<()>,
    idle_signal: Condvar,
}

impl GcShared {
    fn notify_idle(&self) {
        let _guard = self.idle.lock().expect("gc idle mutex poisoned");
        self.idle_signal.notify_all();
    }
}

/// Producer-side handle to the collector of one map root.
#[derive(Debug)]
pub(crate) struct GcWorker<K: MapKey> {
    shared: Arc<GcShared>,
    registry: Arc<VersionRegistry>,
    sender: Mutex<Option<Sender<GcEvent<K>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    max_queue_size: usize,
    threshold_period: Duration,
    overrun_since: Mutex<Option<Instant>>,
}

impl<K: MapKey> GcWorker<K> {
    /// Starts the worker thread for `table`.
    pub(crate) fn spawn<V: MapValue>(
        table: Arc<DashMap<K, Mutation<V>>>,
        registry: Arc<VersionRegistry>,
        settings: &MapSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (sender, receiver) = channel::unbounded();
        let shared = Arc::new(GcShared {
            pending: AtomicU64::new(0),
            running: AtomicBool::new(true),
            poisoned: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            idle: Mutex::new(()),
            idle_signal: Condvar::new(),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            let registry = Arc::clone(&registry);
            thread::Builder::new()
                .name("fcstate-gc".to_string())
                .spawn(move || run_worker(table, registry, metrics, shared, receiver))
                .expect("failed to spawn gc worker thread")
        };

        Self {
            shared,
            registry,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            max_queue_size: settings.max_gc_queue_size,
            threshold_period: settings.gc_queue_threshold_period,
            overrun_since: Mutex::new(None),
        }
    }

    /// Queues a prune event. Never blocks; a send after shutdown or a
    /// poisoning fault is silently ignored.
    pub(crate) fn enqueue(&self, key: K, below: Version) {
        if self.shared.poisoned.load(Ordering::SeqCst) {
            return;
        }
        let sender = self.sender.lock().expect("gc sender mutex poisoned");
        let Some(sender) = sender.as_ref() else {
            return;
        };
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(GcEvent { key, below }).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.note_queue_depth();
    }

    /// Throttled soft-bound warning. The queue may exceed the bound; only
    /// an overrun that persists past the threshold period is reported, at
    /// most once per period.
    fn note_queue_depth(&self) {
        let pending = self.shared.pending.load(Ordering::SeqCst) as usize;
        let mut overrun = self.overrun_since.lock().expect("gc overrun mutex poisoned");
        if pending <= self.max_queue_size {
            *overrun = None;
            return;
        }
        match *overrun {
            None => *overrun = Some(Instant::now()),
            Some(since) if since.elapsed() >= self.threshold_period => {
                Logger::warn(
                    "GC_QUEUE_OVERRUN",
                    &[
                        ("max_queue_size", &self.max_queue_size.to_string()),
                        ("pending_events", &pending.to_string()),
                    ],
                );
                *overrun = Some(Instant::now());
            }
            Some(_) => {}
        }
    }

    /// True once the worker has panicked.
    pub(crate) fn is_poisoned(&self) -> bool {
        self.shared.poisoned.load(Ordering::SeqCst)
    }

    /// Gauge snapshot: queue depth and liveness.
    pub(crate) fn status(&self) -> GcStatus {
        GcStatus {
            pending_events: self.shared.pending.load(Ordering::SeqCst),
            running: self.shared.running.load(Ordering::SeqCst),
        }
    }

    /// Blocks until all queued events have been processed, the worker has
    /// terminated, or the timeout expires. Returns true if the queue is
    /// empty.
    pub(crate) fn wait_quiesced(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.idle.lock().expect("gc idle mutex poisoned");
        while self.shared.pending.load(Ordering::SeqCst) != 0
            && self.shared.running.load(Ordering::SeqCst)
        {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (reacquired, _) = self
                .shared
                .idle_signal
                .wait_timeout(guard, deadline - now)
                .expect("gc idle mutex poisoned");
            guard = reacquired;
        }
        self.shared.pending.load(Ordering::SeqCst) == 0
    }

    /// Cooperative stop, called when the last copy releases. Closes the
    /// channel, wakes any retirement wait, and joins the worker after it
    /// has drained the remaining events.
    pub(crate) fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.registry.nudge();
        let sender = self.sender.lock().expect("gc sender mutex poisoned").take();
        drop(sender);
        let thread = self.thread.lock().expect("gc thread mutex poisoned").take();
        if let Some(handle) = thread {
            let _ = handle.join();
        }
    }
}

fn run_worker<K: MapKey, V: MapValue>(
    table: Arc<DashMap<K, Mutation<V>>>,
    registry: Arc<VersionRegistry>,
    metrics: Arc<MetricsRegistry>,
    shared: Arc<GcShared>,
    receiver: Receiver<GcEvent<K>>,
) {
    // recv keeps yielding buffered events after the channel closes, so the
    // queue drains before the worker exits.
    while let Ok(event) = receiver.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            process_event(&table, &registry, &metrics, &shared, event);
        }));
        if shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            shared.notify_idle();
        }
        if outcome.is_err() {
            shared.poisoned.store(true, Ordering::SeqCst);
            Logger::fatal("GC_WORKER_PANIC", &[("thread", "fcstate-gc")]);
            break;
        }
    }
    shared.running.store(false, Ordering::SeqCst);
    shared.notify_idle();
}

fn process_event<K: MapKey, V: MapValue>(
    table: &DashMap<K, Mutation<V>>,
    registry: &VersionRegistry,
    metrics: &MetricsRegistry,
    shared: &GcShared,
    event: GcEvent<K>,
) {
    registry.wait_until_retired(event.below, &shared.stop);
    let floor = registry
        .lowest_live()
        .unwrap_or_else(|| Version::new(u64::MAX));

    let mut evicted = Vec::new();
    let mut lone_tombstone = false;
    if let Some(mut chain) = table.get_mut(&event.key) {
        evicted = chain.prune_below(floor);
        lone_tombstone = chain.is_lone_tombstone();
    }
    if lone_tombstone
        && table
            .remove_if(&event.key, |_, chain| chain.is_lone_tombstone())
            .is_some()
    {
        metrics.increment_keys_collected();
    }

    if evicted.is_empty() {
        return;
    }
    metrics.add_mutations_pruned(evicted.len() as u64);
    if V::RELEASABLE {
        for mut value in evicted {
            if let Err(err) = value.release() {
                metrics.increment_value_release_failures();
                Logger::error("VALUE_RELEASE_FAILED", &[("reason", err.reason())]);
            }
        }
    }
}
