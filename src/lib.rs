//! fcstate - fast-copyable versioned state storage for a consensus node
//!
//! Two cooperating subsystems let many immutable snapshot copies of state
//! coexist with a single mutable working copy:
//!
//! - [`fcmap`]: a copy-on-write hash map with O(1) reads and writes on the
//!   mutable copy, O(1) `copy()`, and a background collector that prunes
//!   per-key history once the snapshots that could see it retire.
//! - [`index`]: a long-keyed value store whose overlay mode buffers writes
//!   above the base while a snapshot consumer streams it, then merges the
//!   overlay back down without stopping writers.
//!
//! [`archive`] persists immutable copies and rebuilds maps in parallel
//! shards; [`storage`] supplies checksummed frame persistence;
//! [`observability`] carries the structured logs and counters; and
//! [`settings`] holds per-root configuration.

pub mod archive;
pub mod fcmap;
pub mod index;
pub mod observability;
pub mod settings;
pub mod storage;
