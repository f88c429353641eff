//! Fast-copyable versioned map
//!
//! This module provides:
//! - `Version` - totally ordered copy identity
//! - `FcMap` - the copy-on-write map: O(1) reads and writes on the mutable
//!   copy, O(1) `copy()`, any number of live read-only snapshots
//! - `MapKey` / `MapValue` / `DeepCopy` - key and value capability traits
//! - `GcStatus` - gauges of the background chain collector
//! - `MapError` - caller-observable failures
//!
//! Internals (mutation chains, the version registry, the collector) stay
//! private; their invariants are documented where they live.

mod errors;
mod gc;
mod map;
mod mutation;
mod registry;
mod value;
mod version;

pub use errors::{MapError, MapResult};
pub use gc::GcStatus;
pub use map::{FcMap, ValueMut};
pub use value::{DeepCopy, MapKey, MapValue, ValueReleaseError};
pub use version::Version;
