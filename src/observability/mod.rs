//! Observability for the storage core
//!
//! - Structured logging (JSON, synchronous, deterministic field order)
//! - Monotonic counter metrics
//!
//! Observability is read-only: nothing here influences execution, takes a
//! lock on a data path, or runs in the background.

mod logger;
mod metrics;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
