//! Map error types
//!
//! Every kind here is a caller-observable failure of a public map
//! operation. `Immutable` and `AlreadyReleased` are caller logic bugs and
//! leave the copy unchanged. `GcWorkerFault` is terminal: once the
//! collector has panicked, the map is poisoned and stays poisoned.

use thiserror::Error;

use super::Version;

/// Result type for map operations.
pub type MapResult<T> = Result<T, MapError>;

/// Errors raised by public map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// A write or copy was attempted on a copy that has been frozen by a
    /// newer `copy()`.
    #[error("copy at {0} is immutable")]
    Immutable(Version),

    /// An operation was attempted on a copy after its `release()`. Double
    /// release reports this without corrupting shared state.
    #[error("copy at {0} has already been released")]
    AlreadyReleased(Version),

    /// The garbage collector panicked. The map is poisoned; no further
    /// reads or writes are accepted on any copy.
    #[error("garbage collector failed; map is poisoned")]
    GcWorkerFault,
}
