//! Index error types

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by the versioned value index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An overlay transition raced another transition. Enabling an already
    /// active overlay and disabling an already inactive one are no-ops;
    /// only a transition meeting a write-down in flight is an error.
    #[error("overlay transition already in progress")]
    OverlayMisuse,

    /// A base write failed while the overlay was being merged down. The
    /// overlay is still active and the merge can be retried.
    #[error("write-down aborted at slot {index}; overlay remains active")]
    WriteDownFailed {
        index: u64,
        #[source]
        source: Box<IndexError>,
    },

    /// A persistence operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IndexError {
    /// True if the error left an active overlay behind for a retry.
    pub fn is_retryable_write_down(&self) -> bool {
        matches!(self, IndexError::WriteDownFailed { .. })
    }
}
