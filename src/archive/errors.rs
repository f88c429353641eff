//! Archive error types

use thiserror::Error;

use crate::fcmap::MapError;
use crate::storage::StorageError;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while archiving or rebuilding a map.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The map was constructed without `archive_enabled`.
    #[error("archival is disabled for this map")]
    Disabled,

    /// Only immutable copies may be archived; make a copy first.
    #[error("cannot archive a mutable copy at {version}")]
    MutableCopy { version: u64 },

    /// Key or value encoding failed.
    #[error("archive encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The archive manifest is missing or does not describe the pair file.
    #[error("archive manifest invalid: {0}")]
    Manifest(String),

    /// A frame-level persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A manifest file I/O failure.
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The map rejected an operation during archive or rebuild.
    #[error(transparent)]
    Map(#[from] MapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_display() {
        assert!(ArchiveError::Disabled.to_string().contains("disabled"));
    }

    #[test]
    fn test_mutable_copy_names_version() {
        let err = ArchiveError::MutableCopy { version: 4 };
        assert!(err.to_string().contains('4'));
    }
}
