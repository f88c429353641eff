//! Storage error types
//!
//! Error codes:
//! - FCSTATE_STORAGE_IO_ERROR (ERROR severity)
//! - FCSTATE_STORAGE_WRITE_FAILED (ERROR severity)
//! - FCSTATE_STORAGE_READ_FAILED (ERROR severity)
//! - FCSTATE_DATA_CORRUPTION (FATAL severity)
//!
//! Corruption is fatal: a frame that fails checksum validation aborts the
//! operation, and during a rebuild aborts startup.

use std::fmt;
use std::io;

/// Severity levels for storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the process continues
    Error,
    /// The affected state must not be used
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure
    IoError,
    /// Frame write failed
    WriteFailed,
    /// Frame read failed
    ReadFailed,
    /// Checksum or framing failure
    DataCorruption,
}

impl StorageErrorCode {
    /// Returns the string code.
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::IoError => "FCSTATE_STORAGE_IO_ERROR",
            StorageErrorCode::WriteFailed => "FCSTATE_STORAGE_WRITE_FAILED",
            StorageErrorCode::ReadFailed => "FCSTATE_STORAGE_READ_FAILED",
            StorageErrorCode::DataCorruption => "FCSTATE_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::IoError => Severity::Error,
            StorageErrorCode::WriteFailed => Severity::Error,
            StorageErrorCode::ReadFailed => Severity::Error,
            StorageErrorCode::DataCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, severity, and context.
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    /// Create a storage I/O error.
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::IoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a frame write error.
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::WriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a frame read error.
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::ReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a corruption error (FATAL).
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::DataCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error with byte offset context.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::DataCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal for the affected state.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StorageErrorCode::IoError.code(), "FCSTATE_STORAGE_IO_ERROR");
        assert_eq!(
            StorageErrorCode::DataCorruption.code(),
            "FCSTATE_DATA_CORRUPTION"
        );
    }

    #[test]
    fn test_corruption_is_fatal() {
        let err = StorageError::data_corruption("checksum mismatch");
        assert!(err.is_fatal());
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn test_write_failed_not_fatal() {
        let err = StorageError::write_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_contains_code_and_context() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = err.to_string();
        assert!(display.contains("FCSTATE_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
