//! Append-only frame writer with fsync enforcement
//!
//! Frames are appended and never rewritten in place. Callers decide when a
//! batch of frames becomes durable by calling `fsync`; a snapshot is not
//! complete until its writer has been synced.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};

/// Appends checksummed frames to a single file.
#[derive(Debug)]
pub struct FrameWriter {
    /// Path to the backing file
    path: PathBuf,
    /// Underlying file handle
    file: File,
    /// Current file offset
    offset: u64,
}

impl FrameWriter {
    /// Opens or creates the file at `path` for appending. Parent
    /// directories are created if missing.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::write_failed(
                        format!("failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                StorageError::write_failed(format!("failed to open file: {}", path.display()), e)
            })?;

        let offset = file
            .metadata()
            .map_err(|e| StorageError::write_failed("failed to read file metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset,
        })
    }

    /// Appends one frame. Returns the byte offset the frame starts at.
    pub fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let at = self.offset;
        self.file.write_all(frame).map_err(|e| {
            StorageError::write_failed(format!("failed to append to {}", self.path.display()), e)
        })?;
        self.offset += frame.len() as u64;
        Ok(at)
    }

    /// Forces appended frames to disk.
    pub fn fsync(&mut self) -> StorageResult<()> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::io_error(format!("fsync of {}", self.path.display()), e))
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current file offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::encode_frame;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("frames.dat");
        let writer = FrameWriter::open(&path).unwrap();
        assert_eq!(writer.offset(), 0);
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_append_tracks_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.dat");
        let mut writer = FrameWriter::open(&path).unwrap();

        let frame = encode_frame(b"first");
        assert_eq!(writer.append(&frame).unwrap(), 0);
        let second = encode_frame(b"second");
        assert_eq!(writer.append(&second).unwrap(), frame.len() as u64);
        writer.fsync().unwrap();

        assert_eq!(
            writer.offset(),
            (frame.len() + second.len()) as u64
        );
    }

    #[test]
    fn test_reopen_appends_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.dat");
        let frame = encode_frame(b"persisted");
        {
            let mut writer = FrameWriter::open(&path).unwrap();
            writer.append(&frame).unwrap();
            writer.fsync().unwrap();
        }
        let writer = FrameWriter::open(&path).unwrap();
        assert_eq!(writer.offset(), frame.len() as u64);
    }
}
