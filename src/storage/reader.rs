//! Sequential frame reader with strict corruption detection
//!
//! Every frame read validates its checksum. Any mismatch is fatal and is
//! reported with the byte offset of the offending frame.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::read_frame;

/// Reads checksummed frames sequentially from a file.
#[derive(Debug)]
pub struct FrameReader {
    /// Path to the backing file
    path: PathBuf,
    /// Buffered reader
    reader: BufReader<File>,
    /// Byte offset of the next frame
    offset: u64,
}

impl FrameReader {
    /// Opens the file at `path` for sequential reading.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| {
            StorageError::read_failed(format!("failed to open file: {}", path.display()), e)
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            offset: 0,
        })
    }

    /// Reads the next frame body. Returns `Ok(None)` at a clean end of
    /// file.
    pub fn next_frame(&mut self) -> StorageResult<Option<Vec<u8>>> {
        let at = self.offset;
        match read_frame(&mut self.reader, at)? {
            Some(body) => {
                // Frame overhead: length field and checksum.
                self.offset += body.len() as u64 + 8;
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    /// Byte offset of the frame `next_frame` will read next. Valid input
    /// for corruption reports.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::encode_frame;
    use crate::storage::writer::FrameWriter;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_reads_back_written_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.dat");
        let mut writer = FrameWriter::open(&path).unwrap();
        writer.append(&encode_frame(b"one")).unwrap();
        writer.append(&encode_frame(b"two")).unwrap();
        writer.fsync().unwrap();

        let mut reader = FrameReader::open(&path).unwrap();
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"one");
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"two");
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_reports_corruption_with_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.dat");
        let first = encode_frame(b"intact");
        {
            let mut writer = FrameWriter::open(&path).unwrap();
            writer.append(&first).unwrap();
            writer.append(&encode_frame(b"broken")).unwrap();
            writer.fsync().unwrap();
        }
        // Flip one byte inside the second frame's body.
        let mut bytes = std::fs::read(&path).unwrap();
        let target = first.len() + 5;
        bytes[target] ^= 0xFF;
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let mut reader = FrameReader::open(&path).unwrap();
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"intact");
        let err = reader.next_frame().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.details(),
            Some(format!("byte_offset: {}", first.len()).as_str())
        );
    }

    #[test]
    fn test_missing_file_is_read_failure() {
        let dir = TempDir::new().unwrap();
        let err = FrameReader::open(&dir.path().join("absent.dat")).unwrap_err();
        assert!(!err.is_fatal());
    }
}
