//! Archive sinks and sources
//!
//! The map supplies the iteration (pairs ordered by key hash); the sink
//! supplies the encoding. `FileArchiveSink` encodes keys and values as JSON
//! inside checksummed pair frames and finishes by writing the manifest, so
//! a crashed archive is detectable by its missing manifest.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::{ArchiveError, ArchiveResult};
use super::manifest::{pairs_path, ArchiveManifest};
use crate::storage::{FrameReader, FrameWriter, PairRecord};

/// Receives the ordered pair stream of one archived copy.
pub trait ArchiveSink<K, V> {
    /// Writes one (key, value) pair. Pairs arrive in key-hash order.
    fn write_pair(&mut self, key: &K, value: &V) -> ArchiveResult<()>;

    /// Completes the archive. Nothing may be written afterwards.
    fn finish(&mut self, manifest: &ArchiveManifest) -> ArchiveResult<()>;
}

/// Yields the pair stream of a stored archive.
pub trait ArchiveSource<K, V> {
    /// Returns the next pair, or `None` at the end of the archive.
    fn next_pair(&mut self) -> ArchiveResult<Option<(K, V)>>;
}

/// File-backed sink: JSON-encoded pairs in checksummed frames plus a
/// manifest.
#[derive(Debug)]
pub struct FileArchiveSink {
    dir: PathBuf,
    writer: FrameWriter,
    pairs_written: u64,
}

impl FileArchiveSink {
    /// Creates the archive directory and opens the pair file.
    pub fn create(dir: &Path) -> ArchiveResult<Self> {
        std::fs::create_dir_all(dir)?;
        let writer = FrameWriter::open(&pairs_path(dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            writer,
            pairs_written: 0,
        })
    }

    /// Number of pairs written so far.
    pub fn pairs_written(&self) -> u64 {
        self.pairs_written
    }
}

impl<K: Serialize, V: Serialize> ArchiveSink<K, V> for FileArchiveSink {
    fn write_pair(&mut self, key: &K, value: &V) -> ArchiveResult<()> {
        let record = PairRecord {
            key: serde_json::to_vec(key)?,
            value: serde_json::to_vec(value)?,
        };
        self.writer.append(&record.to_frame())?;
        self.pairs_written += 1;
        Ok(())
    }

    fn finish(&mut self, manifest: &ArchiveManifest) -> ArchiveResult<()> {
        self.writer.fsync()?;
        manifest.write_to_dir(&self.dir)
    }
}

/// File-backed source for archives written by `FileArchiveSink`.
#[derive(Debug)]
pub struct FileArchiveSource<K, V> {
    manifest: ArchiveManifest,
    reader: FrameReader,
    pairs_read: u64,
    _pair: PhantomData<(K, V)>,
}

impl<K: DeserializeOwned, V: DeserializeOwned> FileArchiveSource<K, V> {
    /// Opens an archive directory, validating its manifest first.
    pub fn open(dir: &Path) -> ArchiveResult<Self> {
        let manifest = ArchiveManifest::read_from_dir(dir)?;
        let reader = FrameReader::open(&pairs_path(dir))?;
        Ok(Self {
            manifest,
            reader,
            pairs_read: 0,
            _pair: PhantomData,
        })
    }

    /// The manifest of the opened archive.
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }
}

impl<K: DeserializeOwned, V: DeserializeOwned> ArchiveSource<K, V> for FileArchiveSource<K, V> {
    fn next_pair(&mut self) -> ArchiveResult<Option<(K, V)>> {
        let Some(body) = self.reader.next_frame()? else {
            if self.pairs_read != self.manifest.entry_count {
                return Err(ArchiveError::Manifest(format!(
                    "archive ended after {} pairs, manifest promises {}",
                    self.pairs_read, self.manifest.entry_count
                )));
            }
            return Ok(None);
        };
        let record = PairRecord::from_body(&body, self.reader.offset())?;
        let key = serde_json::from_slice(&record.key)?;
        let value = serde_json::from_slice(&record.value)?;
        self.pairs_read += 1;
        Ok(Some((key, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sink_source_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileArchiveSink::create(dir.path()).unwrap();

        sink.write_pair(&"alpha".to_string(), &1i64).unwrap();
        sink.write_pair(&"beta".to_string(), &2i64).unwrap();
        <FileArchiveSink as ArchiveSink<String, i64>>::finish(&mut sink, &ArchiveManifest::new(3, 2))
            .unwrap();

        let mut source: FileArchiveSource<String, i64> =
            FileArchiveSource::open(dir.path()).unwrap();
        assert_eq!(source.manifest().map_version, 3);
        assert_eq!(
            source.next_pair().unwrap(),
            Some(("alpha".to_string(), 1))
        );
        assert_eq!(source.next_pair().unwrap(), Some(("beta".to_string(), 2)));
        assert_eq!(source.next_pair().unwrap(), None);
    }

    #[test]
    fn test_unfinished_archive_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileArchiveSink::create(dir.path()).unwrap();
        sink.write_pair(&"orphan".to_string(), &9i64).unwrap();
        // No finish: the manifest was never written.

        let opened = FileArchiveSource::<String, i64>::open(dir.path());
        assert!(matches!(opened, Err(ArchiveError::Manifest(_))));
    }

    #[test]
    fn test_short_archive_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileArchiveSink::create(dir.path()).unwrap();
        sink.write_pair(&"only".to_string(), &1i64).unwrap();
        // Manifest promises two pairs.
        <FileArchiveSink as ArchiveSink<String, i64>>::finish(&mut sink, &ArchiveManifest::new(1, 2))
            .unwrap();

        let mut source: FileArchiveSource<String, i64> =
            FileArchiveSource::open(dir.path()).unwrap();
        assert!(source.next_pair().unwrap().is_some());
        assert!(matches!(
            source.next_pair(),
            Err(ArchiveError::Manifest(_))
        ));
    }
}
