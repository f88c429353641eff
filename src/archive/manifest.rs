//! Archive manifest structure and serialization
//!
//! The manifest.json is the authoritative archive descriptor:
//!
//! ```json
//! {
//!   "map_version": 12,
//!   "entry_count": 4096,
//!   "created_at": "2026-02-04T11:30:00Z",
//!   "format_version": 1
//! }
//! ```
//!
//! An archive directory is complete iff the manifest exists and its entry
//! count matches the pair file; the manifest is written last.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{ArchiveError, ArchiveResult};

/// File name of the manifest inside an archive directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the pair frames inside an archive directory.
pub const PAIRS_FILE: &str = "pairs.dat";

/// Authoritative archive descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveManifest {
    /// Version of the archived copy.
    pub map_version: u64,

    /// Number of (key, value) pairs in the archive.
    pub entry_count: u64,

    /// Creation timestamp in RFC3339 format (YYYY-MM-DDTHH:MM:SSZ).
    pub created_at: String,

    /// Manifest format version (always 1).
    pub format_version: u8,
}

impl ArchiveManifest {
    /// Creates a manifest stamped with the current time.
    pub fn new(map_version: u64, entry_count: u64) -> Self {
        Self {
            map_version,
            entry_count,
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            format_version: 1,
        }
    }

    /// Serializes the manifest to pretty JSON.
    pub fn to_json(&self) -> ArchiveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a manifest from JSON.
    pub fn from_json(json: &str) -> ArchiveResult<Self> {
        let manifest: ArchiveManifest = serde_json::from_str(json)
            .map_err(|e| ArchiveError::Manifest(format!("failed to parse manifest: {}", e)))?;
        if manifest.format_version != 1 {
            return Err(ArchiveError::Manifest(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    /// Writes the manifest into `dir` and syncs the file.
    pub fn write_to_dir(&self, dir: &Path) -> ArchiveResult<()> {
        fs::create_dir_all(dir)?;
        let path = manifest_path(dir);
        let mut file = File::create(&path)?;
        file.write_all(self.to_json()?.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads the manifest from `dir`.
    pub fn read_from_dir(dir: &Path) -> ArchiveResult<Self> {
        let path = manifest_path(dir);
        let json = fs::read_to_string(&path).map_err(|e| {
            ArchiveError::Manifest(format!("missing manifest at {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

/// Path of the manifest file inside an archive directory.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Path of the pair file inside an archive directory.
pub fn pairs_path(dir: &Path) -> PathBuf {
    dir.join(PAIRS_FILE)
}
