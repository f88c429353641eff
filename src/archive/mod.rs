//! Archival of immutable copies and sharded rebuild
//!
//! An immutable copy is archived as a stream of (key, value) pairs ordered
//! by key hash: the map supplies the iteration, the sink supplies the
//! encoding, and the manifest written last makes the archive authoritative.
//! On startup the stream is ingested back in parallel shards.

mod errors;
mod manifest;
mod rebuild;
mod sink;

pub use errors::{ArchiveError, ArchiveResult};
pub use manifest::{manifest_path, pairs_path, ArchiveManifest, MANIFEST_FILE, PAIRS_FILE};
pub use rebuild::{rebuild_from_dir, rebuild_map};
pub use sink::{ArchiveSink, ArchiveSource, FileArchiveSink, FileArchiveSource};

use crate::fcmap::{FcMap, MapKey, MapValue};
use crate::observability::Logger;

/// Archives the entries of `map` into `sink`.
///
/// Requires a root constructed with `archive_enabled` and an immutable
/// copy; a mutable copy still accepting writes cannot produce a stable
/// stream. Returns the manifest the sink was finished with.
pub fn archive_map<K, V, S>(map: &FcMap<K, V>, sink: &mut S) -> ArchiveResult<ArchiveManifest>
where
    K: MapKey,
    V: MapValue,
    S: ArchiveSink<K, V>,
{
    if !map.settings().archive_enabled {
        return Err(ArchiveError::Disabled);
    }
    if !map.is_immutable() {
        return Err(ArchiveError::MutableCopy {
            version: map.version().value(),
        });
    }

    let mut entry_count = 0u64;
    for (key, value) in map.export_by_key_hash()? {
        sink.write_pair(&key, &value)?;
        entry_count += 1;
    }

    let manifest = ArchiveManifest::new(map.version().value(), entry_count);
    sink.finish(&manifest)?;
    map.metrics().increment_archives_written();
    Logger::info(
        "ARCHIVE_WRITTEN",
        &[
            ("entry_count", &entry_count.to_string()),
            ("map_version", &map.version().value().to_string()),
        ],
    );
    Ok(manifest)
}
