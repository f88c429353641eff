//! Parallel sharded rebuild
//!
//! Startup path: a map is reconstructed from an archive by splitting the
//! pair stream into `rebuild_split_factor` shards and ingesting them on
//! `rebuild_thread_count` threads. Duplicate keys within a shard are
//! undefined; across shards the last write wins by arrival order. The
//! rebuilt map is a fresh mutable origin copy.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;

use serde::de::DeserializeOwned;

use super::errors::ArchiveResult;
use super::sink::{ArchiveSource, FileArchiveSource};
use crate::fcmap::{FcMap, MapKey, MapValue};
use crate::settings::MapSettings;

/// Rebuilds a map from `source`, sharding the ingest across the settings'
/// rebuild parallelism.
pub fn rebuild_map<K, V, S>(settings: MapSettings, source: &mut S) -> ArchiveResult<FcMap<K, V>>
where
    K: MapKey,
    V: MapValue,
    S: ArchiveSource<K, V>,
{
    let split_factor = settings.rebuild_split_factor.max(1);
    let thread_count = settings.rebuild_thread_count.max(1);

    let mut pairs = Vec::new();
    while let Some(pair) = source.next_pair()? {
        pairs.push(pair);
    }

    let map = FcMap::with_settings(settings);
    let shard_len = pairs.len().div_ceil(split_factor).max(1);
    let shards: Mutex<VecDeque<Vec<(K, V)>>> = Mutex::new(
        chunk_pairs(pairs, shard_len).into(),
    );

    thread::scope(|scope| {
        for _ in 0..thread_count.min(split_factor) {
            scope.spawn(|| loop {
                let shard = {
                    let mut queue = shards.lock().expect("rebuild shard queue poisoned");
                    queue.pop_front()
                };
                let Some(shard) = shard else {
                    break;
                };
                for (key, value) in shard {
                    map.ingest(key, value);
                }
            });
        }
    });

    map.metrics().increment_rebuilds_completed();
    Ok(map)
}

/// Rebuilds a map from a file archive directory.
pub fn rebuild_from_dir<K, V>(settings: MapSettings, dir: &std::path::Path) -> ArchiveResult<FcMap<K, V>>
where
    K: MapKey + DeserializeOwned,
    V: MapValue + DeserializeOwned,
{
    let mut source: FileArchiveSource<K, V> = FileArchiveSource::open(dir)?;
    rebuild_map(settings, &mut source)
}

fn chunk_pairs<K, V>(pairs: Vec<(K, V)>, shard_len: usize) -> Vec<Vec<(K, V)>> {
    let mut shards = Vec::new();
    let mut current = Vec::with_capacity(shard_len);
    for pair in pairs {
        current.push(pair);
        if current.len() == shard_len {
            shards.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource {
        pairs: VecDeque<(String, i64)>,
    }

    impl ArchiveSource<String, i64> for VecSource {
        fn next_pair(&mut self) -> ArchiveResult<Option<(String, i64)>> {
            Ok(self.pairs.pop_front())
        }
    }

    fn source_of(count: i64) -> VecSource {
        VecSource {
            pairs: (0..count).map(|i| (format!("key{i}"), i)).collect(),
        }
    }

    #[test]
    fn test_rebuild_restores_every_pair() {
        let settings = MapSettings::new().with_rebuild_parallelism(4, 2);
        let map = rebuild_map(settings, &mut source_of(100)).unwrap();

        assert_eq!(map.size(), 100);
        for i in 0..100 {
            assert_eq!(map.get(&format!("key{i}")).unwrap(), Some(i));
        }
        assert_eq!(map.metrics().snapshot().rebuilds_completed, 1);
        map.release().unwrap();
    }

    #[test]
    fn test_rebuilt_map_is_mutable_origin() {
        let map = rebuild_map(MapSettings::default(), &mut source_of(3)).unwrap();
        assert_eq!(map.version().value(), 0);
        assert!(!map.is_immutable());
        map.put("key0".to_string(), 99).unwrap();
        assert_eq!(map.get(&"key0".to_string()).unwrap(), Some(99));
        map.release().unwrap();
    }

    #[test]
    fn test_rebuild_empty_source() {
        let map: FcMap<String, i64> =
            rebuild_map(MapSettings::default(), &mut source_of(0)).unwrap();
        assert_eq!(map.size(), 0);
        map.release().unwrap();
    }

    #[test]
    fn test_more_threads_than_shards() {
        let settings = MapSettings::new().with_rebuild_parallelism(2, 16);
        let map = rebuild_map(settings, &mut source_of(10)).unwrap();
        assert_eq!(map.size(), 10);
        map.release().unwrap();
    }

    #[test]
    fn test_chunking_covers_all_pairs() {
        let pairs: Vec<(String, i64)> = (0..10).map(|i| (format!("k{i}"), i)).collect();
        let shards = chunk_pairs(pairs, 4);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 10);
    }
}
