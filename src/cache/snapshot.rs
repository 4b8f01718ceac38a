//! Serde snapshot support (feature `serde`).
//!
//! The snapshot is a self-describing record: the construction parameters
//! followed by the `(key, value)` entries. Writing locks every segment in
//! index order so the entry set is a consistent point-in-time capture;
//! reading rebuilds the cache from its config and reinserts every entry
//! through the regular `put` path, which re-establishes the eviction
//! policy's state from scratch.
//!
//! Listeners are not part of the snapshot; a restored cache starts without
//! one.

use crossbeam::epoch;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::{CacheConfig, SegmentedCache};

impl<K, V, S> Serialize for SegmentedCache<K, V, S>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync + Serialize,
    V: Clone + Send + Sync + Serialize,
    S: core::hash::BuildHasher,
{
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        // Lock all segments in index order for a consistent capture.
        let _guards: Vec<_> = self.segments().iter().map(|s| s.lock()).collect();

        let guard = epoch::pin();
        let mut entries: Vec<(K, V)> = Vec::new();
        for segment in self.segments() {
            let table = segment.table();
            for i in 0..table.len() {
                let mut cur = table.bucket_at(i).load(&guard);
                while let Some(node) = cur {
                    if let Some(value) = node.value(&guard) {
                        entries.push((node.key.clone(), (*value).clone()));
                    }
                    cur = node.next.clone();
                }
            }
        }

        let mut state = serializer.serialize_struct("SegmentedCache", 2)?;
        state.serialize_field("config", self.config())?;
        state.serialize_field("entries", &entries)?;
        state.end()
    }
}

impl<'de, K, V> Deserialize<'de> for SegmentedCache<K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync + Deserialize<'de>,
    V: Clone + Send + Sync + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Snapshot<K, V> {
            config: CacheConfig,
            entries: Vec<(K, V)>,
        }

        let snapshot = Snapshot::<K, V>::deserialize(deserializer)?;
        let cache = SegmentedCache::init(snapshot.config, None).map_err(serde::de::Error::custom)?;
        for (key, value) in snapshot.entries {
            cache.put(key, value);
        }
        Ok(cache)
    }
}
