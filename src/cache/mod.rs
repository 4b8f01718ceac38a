//! Segmented concurrent associative cache with pluggable eviction.
//!
//! The key space is partitioned across independently locked segments:
//! writers serialize on their segment's mutex, readers never lock at all.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SegmentedCache                            │
//! │                                                                 │
//! │  spread(hash(key))                                              │
//! │    high bits ──▶ segment        low bits ──▶ bucket             │
//! │                                                                 │
//! │  ┌───────────────┐ ┌───────────────┐     ┌───────────────┐      │
//! │  │  Segment 0    │ │  Segment 1    │ ... │  Segment N-1  │      │
//! │  │  Mutex        │ │  Mutex        │     │  Mutex        │      │
//! │  │  count (R/A)  │ │  count (R/A)  │     │  count (R/A)  │      │
//! │  │  buckets      │ │  buckets      │     │  buckets      │      │
//! │  │  access buf   │ │  access buf   │     │  access buf   │      │
//! │  │  policy       │ │  policy       │     │  policy       │      │
//! │  └───────────────┘ └───────────────┘     └───────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads are lock-free: bucket chains have immutable `next` links and are
//! only ever replaced from the head, values are published through
//! release/acquire atomics, and reclamation is deferred past all active
//! readers. Hits are recorded in a per-segment access buffer and replayed
//! into the eviction policy in batches, so the common read path never pays
//! for recency bookkeeping.
//!
//! Three eviction policies are available per [`EvictionStrategy`]: `None`
//! (the table resizes instead of evicting), `Lru` and `Lirs`. Eviction
//! listener callbacks always run on the calling thread *after* the segment
//! lock has been released.

pub(crate) mod atomic;
mod iter;
pub(crate) mod node;
pub(crate) mod policy;
mod segment;
#[cfg(feature = "serde")]
mod snapshot;

pub use iter::{Iter, Keys, Values};
pub use node::RecencyState;
pub use policy::EvictionStrategy;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam::epoch;
use hashbrown::DefaultHashBuilder;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::MetricsSource;
use iter::RawIter;
use node::spread;
use segment::{Evicted, Segment};

/// Hard cap on the number of segments.
pub const MAX_SEGMENTS: usize = 1 << 16;

/// Unsynchronized attempts at a cross-segment aggregate before falling back
/// to locking every segment.
pub(crate) const RETRIES_BEFORE_LOCK: usize = 2;

/// Receives `(key, value)` pairs evicted by the cache's policy.
///
/// Callbacks run on the thread whose operation triggered the eviction,
/// after that segment's lock has been released. A panicking listener is
/// logged and otherwise ignored; it cannot corrupt the cache.
pub trait EvictionListener<K, V>: Send + Sync {
    /// Called once per evicted entry.
    fn on_evict(&self, key: &K, value: &V);
}

/// A concurrent hash map with segment-striped locking and pluggable
/// eviction.
///
/// # Example
///
/// ```
/// use triad_core::{CacheConfig, EvictionStrategy, SegmentedCache};
///
/// let config = CacheConfig::new(EvictionStrategy::Lru)
///     .with_capacity(1024)
///     .with_concurrency_level(8);
/// let cache: SegmentedCache<String, u64> = SegmentedCache::init(config, None).unwrap();
///
/// cache.put("answer".to_string(), 42);
/// assert_eq!(cache.get("answer"), Some(42));
/// assert_eq!(cache.len(), 1);
/// ```
pub struct SegmentedCache<K, V, S = DefaultHashBuilder> {
    segments: Box<[Segment<K, V>]>,
    /// `32 - log2(segment count)`; segment selection shifts the spread
    /// hash right by this amount.
    segment_shift: u32,
    segment_mask: u32,
    hash_builder: S,
    listener: Option<Arc<dyn EvictionListener<K, V>>>,
    config: CacheConfig,
}

impl<K, V> SegmentedCache<K, V, DefaultHashBuilder>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Creates a cache from a configuration with the default hasher.
    ///
    /// Fails with [`Error::InvalidArgument`](crate::Error) if the
    /// configuration is out of range.
    pub fn init(
        config: CacheConfig,
        listener: Option<Arc<dyn EvictionListener<K, V>>>,
    ) -> Result<Self> {
        Self::init_with_hasher(config, DefaultHashBuilder::default(), listener)
    }
}

impl<K, V, S> SegmentedCache<K, V, S>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: core::hash::BuildHasher,
{
    /// Creates a cache with a caller-provided hash builder (deterministic
    /// or DoS-resistant hashing).
    pub fn init_with_hasher(
        config: CacheConfig,
        hash_builder: S,
        listener: Option<Arc<dyn EvictionListener<K, V>>>,
    ) -> Result<Self> {
        config.validate()?;
        let segment_count = config.segment_count();
        let segment_capacity = config.segment_capacity();
        let segments: Vec<_> = (0..segment_count)
            .map(|_| Segment::new(config.strategy, segment_capacity, config.load_factor))
            .collect();
        Ok(SegmentedCache {
            segments: segments.into_boxed_slice(),
            segment_shift: 32 - segment_count.trailing_zeros(),
            segment_mask: (segment_count - 1) as u32,
            hash_builder,
            listener,
            config,
        })
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of segments (the effective write concurrency).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn hash_of<Q>(&self, key: &Q) -> u32
    where
        Q: ?Sized + core::hash::Hash,
    {
        spread(self.hash_builder.hash_one(key))
    }

    /// Segment selection uses the high bits of the spread hash; bucket
    /// selection inside the segment uses the low bits.
    fn segment_for(&self, hash: u32) -> &Segment<K, V> {
        let index = ((u64::from(hash) >> self.segment_shift) as u32 & self.segment_mask) as usize;
        &self.segments[index]
    }

    /// Delivers eviction notifications after the segment lock is gone.
    fn notify(&self, evicted: Evicted<K, V>) {
        if evicted.is_empty() {
            return;
        }
        let Some(listener) = &self.listener else {
            return;
        };
        for (key, value) in &evicted {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_evict(key, value)));
            if outcome.is_err() {
                log::warn!("eviction listener panicked; notification dropped");
            }
        }
    }

    /// Looks up a key. Lock-free; records the hit for the eviction policy.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + core::hash::Hash + Eq,
        V: Clone,
    {
        let hash = self.hash_of(key);
        let mut evicted = Vec::new();
        let value = self.segment_for(hash).get(hash, key, &mut evicted);
        self.notify(evicted);
        value.map(|v| (*v).clone())
    }

    /// Existence check without recency side effects.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + core::hash::Hash + Eq,
    {
        let hash = self.hash_of(key);
        self.segment_for(hash).contains(hash, key)
    }

    /// Scans for a value. Retries on unstable modification counters, then
    /// locks every segment in index order.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        for _ in 0..RETRIES_BEFORE_LOCK {
            let before: Vec<usize> = self.segments.iter().map(Segment::mod_count).collect();
            if self.scan_for_value(value) {
                return true;
            }
            let stable = self
                .segments
                .iter()
                .zip(&before)
                .all(|(segment, &mods)| segment.mod_count() == mods);
            if stable {
                return false;
            }
        }
        let _guards: Vec<_> = self.segments.iter().map(Segment::lock).collect();
        self.scan_for_value(value)
    }

    fn scan_for_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let guard = epoch::pin();
        for segment in self.segments.iter() {
            let table = segment.table();
            for i in 0..table.len() {
                let mut cur = table.bucket_at(i).load(&guard);
                while let Some(node) = cur {
                    if let Some(held) = node.value(&guard) {
                        if *held == *value {
                            return true;
                        }
                    }
                    cur = node.next.clone();
                }
            }
        }
        false
    }

    /// Inserts or overwrites. Returns the previous value if present.
    pub fn put(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let hash = self.hash_of(&key);
        let mut evicted = Vec::new();
        let old = self.segment_for(hash).put(hash, key, value, false, &mut evicted);
        self.notify(evicted);
        old.map(|v| (*v).clone())
    }

    /// Inserts only if the key is absent. Returns the existing value
    /// otherwise.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let hash = self.hash_of(&key);
        let mut evicted = Vec::new();
        let existing = self.segment_for(hash).put(hash, key, value, true, &mut evicted);
        self.notify(evicted);
        existing.map(|v| (*v).clone())
    }

    /// Replaces the value of an existing key; absent keys are untouched.
    pub fn replace(&self, key: &K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let hash = self.hash_of(key);
        let mut evicted = Vec::new();
        let old = self.segment_for(hash).replace(hash, key, value, &mut evicted);
        self.notify(evicted);
        old.map(|v| (*v).clone())
    }

    /// Replaces the value of `key` only if it currently equals `expected`.
    pub fn replace_if(&self, key: &K, expected: &V, value: V) -> bool
    where
        V: PartialEq,
    {
        let hash = self.hash_of(key);
        let mut evicted = Vec::new();
        let replaced = self
            .segment_for(hash)
            .replace_if(hash, key, expected, value, &mut evicted);
        self.notify(evicted);
        replaced
    }

    /// Removes a key. Returns its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + core::hash::Hash + Eq,
        V: Clone,
    {
        let hash = self.hash_of(key);
        let mut evicted = Vec::new();
        let old = self.segment_for(hash).remove(hash, key, &mut evicted);
        self.notify(evicted);
        old.map(|v| (*v).clone())
    }

    /// Removes a key only if its value equals `expected`.
    pub fn remove_if<Q>(&self, key: &Q, expected: &V) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + core::hash::Hash + Eq,
        V: PartialEq,
    {
        let hash = self.hash_of(key);
        let mut evicted = Vec::new();
        let removed = self
            .segment_for(hash)
            .remove_if(hash, key, expected, &mut evicted);
        self.notify(evicted);
        removed
    }

    /// Drops every entry. No listener callbacks fire.
    pub fn clear(&self) {
        for segment in self.segments.iter() {
            segment.clear();
        }
    }

    /// Number of entries. Tries modification-counter snapshots before
    /// locking every segment in index order.
    pub fn len(&self) -> usize {
        for _ in 0..RETRIES_BEFORE_LOCK {
            let before: Vec<usize> = self.segments.iter().map(Segment::mod_count).collect();
            let sum: usize = self.segments.iter().map(Segment::count).sum();
            let stable = self
                .segments
                .iter()
                .zip(&before)
                .all(|(segment, &mods)| segment.mod_count() == mods);
            if stable {
                return sum;
            }
        }
        let _guards: Vec<_> = self.segments.iter().map(Segment::lock).collect();
        self.segments.iter().map(Segment::count).sum()
    }

    /// `true` if no segment holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weakly consistent iterator over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter(RawIter::new(&self.segments))
    }

    /// Weakly consistent iterator over keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(RawIter::new(&self.segments))
    }

    /// Weakly consistent iterator over values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values(RawIter::new(&self.segments))
    }

    #[cfg(feature = "serde")]
    pub(crate) fn segments(&self) -> &[Segment<K, V>] {
        &self.segments
    }
}

impl<K, V, S> MetricsSource for SegmentedCache<K, V, S>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: core::hash::BuildHasher,
{
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut total = BTreeMap::new();
        for segment in self.segments.iter() {
            segment.metrics().accumulate(&mut total);
        }
        total
    }

    fn source_name(&self) -> &'static str {
        match self.config.strategy {
            EvictionStrategy::None => "segmented",
            EvictionStrategy::Lru => "segmented-lru",
            EvictionStrategy::Lirs => "segmented-lirs",
        }
    }
}

impl<K, V, S> core::fmt::Debug for SegmentedCache<K, V, S>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    S: core::hash::BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentedCache")
            .field("segments", &self.segments.len())
            .field("strategy", &self.config.strategy)
            .field("len", &self.len())
            .finish()
    }
}
