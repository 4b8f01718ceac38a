//! Weakly consistent iteration.
//!
//! Iterators walk the segments in index order, holding an `Arc` to each
//! segment's table while traversing it. They never fail under concurrent
//! mutation: entries inserted or removed during iteration may or may not be
//! observed, but an entry that is present for the whole iteration is
//! returned exactly once (chains are reached through exactly one bucket of
//! one table snapshot). Entries whose value slot has been cleared by a
//! concurrent removal are skipped.

use std::sync::Arc;

use crossbeam::epoch;

use super::node::Node;
use super::segment::{Segment, Table};

pub(crate) struct RawIter<'a, K, V> {
    segments: &'a [Segment<K, V>],
    segment_idx: usize,
    table: Option<Arc<Table<K, V>>>,
    bucket_idx: usize,
    current: Option<Arc<Node<K, V>>>,
}

impl<'a, K, V> RawIter<'a, K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    pub(crate) fn new(segments: &'a [Segment<K, V>]) -> Self {
        RawIter {
            segments,
            segment_idx: 0,
            table: None,
            bucket_idx: 0,
            current: None,
        }
    }

    /// Next live entry as `(key, value)` clones of the `Arc`-held parts.
    fn next_entry(&mut self) -> Option<(K, Arc<V>)> {
        let guard = epoch::pin();
        loop {
            if let Some(node) = self.current.take() {
                self.current = node.next.clone();
                if let Some(value) = node.value(&guard) {
                    return Some((node.key.clone(), value));
                }
                // Cleared slot: the entry was removed after we entered the
                // chain. Skip it.
                continue;
            }
            if let Some(table) = &self.table {
                if self.bucket_idx < table.len() {
                    self.current = table.bucket_at(self.bucket_idx).load(&guard);
                    self.bucket_idx += 1;
                    continue;
                }
                self.table = None;
            }
            if self.segment_idx >= self.segments.len() {
                return None;
            }
            self.table = Some(self.segments[self.segment_idx].table());
            self.segment_idx += 1;
            self.bucket_idx = 0;
        }
    }
}

/// Weakly consistent iterator over `(key, value)` pairs.
///
/// Returned by [`SegmentedCache::iter`](super::SegmentedCache::iter).
pub struct Iter<'a, K, V>(pub(crate) RawIter<'a, K, V>);

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        self.0.next_entry().map(|(k, v)| (k, (*v).clone()))
    }
}

/// Weakly consistent iterator over keys.
///
/// Returned by [`SegmentedCache::keys`](super::SegmentedCache::keys).
pub struct Keys<'a, K, V>(pub(crate) RawIter<'a, K, V>);

impl<K, V> Iterator for Keys<'_, K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        self.0.next_entry().map(|(k, _)| k)
    }
}

/// Weakly consistent iterator over values.
///
/// Returned by [`SegmentedCache::values`](super::SegmentedCache::values).
pub struct Values<'a, K, V>(pub(crate) RawIter<'a, K, V>);

impl<K, V> Iterator for Values<'_, K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        self.0.next_entry().map(|(_, v)| (*v).clone())
    }
}

impl<K, V> core::fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Iter")
    }
}

impl<K, V> core::fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Keys")
    }
}

impl<K, V> core::fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Values")
    }
}
