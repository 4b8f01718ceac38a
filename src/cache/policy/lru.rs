//! LRU eviction: a recency list with batched hit processing.
//!
//! Misses (insertions) enter the list at the front immediately. Hits are
//! *not* applied here one by one: readers record them in the segment's
//! access buffer and the whole batch is replayed on the next drain, so the
//! relative recency after a drain reflects the buffered access order. The
//! list may temporarily exceed its trim-down target between drains; the
//! trim pass then pops tail entries and hands them to the segment for
//! removal.

use std::sync::Arc;

use hashbrown::HashMap;

use super::list::{EntryHandle, RecencyList};
use crate::cache::node::{ident, Node};

pub(crate) struct LruPolicy<K, V> {
    /// Front = most recently used.
    list: RecencyList<Arc<Node<K, V>>>,
    /// Node identity -> list handle.
    index: HashMap<usize, EntryHandle<Arc<Node<K, V>>>>,
    /// Entries kept after a trim pass: capacity x load factor, at least 1.
    trim_target: usize,
}

impl<K, V> LruPolicy<K, V> {
    pub(crate) fn new(capacity: usize, load_factor: f32) -> Self {
        let trim_target = ((capacity as f64 * f64::from(load_factor)) as usize).max(1);
        LruPolicy {
            list: RecencyList::new(),
            index: HashMap::new(),
            trim_target,
        }
    }

    #[allow(dead_code)] // Used by the unit tests.
    pub(crate) fn trim_target(&self) -> usize {
        self.trim_target
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    /// A new entry entered the segment: most recent by definition.
    pub(crate) fn on_miss(&mut self, node: &Arc<Node<K, V>>) {
        let handle = self.list.push_front(Arc::clone(node));
        self.index.insert(ident(node), handle);
    }

    /// A buffered hit is replayed during a drain.
    pub(crate) fn on_hit_drained(&mut self, node: &Arc<Node<K, V>>) {
        if let Some(&handle) = self.index.get(&ident(node)) {
            // SAFETY: the handle was produced by `list` and is removed from
            // the index whenever the element is unlinked.
            unsafe { self.list.move_to_front(handle) };
        }
    }

    /// The segment removed an entry (explicitly or as an eviction victim).
    pub(crate) fn on_remove(&mut self, node: &Arc<Node<K, V>>) {
        if let Some(handle) = self.index.remove(&ident(node)) {
            // SAFETY: handle is live, it was still present in the index.
            unsafe {
                self.list.unlink(handle);
            }
        }
    }

    /// Pops tail entries until the list is back at the trim-down target.
    ///
    /// The returned nodes are eviction requests; the caller removes them
    /// from the segment (which reports them back through `on_remove`, by
    /// then a no-op since the index entry is already gone).
    pub(crate) fn trim(&mut self) -> Vec<Arc<Node<K, V>>> {
        let mut victims = Vec::new();
        while self.list.len() > self.trim_target {
            match self.list.pop_back() {
                Some(node) => {
                    self.index.remove(&ident(&node));
                    victims.push(node);
                }
                None => break,
            }
        }
        victims
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.list.clear();
    }

    #[cfg(test)]
    pub(crate) fn keys_in_recency_order(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.list.for_each(|node| out.push(ident(node)));
        out
    }
}

// SAFETY: the raw handles in `index` point into `list`, which the policy
// owns; the policy itself is only used behind the segment lock.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for LruPolicy<K, V> {}

impl<K, V> core::fmt::Debug for LruPolicy<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LruPolicy")
            .field("len", &self.list.len())
            .field("trim_target", &self.trim_target)
            .finish()
    }
}
