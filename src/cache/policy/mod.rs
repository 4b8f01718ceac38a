//! Eviction policies and their dispatch.
//!
//! The segment talks to its policy through a small operation set: misses,
//! batched hit replays, removals, a drain step and the batching thresholds.
//! The policy is a tagged variant rather than a trait object; the set is
//! closed, and the segment's hot paths dispatch on the tag without a
//! vtable.

mod lirs;
mod list;
mod lru;

pub(crate) use lirs::LirsPolicy;
pub(crate) use lru::LruPolicy;

use std::sync::Arc;

use super::node::Node;

/// Which eviction policy a cache runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvictionStrategy {
    /// Never evict; the table resizes instead.
    None,
    /// Least recently used, with batched hit processing.
    Lru,
    /// Low inter-reference recency set (LIRS).
    Lirs,
}

/// Capacity of the per-segment access buffer.
pub(crate) const MAX_BATCH_SIZE: usize = 64;

/// Buffered hits at which a reader attempts an opportunistic drain.
pub(crate) const BATCH_THRESHOLD: usize = MAX_BATCH_SIZE * 3 / 4;

/// `true` once the buffer is worth draining if the lock is free.
pub(crate) fn threshold_reached(buffered: usize) -> bool {
    buffered >= BATCH_THRESHOLD
}

/// `true` once the buffer is full and the drain must not be skipped.
pub(crate) fn threshold_expired(buffered: usize) -> bool {
    buffered >= MAX_BATCH_SIZE
}

/// Per-segment eviction policy instance.
pub(crate) enum Policy<K, V> {
    None,
    Lru(LruPolicy<K, V>),
    Lirs(LirsPolicy<K, V>),
}

impl<K, V> Policy<K, V>
where
    K: core::hash::Hash + Eq + Clone,
    V: Send + Sync,
{
    pub(crate) fn new(strategy: EvictionStrategy, capacity: usize, load_factor: f32) -> Self {
        match strategy {
            EvictionStrategy::None => Policy::None,
            EvictionStrategy::Lru => Policy::Lru(LruPolicy::new(capacity, load_factor)),
            EvictionStrategy::Lirs => Policy::Lirs(LirsPolicy::new(capacity)),
        }
    }

    pub(crate) fn strategy(&self) -> EvictionStrategy {
        match self {
            Policy::None => EvictionStrategy::None,
            Policy::Lru(_) => EvictionStrategy::Lru,
            Policy::Lirs(_) => EvictionStrategy::Lirs,
        }
    }

    /// Whether readers should record hits in the access buffer.
    pub(crate) fn buffers_hits(&self) -> bool {
        !matches!(self, Policy::None)
    }

    /// Whether the segment grows its table instead of evicting.
    pub(crate) fn resizes(&self) -> bool {
        matches!(self, Policy::None)
    }

    /// A new entry entered the segment. Returns eviction requests.
    pub(crate) fn on_miss(&mut self, node: &Arc<Node<K, V>>) -> Vec<Arc<Node<K, V>>> {
        match self {
            Policy::None => Vec::new(),
            Policy::Lru(lru) => {
                lru.on_miss(node);
                Vec::new()
            }
            Policy::Lirs(lirs) => lirs.on_miss(node),
        }
    }

    /// The segment removed an entry.
    pub(crate) fn on_remove(&mut self, node: &Arc<Node<K, V>>) {
        match self {
            Policy::None => {}
            Policy::Lru(lru) => lru.on_remove(node),
            Policy::Lirs(lirs) => lirs.on_remove(node),
        }
    }

    /// Replays a drained batch of buffered hits and performs any pending
    /// trimming. Returns eviction requests.
    pub(crate) fn execute(&mut self, drained: &[Arc<Node<K, V>>]) -> Vec<Arc<Node<K, V>>> {
        match self {
            Policy::None => Vec::new(),
            Policy::Lru(lru) => {
                for node in drained {
                    lru.on_hit_drained(node);
                }
                lru.trim()
            }
            Policy::Lirs(lirs) => {
                for node in drained {
                    lirs.on_hit_drained(node);
                }
                Vec::new()
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Policy::None => {}
            Policy::Lru(lru) => lru.clear(),
            Policy::Lirs(lirs) => lirs.clear(),
        }
    }
}

impl<K, V> core::fmt::Debug for Policy<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Policy::None => f.write_str("Policy::None"),
            Policy::Lru(lru) => lru.fmt(f),
            Policy::Lirs(lirs) => lirs.fmt(f),
        }
    }
}
