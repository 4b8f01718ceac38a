//! One independently locked partition of the cache.
//!
//! A segment owns a bucket table of immutable-`next` chains, the counters
//! that publish its state to lock-free readers, an access buffer of
//! recently hit entries, and its eviction policy. Writers serialize on the
//! segment mutex; readers never take it.
//!
//! # Publication protocol
//!
//! Every structural write ends with a release store to `count`, and every
//! read begins with an acquire load of `count`; together with the
//! release-published bucket heads this gives readers a consistent snapshot
//! up to the last completed write. Removal never splices chains in place:
//! the suffix after the removed node is kept and every node before it is
//! cloned, so a reader that entered the old chain still walks a terminated,
//! consistent chain.
//!
//! # Eviction
//!
//! The policy hands back eviction requests while the lock is held; the
//! segment applies them through a worklist (a removal can clone prefix
//! nodes, and registering a clone with the policy can name further
//! victims). Evicted `(key, value)` pairs are collected inside the critical
//! section and handed to the caller, which notifies the listener after the
//! lock is released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::epoch::{self, Guard};
use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, MutexGuard};

use super::atomic::AtomicArc;
use super::node::Node;
use super::policy::{self, EvictionStrategy, Policy, MAX_BATCH_SIZE};
use crate::metrics::CoreCacheMetrics;

/// Largest bucket table a segment will grow to.
const MAX_TABLE_CAPACITY: usize = 1 << 30;

/// Evicted pairs collected under the lock, delivered after unlock.
pub(crate) type Evicted<K, V> = Vec<(K, Arc<V>)>;

/// Bucket array; replaced wholesale on rehash.
pub(crate) struct Table<K, V> {
    buckets: Box<[AtomicArc<Node<K, V>>]>,
}

impl<K: Send + Sync, V: Send + Sync> Table<K, V> {
    fn new(capacity: usize) -> Self {
        let size = capacity.max(1).next_power_of_two();
        let buckets = (0..size).map(|_| AtomicArc::empty()).collect();
        Table { buckets }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket for a spread hash (low bits).
    pub(crate) fn bucket(&self, hash: u32) -> &AtomicArc<Node<K, V>> {
        &self.buckets[hash as usize & (self.buckets.len() - 1)]
    }

    pub(crate) fn bucket_at(&self, index: usize) -> &AtomicArc<Node<K, V>> {
        &self.buckets[index]
    }
}

/// State that only changes under the segment lock.
pub(crate) struct SegmentCore<K, V> {
    policy: Policy<K, V>,
    /// Resize trigger for the `None` policy: table length x load factor.
    threshold: usize,
}

pub(crate) struct Segment<K, V> {
    core: Mutex<SegmentCore<K, V>>,
    table: AtomicArc<Table<K, V>>,
    /// Entry count; the release/acquire fence of the read path.
    count: AtomicUsize,
    /// Structural modification counter for weak aggregate snapshots.
    mod_count: AtomicUsize,
    /// Lock-free multi-producer hint buffer of recent hits.
    buffer: ArrayQueue<Arc<Node<K, V>>>,
    strategy: EvictionStrategy,
    load_factor: f32,
    metrics: CoreCacheMetrics,
}

impl<K, V> Segment<K, V>
where
    K: core::hash::Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    pub(crate) fn new(strategy: EvictionStrategy, capacity: usize, load_factor: f32) -> Self {
        let table = Table::new(capacity);
        let threshold = (table.len() as f64 * f64::from(load_factor)) as usize;
        let policy = Policy::new(strategy, capacity, load_factor);
        let strategy = policy.strategy();
        Segment {
            core: Mutex::new(SegmentCore { policy, threshold }),
            table: AtomicArc::new(Arc::new(table)),
            count: AtomicUsize::new(0),
            mod_count: AtomicUsize::new(0),
            buffer: ArrayQueue::new(MAX_BATCH_SIZE),
            strategy,
            load_factor,
            metrics: CoreCacheMetrics::new(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn mod_count(&self) -> usize {
        self.mod_count.load(Ordering::Acquire)
    }

    pub(crate) fn metrics(&self) -> &CoreCacheMetrics {
        &self.metrics
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SegmentCore<K, V>> {
        self.core.lock()
    }

    /// Current table for iteration; the returned `Arc` stays valid across a
    /// concurrent rehash.
    pub(crate) fn table(&self) -> Arc<Table<K, V>> {
        let guard = epoch::pin();
        self.table_ref(&guard)
    }

    fn table_ref(&self, guard: &Guard) -> Arc<Table<K, V>> {
        match self.table.load(guard) {
            Some(table) => table,
            None => unreachable!("segment table is installed at construction"),
        }
    }

    fn find<Q>(&self, table: &Table<K, V>, hash: u32, key: &Q, guard: &Guard) -> Option<Arc<Node<K, V>>>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut cur = table.bucket(hash).load(guard);
        while let Some(node) = cur {
            if node.hash == hash && node.key.borrow() == key {
                return Some(node);
            }
            cur = node.next.clone();
        }
        None
    }

    /// Lock-free lookup. A hit is recorded in the access buffer; when the
    /// batching threshold is reached the reader opportunistically drains
    /// (blocking on the lock only once the strict threshold has expired).
    pub(crate) fn get<Q>(&self, hash: u32, key: &Q, evicted: &mut Evicted<K, V>) -> Option<Arc<V>>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        if self.count.load(Ordering::Acquire) == 0 {
            self.metrics.record_miss();
            return None;
        }
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        match self.find(&table, hash, key, &guard) {
            Some(node) => {
                let value = match node.value(&guard) {
                    Some(value) => value,
                    // Superseded chain or publication race: resolve against
                    // the current table under the lock.
                    None => return self.read_under_lock(hash, key, &guard),
                };
                self.metrics.record_hit();
                if self.strategy != EvictionStrategy::None {
                    self.record_access(&node, evicted, &guard);
                }
                Some(value)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Pure existence check; does not touch recency state.
    pub(crate) fn contains<Q>(&self, hash: u32, key: &Q) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        if self.count.load(Ordering::Acquire) == 0 {
            return false;
        }
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        self.find(&table, hash, key, &guard).is_some()
    }

    fn read_under_lock<Q>(&self, hash: u32, key: &Q, guard: &Guard) -> Option<Arc<V>>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let _core = self.core.lock();
        let table = self.table_ref(guard);
        let result = self
            .find(&table, hash, key, guard)
            .and_then(|node| node.value(guard));
        if result.is_some() {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
        result
    }

    fn record_access(&self, node: &Arc<Node<K, V>>, evicted: &mut Evicted<K, V>, guard: &Guard) {
        // The buffer is a hint; displacing the oldest entry on overflow is
        // acceptable and keeps producers wait-free.
        let _ = self.buffer.force_push(Arc::clone(node));
        let buffered = self.buffer.len();
        if policy::threshold_reached(buffered) {
            if let Some(mut core) = self.core.try_lock() {
                self.drain(&mut core, evicted, guard);
            } else if policy::threshold_expired(buffered) {
                let mut core = self.core.lock();
                self.drain(&mut core, evicted, guard);
            }
        }
    }

    /// Replays the buffered hits into the policy and applies any evictions
    /// it requests. Caller holds the lock.
    fn drain(&self, core: &mut SegmentCore<K, V>, evicted: &mut Evicted<K, V>, guard: &Guard) {
        let drained = self.drain_buffer();
        let victims = core.policy.execute(&drained);
        self.settle(core, victims.into(), evicted, guard);
    }

    fn drain_buffer(&self) -> Vec<Arc<Node<K, V>>> {
        let mut drained = Vec::new();
        // Bounded: producers may keep appending while we pop.
        while drained.len() < MAX_BATCH_SIZE {
            match self.buffer.pop() {
                Some(node) => drained.push(node),
                None => break,
            }
        }
        drained
    }

    /// Inserts or updates. Returns the previous value if the key existed.
    pub(crate) fn put(
        &self,
        hash: u32,
        key: K,
        value: V,
        only_if_absent: bool,
        evicted: &mut Evicted<K, V>,
    ) -> Option<Arc<V>> {
        let mut core = self.core.lock();
        let guard = epoch::pin();

        if core.policy.resizes() && self.count.load(Ordering::Relaxed) + 1 > core.threshold {
            self.rehash(&mut core, &guard);
        }

        let table = self.table_ref(&guard);
        if let Some(node) = self.find(&table, hash, &key, &guard) {
            let old = if only_if_absent {
                node.value(&guard)
            } else {
                node.set_value(Arc::new(value), &guard)
            };
            // An overwrite counts as an access for recency purposes.
            let mut drained = self.drain_buffer();
            drained.push(node);
            let victims = core.policy.execute(&drained);
            self.settle(&mut core, victims.into(), evicted, &guard);
            return old;
        }

        let bucket = table.bucket(hash);
        let node = Node::new(hash, key, Arc::new(value), bucket.load(&guard));
        bucket.store(Some(Arc::clone(&node)), &guard);
        self.mod_count.fetch_add(1, Ordering::AcqRel);
        self.count.fetch_add(1, Ordering::Release);
        self.metrics.record_insertion();

        let mut work: VecDeque<_> = core.policy.on_miss(&node).into();
        let drained = self.drain_buffer();
        work.extend(core.policy.execute(&drained));
        self.settle(&mut core, work, evicted, &guard);
        None
    }

    /// Replaces the value of an existing key.
    pub(crate) fn replace(
        &self,
        hash: u32,
        key: &K,
        value: V,
        evicted: &mut Evicted<K, V>,
    ) -> Option<Arc<V>> {
        let mut core = self.core.lock();
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let node = self.find(&table, hash, key, &guard)?;
        let old = node.set_value(Arc::new(value), &guard);
        let mut drained = self.drain_buffer();
        drained.push(node);
        let victims = core.policy.execute(&drained);
        self.settle(&mut core, victims.into(), evicted, &guard);
        old
    }

    /// Replaces the value of an existing key only if it currently equals
    /// `expected`.
    pub(crate) fn replace_if(
        &self,
        hash: u32,
        key: &K,
        expected: &V,
        value: V,
        evicted: &mut Evicted<K, V>,
    ) -> bool
    where
        V: PartialEq,
    {
        let mut core = self.core.lock();
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let Some(node) = self.find(&table, hash, key, &guard) else {
            return false;
        };
        if *node.value_locked(&guard) != *expected {
            return false;
        }
        node.set_value(Arc::new(value), &guard);
        let mut drained = self.drain_buffer();
        drained.push(node);
        let victims = core.policy.execute(&drained);
        self.settle(&mut core, victims.into(), evicted, &guard);
        true
    }

    /// Removes a key. Returns its value if it was present.
    pub(crate) fn remove<Q>(&self, hash: u32, key: &Q, evicted: &mut Evicted<K, V>) -> Option<Arc<V>>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut core = self.core.lock();
        let guard = epoch::pin();
        let mut work = VecDeque::new();
        let removed = self.remove_entry(&mut core, hash, key, &guard, &mut work);
        if removed.is_some() {
            self.metrics.record_removal();
        }
        self.settle(&mut core, work, evicted, &guard);
        removed
    }

    /// Removes a key only if its value equals `expected`.
    pub(crate) fn remove_if<Q>(
        &self,
        hash: u32,
        key: &Q,
        expected: &V,
        evicted: &mut Evicted<K, V>,
    ) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
        V: PartialEq,
    {
        let mut core = self.core.lock();
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let matches = match self.find(&table, hash, key, &guard) {
            Some(node) => *node.value_locked(&guard) == *expected,
            None => false,
        };
        if !matches {
            return false;
        }
        let mut work = VecDeque::new();
        let removed = self.remove_entry(&mut core, hash, key, &guard, &mut work);
        if removed.is_some() {
            self.metrics.record_removal();
        }
        self.settle(&mut core, work, evicted, &guard);
        removed.is_some()
    }

    /// Unconditional removal under the lock.
    ///
    /// Keeps the chain suffix after the removed node and clones every node
    /// before it. Originals are reported to the policy as removals, clones
    /// as misses; victims named by those callbacks land on `work`.
    fn remove_entry<Q>(
        &self,
        core: &mut SegmentCore<K, V>,
        hash: u32,
        key: &Q,
        guard: &Guard,
        work: &mut VecDeque<Arc<Node<K, V>>>,
    ) -> Option<Arc<V>>
    where
        K: core::borrow::Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let table = self.table_ref(guard);
        let bucket = table.bucket(hash);

        let mut prefix = Vec::new();
        let mut cur = bucket.load(guard);
        let node = loop {
            let candidate = cur?;
            if candidate.hash == hash && candidate.key.borrow() == key {
                break candidate;
            }
            cur = candidate.next.clone();
            prefix.push(candidate);
        };

        let value = node.value_locked(guard);

        // Rebuild the chain: suffix shared, prefix cloned (in reverse
        // publication order, which is irrelevant to lookups).
        let mut new_head = node.next.clone();
        let mut clones = Vec::with_capacity(prefix.len());
        for original in &prefix {
            let clone = Node::new(
                original.hash,
                original.key.clone(),
                original.value_locked(guard),
                new_head.take(),
            );
            new_head = Some(Arc::clone(&clone));
            clones.push(clone);
        }
        bucket.store(new_head, guard);
        self.mod_count.fetch_add(1, Ordering::AcqRel);
        self.count.fetch_sub(1, Ordering::Release);

        node.clear_value(guard);
        core.policy.on_remove(&node);
        for (original, clone) in prefix.iter().zip(&clones) {
            core.policy.on_remove(original);
            work.extend(core.policy.on_miss(clone));
        }

        Some(value)
    }

    /// Applies queued eviction requests until the worklist is empty.
    fn settle(
        &self,
        core: &mut SegmentCore<K, V>,
        mut work: VecDeque<Arc<Node<K, V>>>,
        evicted: &mut Evicted<K, V>,
        guard: &Guard,
    ) {
        while let Some(victim) = work.pop_front() {
            // Removal is by key: the victim may have been superseded by a
            // prefix clone carrying the same key.
            if let Some(value) = self.remove_entry(core, victim.hash, &victim.key, guard, &mut work)
            {
                self.metrics.record_eviction();
                log::debug!("evicted entry (hash {:#010x})", victim.hash);
                evicted.push((victim.key.clone(), value));
            }
        }
    }

    /// Doubles the bucket table. Only the `None` policy resizes; the
    /// eviction policies bound the segment's population instead.
    fn rehash(&self, core: &mut SegmentCore<K, V>, guard: &Guard) {
        let old = self.table_ref(guard);
        let old_len = old.len();
        if old_len >= MAX_TABLE_CAPACITY {
            return;
        }
        let new = Table::new(old_len << 1);
        let mask = new.len() - 1;
        let index_of = |hash: u32| hash as usize & mask;

        for i in 0..old_len {
            let Some(head) = old.bucket_at(i).load(guard) else {
                continue;
            };
            if head.next.is_none() {
                new.bucket_at(index_of(head.hash)).store(Some(head), guard);
                continue;
            }
            // Reuse the trailing run of nodes that all map to one new
            // bucket; nodes before it are re-created because their `next`
            // links are immutable.
            let mut last_run = Arc::clone(&head);
            let mut last_idx = index_of(head.hash);
            let mut cur = head.next.clone();
            while let Some(node) = cur {
                let idx = index_of(node.hash);
                if idx != last_idx {
                    last_idx = idx;
                    last_run = Arc::clone(&node);
                }
                cur = node.next.clone();
            }
            new.bucket_at(last_idx).store(Some(Arc::clone(&last_run)), guard);

            let mut cur = Some(head);
            while let Some(node) = cur {
                if Arc::ptr_eq(&node, &last_run) {
                    break;
                }
                let slot = new.bucket_at(index_of(node.hash));
                let clone = Node::new(
                    node.hash,
                    node.key.clone(),
                    node.value_locked(guard),
                    slot.load(guard),
                );
                slot.store(Some(clone), guard);
                cur = node.next.clone();
            }
        }

        core.threshold = (new.len() as f64 * f64::from(self.load_factor)) as usize;
        log::debug!("rehashed segment table {} -> {}", old_len, new.len());
        self.table.store(Some(Arc::new(new)), guard);
    }

    /// Drops every entry. Listener callbacks are not fired: clearing is not
    /// an eviction.
    pub(crate) fn clear(&self) {
        let mut core = self.core.lock();
        if self.count.load(Ordering::Relaxed) == 0 {
            return;
        }
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        for i in 0..table.len() {
            table.bucket_at(i).store(None, &guard);
        }
        core.policy.clear();
        while self.buffer.pop().is_some() {}
        self.mod_count.fetch_add(1, Ordering::AcqRel);
        self.count.store(0, Ordering::Release);
    }
}

impl<K, V> core::fmt::Debug for Segment<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Segment")
            .field("count", &self.count.load(Ordering::Relaxed))
            .field("strategy", &self.strategy)
            .finish()
    }
}
