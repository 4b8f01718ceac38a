//! LIRS eviction: low inter-reference recency entries stay resident.
//!
//! State per segment:
//!
//! - the *stack* S, an insertion/access ordered list of entries (hot LIR
//!   entries, resident HIR entries that have been re-referenced, and
//!   non-resident HIR stubs that record the history of recently evicted
//!   keys), indexed by the raw key so a re-inserted key finds its stub;
//! - the *queue* Q of resident HIR entries in access order, indexed by node
//!   identity; its head is always the next eviction candidate.
//!
//! The LIR budget is 90% of the segment capacity; the HIR budget is the
//! remainder but never less than two. The bottom of S is kept LIR by
//! pruning: whenever entries move, non-LIR entries at the bottom are
//! dropped until a LIR entry surfaces, which keeps the demotion target
//! (the bottommost LIR entry) at the stack bottom.
//!
//! Hits arrive here in drain batches recorded by lock-free readers, never
//! directly from the read path.

use std::sync::Arc;

use hashbrown::HashMap;

use super::list::{EntryHandle, RecencyList};
use crate::cache::node::{ident, Node, RecencyState};

/// Fraction of the capacity reserved for the LIR set.
const LIR_FRACTION: f64 = 0.9;

/// Minimum resident HIR budget.
const MIN_HIR_BUDGET: usize = 2;

pub(crate) struct LirsPolicy<K, V> {
    /// The stack S; front = top = most recently referenced.
    stack: RecencyList<Arc<Node<K, V>>>,
    /// Raw key -> stack handle of the latest entry for that key.
    stack_index: HashMap<K, EntryHandle<Arc<Node<K, V>>>>,
    /// The queue Q of resident HIR entries; front = head = eviction candidate.
    queue: RecencyList<Arc<Node<K, V>>>,
    /// Node identity -> queue handle.
    queue_index: HashMap<usize, EntryHandle<Arc<Node<K, V>>>>,
    lir_count: usize,
    lir_budget: usize,
    hir_budget: usize,
}

impl<K, V> LirsPolicy<K, V>
where
    K: core::hash::Hash + Eq + Clone,
    V: Send + Sync,
{
    pub(crate) fn new(capacity: usize) -> Self {
        let lir_budget = ((capacity as f64 * LIR_FRACTION) as usize).max(1);
        let hir_budget = capacity.saturating_sub(lir_budget).max(MIN_HIR_BUDGET);
        LirsPolicy {
            stack: RecencyList::new(),
            stack_index: HashMap::new(),
            queue: RecencyList::new(),
            queue_index: HashMap::new(),
            lir_count: 0,
            lir_budget,
            hir_budget,
        }
    }

    #[allow(dead_code)] // Used by the unit tests.
    pub(crate) fn lir_budget(&self) -> usize {
        self.lir_budget
    }

    #[allow(dead_code)] // Used by the unit tests.
    pub(crate) fn hir_budget(&self) -> usize {
        self.hir_budget
    }

    #[allow(dead_code)] // Used by the unit tests.
    pub(crate) fn lir_count(&self) -> usize {
        self.lir_count
    }

    /// A new entry entered the segment.
    ///
    /// Returns the entries the segment must evict to make room; each has
    /// already been transitioned to `HirNonresident` and its stack stub (if
    /// any) retained as re-reference history.
    pub(crate) fn on_miss(&mut self, node: &Arc<Node<K, V>>) -> Vec<Arc<Node<K, V>>> {
        let mut victims = Vec::new();

        // Cold start: fill the LIR set before anything becomes HIR.
        if self.lir_count < self.lir_budget {
            node.transition(RecencyState::HirResident, RecencyState::LirResident);
            self.lir_count += 1;
            self.stack_push_top(node);
            return victims;
        }

        // Room in the resident HIR set: queue without touching the stack.
        if self.queue.len() < self.hir_budget {
            self.queue_push_tail(node);
            return victims;
        }

        // Resident HIR set is full: the queue head is the coldest entry.
        if let Some(head) = self.queue_pop_head() {
            head.transition(RecencyState::HirResident, RecencyState::HirNonresident);
            victims.push(head);
        }

        // A non-resident stub for this key means the key was evicted
        // recently: its inter-reference recency is low, so it re-enters hot.
        let reentering = match self.stack_index.get(&node.key) {
            // SAFETY: index handles always point at live stack elements.
            Some(&handle) => unsafe {
                self.stack.get(handle).state() == RecencyState::HirNonresident
            },
            None => false,
        };

        self.stack_push_top(node);
        if reentering {
            node.transition(RecencyState::HirResident, RecencyState::LirResident);
            self.lir_count += 1;
            self.rebalance_lir();
        } else {
            self.queue_push_tail(node);
        }

        debug_assert!(self.lir_count <= self.lir_budget);
        victims
    }

    /// A buffered hit is replayed during a drain.
    ///
    /// Hits never evict: promotions demote the bottommost LIR entry into the
    /// queue instead of dropping anything resident.
    pub(crate) fn on_hit_drained(&mut self, node: &Arc<Node<K, V>>) {
        match node.state() {
            RecencyState::LirResident => {
                if let Some(handle) = self.stack_handle_of(node) {
                    // SAFETY: handle verified live just above.
                    unsafe { self.stack.move_to_front(handle) };
                    self.prune_stack();
                }
            }
            RecencyState::HirResident => {
                // The queue entry is taken out before the stack membership
                // check; a node absent from the stack is put back at the
                // tail below, which makes the whole operation a reposition.
                let was_queued = self.queue_remove(node);
                match self.stack_handle_of(node) {
                    Some(handle) => {
                        // SAFETY: handle verified live just above.
                        unsafe { self.stack.move_to_front(handle) };
                        node.transition(RecencyState::HirResident, RecencyState::LirResident);
                        self.lir_count += 1;
                        self.rebalance_lir();
                    }
                    None if was_queued => {
                        self.stack_push_top(node);
                        self.queue_push_tail(node);
                    }
                    // Neither queued nor stacked: the segment dropped the
                    // entry between buffering and drain.
                    None => {}
                }
            }
            // Evicted between buffering and drain.
            RecencyState::HirNonresident => {}
        }
        debug_assert!(self.lir_count <= self.lir_budget);
    }

    /// The segment removed an entry.
    ///
    /// Entries the policy itself evicted arrive as `HirNonresident` and keep
    /// their stack stub; explicitly removed entries are stripped from both
    /// structures.
    pub(crate) fn on_remove(&mut self, node: &Arc<Node<K, V>>) {
        let state = node.state();
        if state == RecencyState::HirNonresident {
            return;
        }
        if let Some(handle) = self.stack_handle_of(node) {
            // SAFETY: handle verified live just above.
            unsafe {
                self.stack.unlink(handle);
            }
            self.stack_index.remove(&node.key);
            if state == RecencyState::LirResident {
                self.lir_count -= 1;
                self.prune_stack();
            }
        }
        self.queue_remove(node);
    }

    pub(crate) fn clear(&mut self) {
        self.stack.clear();
        self.stack_index.clear();
        self.queue.clear();
        self.queue_index.clear();
        self.lir_count = 0;
    }

    /// Demotes bottom LIR entries into the queue while over budget.
    fn rebalance_lir(&mut self) {
        while self.lir_count > self.lir_budget {
            let node = match self.stack.pop_back() {
                Some(node) => node,
                None => break,
            };
            self.stack_index.remove(&node.key);
            assert_eq!(
                node.state(),
                RecencyState::LirResident,
                "stack bottom must be LIR before demotion"
            );
            node.transition(RecencyState::LirResident, RecencyState::HirResident);
            self.lir_count -= 1;
            self.queue_push_tail(&node);
            self.prune_stack();
        }
    }

    /// Drops non-LIR entries from the stack bottom until a LIR entry
    /// surfaces. Resident HIR entries stay in the queue; non-resident stubs
    /// are forgotten entirely.
    fn prune_stack(&mut self) {
        while let Some(back) = self.stack.peek_back() {
            if back.state() == RecencyState::LirResident {
                break;
            }
            let node = self.stack.pop_back().expect("peeked element exists");
            self.stack_index.remove(&node.key);
        }
    }

    /// Stack handle of this exact node, if the stack holds it (and not just
    /// an older entry for the same key).
    fn stack_handle_of(&self, node: &Arc<Node<K, V>>) -> Option<EntryHandle<Arc<Node<K, V>>>> {
        let &handle = self.stack_index.get(&node.key)?;
        // SAFETY: index handles always point at live stack elements.
        let held = unsafe { self.stack.get(handle) };
        (ident(held) == ident(node)).then_some(handle)
    }

    /// Puts `node` at the top of the stack, replacing any existing element
    /// for the same key in place.
    fn stack_push_top(&mut self, node: &Arc<Node<K, V>>) {
        match self.stack_index.get(&node.key) {
            Some(&handle) => {
                // SAFETY: index handles always point at live stack elements.
                unsafe {
                    let _old = self.stack.replace(handle, Arc::clone(node));
                    self.stack.move_to_front(handle);
                }
            }
            None => {
                let handle = self.stack.push_front(Arc::clone(node));
                self.stack_index.insert(node.key.clone(), handle);
            }
        }
    }

    fn queue_push_tail(&mut self, node: &Arc<Node<K, V>>) {
        let handle = self.queue.push_back(Arc::clone(node));
        self.queue_index.insert(ident(node), handle);
    }

    fn queue_remove(&mut self, node: &Arc<Node<K, V>>) -> bool {
        match self.queue_index.remove(&ident(node)) {
            Some(handle) => {
                // SAFETY: queue handles are removed from the index whenever
                // the element leaves the queue, so this one is live.
                unsafe {
                    self.queue.unlink(handle);
                }
                true
            }
            None => false,
        }
    }

    fn queue_pop_head(&mut self) -> Option<Arc<Node<K, V>>> {
        let node = self.queue.pop_front()?;
        self.queue_index.remove(&ident(&node));
        Some(node)
    }

    #[cfg(test)]
    fn stack_keys_top_down(&self) -> Vec<K> {
        let mut out = Vec::new();
        self.stack.for_each(|node| out.push(node.key.clone()));
        out
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

// SAFETY: the raw handles in both indexes point into lists the policy owns;
// the policy is only used behind the segment lock.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for LirsPolicy<K, V> {}

impl<K, V> core::fmt::Debug for LirsPolicy<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LirsPolicy")
            .field("lir_count", &self.lir_count)
            .field("lir_budget", &self.lir_budget)
            .field("hir_budget", &self.hir_budget)
            .field("stack_len", &self.stack.len())
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
