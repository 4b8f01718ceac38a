//! Metrics reporting for the cache and the join-path engine.
//!
//! Counters are reported through a BTreeMap keyed by metric name. BTreeMap
//! is used instead of HashMap so that metrics always appear in a consistent
//! order: reproducible output matters more than the (negligible) lookup cost
//! at this key count.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Implemented by anything that can report its counters.
pub trait MetricsSource {
    /// Returns all metrics as name/value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Short identifier of the reporting component (e.g. `"lirs"`).
    fn source_name(&self) -> &'static str;
}

/// Core counters tracked by every cache segment.
///
/// The fields are atomics because cache hits are recorded by lock-free
/// readers; everything else is recorded under the segment lock. Relaxed
/// ordering is sufficient: the counters are monitoring data, not part of the
/// publication protocol.
#[derive(Debug, Default)]
pub struct CoreCacheMetrics {
    /// Total lookups (hits + misses).
    requests: AtomicU64,
    /// Lookups that found a live entry.
    hits: AtomicU64,
    /// Entries added by structural inserts.
    insertions: AtomicU64,
    /// Entries removed by the eviction policy.
    evictions: AtomicU64,
    /// Entries removed explicitly (`remove`, `clear`).
    removals: AtomicU64,
}

impl CoreCacheMetrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Total lookups observed so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Lookups that found a live entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Entries removed by the eviction policy.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hit ratio in `[0.0, 1.0]`; `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let requests = self.requests();
        if requests > 0 {
            self.hits() as f64 / requests as f64
        } else {
            0.0
        }
    }

    /// Adds this counter set into an aggregate map (used when summing
    /// per-segment counters into cache-wide totals).
    pub(crate) fn accumulate(&self, into: &mut BTreeMap<String, f64>) {
        for (key, value) in self.to_btreemap() {
            *into.entry(key).or_insert(0.0) += value;
        }
    }

    /// Returns the raw counters as name/value pairs.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("requests".to_string(), self.requests() as f64);
        metrics.insert("hits".to_string(), self.hits() as f64);
        metrics.insert(
            "misses".to_string(),
            self.requests().saturating_sub(self.hits()) as f64,
        );
        metrics.insert(
            "insertions".to_string(),
            self.insertions.load(Ordering::Relaxed) as f64,
        );
        metrics.insert("evictions".to_string(), self.evictions() as f64);
        metrics.insert(
            "removals".to_string(),
            self.removals.load(Ordering::Relaxed) as f64,
        );
        metrics
    }
}

/// Run statistics of one join-path exploration.
///
/// The optimizer is single-threaded, so plain fields suffice here.
#[derive(Debug, Default, Clone)]
pub struct OptimizerMetrics {
    /// Exploration rounds executed.
    pub rounds: u64,
    /// Cutoff joins submitted to the executor.
    pub cutoff_joins: u64,
    /// Paths re-sampled at a larger limit to escape underflow.
    pub resamples: u64,
    /// Candidate paths discarded by per-class cost pruning.
    pub pruned_paths: u64,
}

impl MetricsSource for OptimizerMetrics {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("rounds".to_string(), self.rounds as f64);
        metrics.insert("cutoff_joins".to_string(), self.cutoff_joins as f64);
        metrics.insert("resamples".to_string(), self.resamples as f64);
        metrics.insert("pruned_paths".to_string(), self.pruned_paths as f64);
        metrics
    }

    fn source_name(&self) -> &'static str {
        "rto"
    }
}
