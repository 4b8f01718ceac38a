//! Concurrent Cache Correctness Tests
//!
//! Thread-safety and weak-consistency behavior of the segmented cache:
//! oracle comparison on disjoint key partitions, shared-key chaos, and the
//! aggregate/iteration protocols under mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use triad_core::{CacheConfig, EvictionStrategy, SegmentedCache};

fn unbounded(segments: usize) -> Arc<SegmentedCache<u64, u64>> {
    Arc::new(
        SegmentedCache::init(
            CacheConfig::new(EvictionStrategy::None)
                .with_capacity(1024)
                .with_concurrency_level(segments),
            None,
        )
        .unwrap(),
    )
}

/// Eight threads, each driving put/remove/get over its own key range; at
/// completion the cache must agree exactly with the union of the
/// per-thread oracles.
#[test]
fn concurrent_put_remove_matches_oracle() {
    const THREADS: u64 = 8;
    const OPS: u64 = 10_000;
    const RANGE: u64 = 512;

    let cache = unbounded(16);
    let mut handles = Vec::new();
    for t in 0..THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(t);
            let mut oracle: HashMap<u64, u64> = HashMap::new();
            let base = t * RANGE;
            for i in 0..OPS {
                let key = base + rng.gen_range(0..RANGE);
                match i % 4 {
                    0 | 1 => {
                        cache.put(key, i);
                        oracle.insert(key, i);
                    }
                    2 => {
                        let expected = oracle.remove(&key);
                        assert_eq!(cache.remove(&key), expected);
                    }
                    _ => {
                        assert_eq!(cache.get(&key), oracle.get(&key).copied());
                    }
                }
            }
            oracle
        }));
    }

    let mut combined: HashMap<u64, u64> = HashMap::new();
    for handle in handles {
        combined.extend(handle.join().unwrap());
    }

    assert_eq!(cache.len(), combined.len());
    for (key, value) in &combined {
        assert_eq!(cache.get(key), Some(*value), "key {key} diverged");
    }
    assert_eq!(cache.iter().count(), combined.len());
}

/// Shared keys under mixed operations: no panics, and the quiescent state
/// is internally consistent (len, iteration and lookups agree).
#[test]
fn shared_key_chaos_stays_consistent() {
    const THREADS: u64 = 8;
    const OPS: u64 = 20_000;
    const KEYS: u64 = 128;

    let cache = unbounded(4);
    let mut handles = Vec::new();
    for t in 0..THREADS {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(1000 + t);
            for i in 0..OPS {
                let key = rng.gen_range(0..KEYS);
                match i % 5 {
                    0 | 1 => {
                        cache.put(key, t * OPS + i);
                    }
                    2 => {
                        cache.remove(&key);
                    }
                    3 => {
                        let _ = cache.get(&key);
                    }
                    _ => {
                        let _ = cache.contains_key(&key);
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let len = cache.len();
    assert!(len as u64 <= KEYS);
    let entries: Vec<(u64, u64)> = cache.iter().collect();
    assert_eq!(entries.len(), len);
    for (key, value) in entries {
        assert_eq!(cache.get(&key), Some(value));
    }
}

/// Readers racing a writer on the same segment never observe a broken
/// chain: every key is either absent or carries a value its writer wrote.
#[test]
fn readers_never_observe_half_linked_chains() {
    // One segment forces every key through the same bucket table.
    let cache = Arc::new(
        SegmentedCache::<u64, u64>::init(
            CacheConfig::new(EvictionStrategy::None)
                .with_capacity(8)
                .with_concurrency_level(1),
            None,
        )
        .unwrap(),
    );

    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for round in 0..200u64 {
                for key in 0..64 {
                    cache.put(key, key * 1000 + round);
                }
                for key in (0..64).step_by(2) {
                    cache.remove(&key);
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..50_000 {
                    let key = 17;
                    if let Some(value) = cache.get(&key) {
                        assert_eq!(value / 1000, key, "torn value observed");
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn lru_cache_respects_capacity_under_contention() {
    let cache = Arc::new(
        SegmentedCache::<u64, u64>::init(
            CacheConfig::new(EvictionStrategy::Lru)
                .with_capacity(64)
                .with_load_factor(1.0)
                .with_concurrency_level(4),
            None,
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for t in 0..8u64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..5_000u64 {
                let key = t * 10_000 + i;
                cache.put(key, i);
                let _ = cache.get(&key);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Each of the 4 segments trims to its per-segment target (16).
    assert!(cache.len() <= 64, "len {} exceeds capacity", cache.len());
    assert!(cache.len() > 0);
}

#[test]
fn lirs_cache_survives_concurrent_hot_and_cold_traffic() {
    let cache = Arc::new(
        SegmentedCache::<u64, u64>::init(
            CacheConfig::new(EvictionStrategy::Lirs)
                .with_capacity(256)
                .with_concurrency_level(4),
            None,
        )
        .unwrap(),
    );

    // Warm the hot set.
    for key in 0..32u64 {
        cache.put(key, key);
    }

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(t);
            for i in 0..20_000u64 {
                if rng.gen_bool(0.7) {
                    let _ = cache.get(&rng.gen_range(0..32u64));
                } else {
                    cache.put(1000 + t * 100_000 + i, i);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // The hot working set fits the LIR budget comfortably and survives.
    let surviving = (0..32u64).filter(|k| cache.contains_key(k)).count();
    assert_eq!(surviving, 32);
}

#[test]
fn iteration_is_weakly_consistent_under_mutation() {
    let cache = unbounded(8);
    for key in 0..1000u64 {
        cache.put(key, key);
    }

    let mutator = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for key in 1000..2000u64 {
                cache.put(key, key);
                cache.remove(&(key - 1000));
            }
        })
    };

    // Iteration during mutation must not fail, duplicate, or invent keys.
    for _ in 0..20 {
        let mut seen: Vec<u64> = cache.keys().collect();
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), total, "duplicate key during weak iteration");
        assert!(seen.iter().all(|&k| k < 2000));
    }
    mutator.join().unwrap();

    // Quiescent: exactly the second thousand remains.
    let mut keys: Vec<u64> = cache.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, (1000..2000).collect::<Vec<u64>>());
}

#[test]
fn aggregates_stay_sane_during_mutation() {
    let cache = unbounded(8);
    let mutator = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for i in 0..10_000u64 {
                cache.put(i % 256, i);
                if i % 3 == 0 {
                    cache.remove(&(i % 256));
                }
            }
        })
    };

    for _ in 0..1000 {
        let len = cache.len();
        assert!(len <= 256);
        let _ = cache.is_empty();
    }
    mutator.join().unwrap();

    assert_eq!(cache.len(), cache.iter().count());
    let value_present = cache.iter().next();
    if let Some((_, v)) = value_present {
        assert!(cache.contains_value(&v));
    }
    assert!(!cache.contains_value(&u64::MAX));
}
