#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Crate layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cache`] | Segmented concurrent cache with pluggable eviction |
//! | [`rto`] | Runtime join-path exploration engine |
//! | [`config`] | Construction parameters for both cores |
//! | [`metrics`] | Counter reporting (`MetricsSource`) |
//! | [`error`] | Shared error vocabulary |
//!
//! # Quick start: cache
//!
//! ```
//! use triad_core::{CacheConfig, EvictionStrategy, SegmentedCache};
//!
//! let config = CacheConfig::new(EvictionStrategy::Lirs)
//!     .with_capacity(10_000)
//!     .with_concurrency_level(16);
//! let cache: SegmentedCache<String, Vec<u8>> = SegmentedCache::init(config, None).unwrap();
//!
//! cache.put("spo:<s1>".to_string(), vec![1, 2, 3]);
//! assert!(cache.contains_key("spo:<s1>"));
//! ```
//!
//! # Quick start: join-path exploration
//!
//! ```no_run
//! use triad_core::rto::{optimize, CutoffJoinExecutor, JoinGraph};
//! use triad_core::RtoConfig;
//!
//! # fn demo(graph: JoinGraph, executor: &dyn CutoffJoinExecutor) -> triad_core::Result<()> {
//! let path = optimize(&graph, &RtoConfig::new(100), executor)?;
//! println!("cheapest order costs {}", path.cost());
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `serde`: snapshot serialization of the cache and serde derives on the
//!   sample/config types.

/// Segmented concurrent associative cache with pluggable eviction
/// (`None`, LRU, LIRS), lock-free readers and batched recency processing.
pub mod cache;

/// Configuration structures for both cores.
pub mod config;

/// Shared error vocabulary.
pub mod error;

/// Metrics collection and reporting.
pub mod metrics;

/// Runtime join-path exploration engine: cutoff-join sampling, incremental
/// path extension, constraint-aware edge admissibility.
pub mod rto;

pub use cache::{EvictionListener, EvictionStrategy, RecencyState, SegmentedCache};
pub use config::{CacheConfig, RtoConfig};
pub use error::{Error, Result};
pub use metrics::MetricsSource;
