//! Configuration for the segmented concurrent cache.

use crate::cache::policy::EvictionStrategy;
use crate::cache::MAX_SEGMENTS;
use crate::error::{Error, Result};

/// Construction parameters for a [`SegmentedCache`](crate::SegmentedCache).
///
/// # Examples
///
/// ```
/// use triad_core::config::CacheConfig;
/// use triad_core::EvictionStrategy;
///
/// let config = CacheConfig::new(EvictionStrategy::Lru)
///     .with_capacity(1024)
///     .with_concurrency_level(8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Total number of entries the cache is sized for. Distributed evenly
    /// across segments (at least one entry per segment).
    pub initial_capacity: usize,

    /// Table load factor. Doubles as the trim-down factor of the LRU policy.
    /// Must be finite and greater than zero.
    pub load_factor: f32,

    /// Expected number of concurrently writing threads. Rounded up to the
    /// next power of two to obtain the segment count; capped at
    /// [`MAX_SEGMENTS`].
    pub concurrency_level: usize,

    /// Which eviction policy each segment runs.
    pub strategy: EvictionStrategy,
}

/// Default capacity when none is given.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Default load factor.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Default concurrency level.
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 16;

impl CacheConfig {
    /// Creates a configuration with the given strategy and default sizing.
    pub fn new(strategy: EvictionStrategy) -> Self {
        CacheConfig {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            strategy,
        }
    }

    /// Sets the total capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the load factor.
    pub fn with_load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Sets the concurrency level.
    pub fn with_concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level;
        self
    }

    /// Checks that every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        if !(self.load_factor.is_finite() && self.load_factor > 0.0) {
            return Err(Error::invalid(format!(
                "load factor must be positive and finite, got {}",
                self.load_factor
            )));
        }
        if self.concurrency_level == 0 {
            return Err(Error::invalid("concurrency level must be positive"));
        }
        Ok(())
    }

    /// Number of segments: `concurrency_level` rounded up to a power of two,
    /// capped at [`MAX_SEGMENTS`].
    pub(crate) fn segment_count(&self) -> usize {
        self.concurrency_level
            .min(MAX_SEGMENTS)
            .next_power_of_two()
    }

    /// Eviction capacity of a single segment.
    pub(crate) fn segment_capacity(&self) -> usize {
        (self.initial_capacity / self.segment_count()).max(1)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::new(EvictionStrategy::None)
    }
}
