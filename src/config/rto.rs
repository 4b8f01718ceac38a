//! Configuration for the runtime join-path exploration engine.

use crate::error::{Error, Result};
use crate::rto::{CostPolicy, Var};

/// Construction parameters for one [`optimize`](crate::rto::optimize) run.
#[derive(Debug, Clone)]
pub struct RtoConfig {
    /// Cutoff limit of the initial sampling round. Must be positive.
    pub limit: u64,

    /// How a path's cumulative cost is derived from its statistics.
    pub cost_policy: CostPolicy,

    /// Variables already bound by the surrounding query plan before the
    /// first vertex of any path runs.
    pub known_bound: Vec<Var>,

    /// Whether the optimized join group is the complete query. Controls
    /// whether filters that only become fully bound at the end of a path
    /// are attached to its last vertex.
    pub path_is_complete: bool,

    /// Additive limit increase used when re-sampling a path whose sample
    /// did not underflow. Underflowed samples double their limit instead.
    pub default_increment: u64,

    /// Upper bound on re-sampling attempts per path before an underflowed
    /// path is given up on.
    pub max_resamples: u32,
}

/// Default cutoff limit.
pub const DEFAULT_LIMIT: u64 = 100;

/// Default additive limit increment for re-sampling.
pub const DEFAULT_INCREMENT: u64 = 100;

/// Default bound on re-sampling attempts per path.
pub const DEFAULT_MAX_RESAMPLES: u32 = 5;

impl RtoConfig {
    /// Creates a configuration with the given cutoff limit and defaults for
    /// everything else.
    pub fn new(limit: u64) -> Self {
        RtoConfig {
            limit,
            cost_policy: CostPolicy::default(),
            known_bound: Vec::new(),
            path_is_complete: true,
            default_increment: DEFAULT_INCREMENT,
            max_resamples: DEFAULT_MAX_RESAMPLES,
        }
    }

    /// Sets the cost policy.
    pub fn with_cost_policy(mut self, cost_policy: CostPolicy) -> Self {
        self.cost_policy = cost_policy;
        self
    }

    /// Seeds the bound-variable set with variables the surrounding plan has
    /// already bound.
    pub fn with_known_bound(mut self, vars: impl IntoIterator<Item = Var>) -> Self {
        self.known_bound = vars.into_iter().collect();
        self
    }

    /// Marks the join group as a fragment of a larger query.
    pub fn partial(mut self) -> Self {
        self.path_is_complete = false;
        self
    }

    /// Checks that every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::invalid("sampling limit must be positive"));
        }
        if self.default_increment == 0 {
            return Err(Error::invalid("limit increment must be positive"));
        }
        Ok(())
    }
}

impl Default for RtoConfig {
    fn default() -> Self {
        RtoConfig::new(DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RtoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limit, DEFAULT_LIMIT);
        assert!(config.path_is_complete);
    }

    #[test]
    fn rejects_zero_limit() {
        assert!(RtoConfig::new(0).validate().is_err());
    }

    #[test]
    fn rejects_zero_increment() {
        let mut config = RtoConfig::default();
        config.default_increment = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_carries_bound_vars() {
        let config = RtoConfig::new(50)
            .with_known_bound([Var::new("s")])
            .partial();
        assert_eq!(config.known_bound.len(), 1);
        assert!(!config.path_is_complete);
    }
}
