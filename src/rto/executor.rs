//! The sampling executor seam.

use std::sync::Arc;

use super::graph::{Constraint, Predicate};
use super::sample::EdgeSample;

/// Error type surfaced by an executor; propagated verbatim as
/// [`Error::Sampler`](crate::Error).
pub type SamplerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Runs cutoff joins on behalf of the engine.
///
/// Given a source sample (the multiset of solutions produced by the path so
/// far, bounded by its limit), the ordered predicate prefix including the
/// newly appended predicate, and the constraints that become eligible at
/// this step, the executor joins the source against the new predicate and
/// returns an output sample of at most `limit` rows. The engine treats the
/// call as a pure function; any internal parallelism is the executor's
/// business, and `limit` bounds the work it may perform.
pub trait CutoffJoinExecutor {
    /// Performs one cutoff join.
    fn cutoff_join(
        &self,
        source: &EdgeSample,
        predicates: &[Arc<dyn Predicate>],
        constraints: &[Arc<dyn Constraint>],
        path_is_complete: bool,
        limit: u64,
    ) -> Result<EdgeSample, SamplerError>;
}
