//! Join paths and their cumulative cost accounting.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::analysis::join_graph_constraints;
use super::executor::CutoffJoinExecutor;
use super::graph::{Constraint, JoinGraph, Predicate, Var, Vertex, VertexId};
use super::sample::EdgeSample;

/// How a path's cumulative cost is derived from its statistics.
///
/// The default charges intermediate cardinality only; selecting
/// [`CostPolicy::EstimatedRead`] charges tuples read instead, for plans
/// whose joins are read-bound rather than materialization-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CostPolicy {
    /// Cost = cumulative estimated cardinality.
    #[default]
    EstimatedCardinality,
    /// Cost = cumulative estimated tuples read.
    EstimatedRead,
}

impl CostPolicy {
    /// Applies the policy to a path's cumulative statistics.
    pub fn cost(&self, sum_est_card: u64, sum_est_read: u64) -> u64 {
        match self {
            CostPolicy::EstimatedCardinality => sum_est_card,
            CostPolicy::EstimatedRead => sum_est_read,
        }
    }
}

/// An ordered sequence of vertices and the sample it has produced.
///
/// Paths are immutable: extension and re-sampling construct new paths.
/// The stored edge sample always reflects the exact vertex prefix the path
/// contains, and the cumulative statistics are non-decreasing along
/// extensions.
#[derive(Debug, Clone)]
pub struct Path {
    vertices: Vec<Arc<Vertex>>,
    sample: EdgeSample,
    sum_est_card: u64,
    sum_est_read: u64,
    sum_est_cost: u64,
}

impl Path {
    /// Starts a path at a single vertex; its sample is the vertex sample.
    ///
    /// The cumulative statistics start at zero; they account join work,
    /// and no join has happened yet.
    pub fn start(vertex: Arc<Vertex>) -> Path {
        let sample = vertex.sample().as_edge();
        Path {
            vertices: vec![vertex],
            sample,
            sum_est_card: 0,
            sum_est_read: 0,
            sum_est_cost: 0,
        }
    }

    /// The vertices in join order.
    pub fn vertices(&self) -> &[Arc<Vertex>] {
        &self.vertices
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Always `false`: a path carries at least its starting vertex.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The predicates of the path, in join order.
    pub fn predicates(&self) -> Vec<Arc<dyn Predicate>> {
        self.vertices
            .iter()
            .map(|v| Arc::clone(v.predicate()))
            .collect()
    }

    /// `true` if the path already visits `id`.
    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.iter().any(|v| v.id() == id)
    }

    /// The unordered vertex set, as a sorted id list. Two paths with equal
    /// keys visit the same vertices and compete on cost.
    pub fn vertex_set(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self.vertices.iter().map(|v| v.id()).collect();
        ids.sort_unstable();
        ids
    }

    /// The edge sample of the last extension.
    pub fn sample(&self) -> EdgeSample {
        self.sample
    }

    /// Cumulative intermediate cardinality.
    pub fn sum_est_card(&self) -> u64 {
        self.sum_est_card
    }

    /// Cumulative tuples read.
    pub fn sum_est_read(&self) -> u64 {
        self.sum_est_read
    }

    /// Cumulative cost under the policy the path was built with.
    pub fn cost(&self) -> u64 {
        self.sum_est_cost
    }

    /// Extends the path by one vertex via a cutoff join.
    ///
    /// `constraints` are the filters that become eligible at this step.
    /// Fails with `InvalidArgument` if the vertex is already on the path;
    /// executor failures propagate as [`Error::Sampler`].
    pub fn add_edge(
        &self,
        executor: &dyn CutoffJoinExecutor,
        limit: u64,
        vertex: &Arc<Vertex>,
        constraints: &[Arc<dyn Constraint>],
        path_is_complete: bool,
        cost_policy: CostPolicy,
    ) -> Result<Path> {
        if self.contains(vertex.id()) {
            return Err(Error::invalid(format!(
                "vertex {} is already part of the path",
                vertex.id()
            )));
        }

        let mut predicates = self.predicates();
        predicates.push(Arc::clone(vertex.predicate()));

        let edge = executor
            .cutoff_join(&self.sample, &predicates, constraints, path_is_complete, limit)
            .map_err(Error::Sampler)?;

        let mut vertices = self.vertices.clone();
        vertices.push(Arc::clone(vertex));

        let sum_est_card = self.sum_est_card.saturating_add(edge.est_card);
        let sum_est_read = self.sum_est_read.saturating_add(edge.est_read);
        Ok(Path {
            vertices,
            sample: edge,
            sum_est_card,
            sum_est_read,
            sum_est_cost: cost_policy.cost(sum_est_card, sum_est_read),
        })
    }

    /// Re-runs the path's cutoff-join chain at a larger limit.
    ///
    /// Used to recover from underflow: the chain is replayed from the first
    /// vertex's sample, attaching at each step the constraints that become
    /// eligible there.
    pub fn resample(
        &self,
        executor: &dyn CutoffJoinExecutor,
        graph: &JoinGraph,
        known_bound: &[Var],
        path_is_complete: bool,
        limit: u64,
        cost_policy: CostPolicy,
    ) -> Result<Path> {
        let attachments = join_graph_constraints(
            &self.vertices,
            graph.constraints(),
            known_bound,
            path_is_complete,
        );

        let mut replay = Path::start(Arc::clone(&self.vertices[0]));
        replay.sample.limit = limit;
        for (position, vertex) in self.vertices.iter().enumerate().skip(1) {
            let complete_here =
                path_is_complete && position + 1 == graph.vertex_count();
            replay = replay.add_edge(
                executor,
                limit,
                vertex,
                &attachments[position],
                complete_here,
                cost_policy,
            )?;
        }
        Ok(replay)
    }

    /// Limit for the next re-sampling attempt of this path.
    pub fn new_limit(&self, default_increment: u64) -> u64 {
        self.sample.new_limit(default_increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rto::graph::testing::{pred, vertex};
    use crate::rto::sample::Estimate;

    /// Executor that returns a fixed cardinality per joined prefix length.
    struct StepExecutor {
        cards: Vec<u64>,
    }

    impl CutoffJoinExecutor for StepExecutor {
        fn cutoff_join(
            &self,
            source: &EdgeSample,
            predicates: &[Arc<dyn Predicate>],
            _constraints: &[Arc<dyn Constraint>],
            _path_is_complete: bool,
            limit: u64,
        ) -> std::result::Result<EdgeSample, crate::rto::SamplerError> {
            let card = self.cards[predicates.len() - 2].min(limit);
            Ok(EdgeSample::new(
                limit,
                source.est_card + card,
                card,
                Estimate::derive(source.estimate, card, limit),
            ))
        }
    }

    fn two_vertices() -> (Arc<Vertex>, Arc<Vertex>) {
        (
            vertex(0, pred("a", &["x", "y"]), 10),
            vertex(1, pred("b", &["y", "z"]), 20),
        )
    }

    #[test]
    fn start_carries_vertex_sample_with_zero_sums() {
        let (a, _) = two_vertices();
        let path = Path::start(Arc::clone(&a));
        assert_eq!(path.len(), 1);
        assert_eq!(path.sample().est_card, 10);
        assert_eq!(path.sum_est_card(), 0);
        assert_eq!(path.cost(), 0);
    }

    #[test]
    fn add_edge_grows_length_and_sums() {
        let (a, b) = two_vertices();
        let executor = StepExecutor { cards: vec![15] };
        let path = Path::start(Arc::clone(&a));
        let extended = path
            .add_edge(&executor, 100, &b, &[], false, CostPolicy::default())
            .unwrap();

        assert_eq!(extended.len(), 2);
        assert_eq!(extended.sum_est_card(), 15);
        assert!(extended.sum_est_read() >= 15);
        assert_eq!(extended.cost(), 15);
        // The original is untouched.
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn add_edge_rejects_duplicate_vertex() {
        let (a, _) = two_vertices();
        let executor = StepExecutor { cards: vec![1] };
        let path = Path::start(Arc::clone(&a));
        let result = path.add_edge(&executor, 100, &a, &[], false, CostPolicy::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn cost_policy_selects_statistic() {
        let (a, b) = two_vertices();
        let executor = StepExecutor { cards: vec![5] };
        let path = Path::start(Arc::clone(&a));
        let by_card = path
            .add_edge(&executor, 100, &b, &[], false, CostPolicy::EstimatedCardinality)
            .unwrap();
        let by_read = path
            .add_edge(&executor, 100, &b, &[], false, CostPolicy::EstimatedRead)
            .unwrap();
        assert_eq!(by_card.cost(), by_card.sum_est_card());
        assert_eq!(by_read.cost(), by_read.sum_est_read());
        assert!(by_read.cost() >= by_card.cost());
    }

    #[test]
    fn vertex_set_is_order_insensitive() {
        let (a, b) = two_vertices();
        let executor = StepExecutor { cards: vec![5] };
        let ab = Path::start(Arc::clone(&a))
            .add_edge(&executor, 100, &b, &[], false, CostPolicy::default())
            .unwrap();
        let ba = Path::start(Arc::clone(&b))
            .add_edge(&executor, 100, &a, &[], false, CostPolicy::default())
            .unwrap();
        assert_eq!(ab.vertex_set(), ba.vertex_set());
    }

    #[test]
    fn sums_are_monotone_along_extension() {
        let verts: Vec<_> = (0..4)
            .map(|i| vertex(i, pred("p", &["x"]), 10))
            .collect();
        let executor = StepExecutor {
            cards: vec![7, 3, 11],
        };
        let mut path = Path::start(Arc::clone(&verts[0]));
        let mut last = (0, 0, 0);
        for v in &verts[1..] {
            path = path
                .add_edge(&executor, 100, v, &[], false, CostPolicy::default())
                .unwrap();
            let now = (path.sum_est_card(), path.sum_est_read(), path.cost());
            assert!(now.0 >= last.0 && now.1 >= last.1 && now.2 >= last.2);
            last = now;
        }
        assert_eq!(path.len(), 4);
    }
}
