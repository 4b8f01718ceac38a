//! Join-Path Exploration Tests
//!
//! End-to-end optimizer behavior over mock executors: cheapest-path
//! selection, zero-cardinality handling, underflow recovery and the
//! NoSolutions contract.

use std::sync::Arc;

use triad_core::rto::{
    optimize, optimize_with_metrics, Constraint, CutoffJoinExecutor, EdgeSample, Estimate,
    JoinGraph, Predicate, SamplerError, Var, Vertex, VertexId, VertexSample,
};
use triad_core::{Error, RtoConfig};

#[derive(Debug)]
struct Pattern {
    name: &'static str,
    vars: Vec<Var>,
}

impl Predicate for Pattern {
    fn vars(&self) -> &[Var] {
        &self.vars
    }
}

fn vertex(id: u32, name: &'static str, vars: &[&str], card: u64) -> Arc<Vertex> {
    Arc::new(Vertex::new(
        VertexId(id),
        Arc::new(Pattern {
            name,
            vars: vars.iter().map(|v| Var::new(v)).collect(),
        }),
        VertexSample::new(card, card, 100, false),
    ))
}

/// A chain-shaped graph: p_i binds {x_i, x_{i+1}}, so only neighbors join
/// directly.
fn chain(n: u32) -> JoinGraph {
    let names: &[&'static str] = &["p0", "p1", "p2", "p3", "p4", "p5", "p6"];
    let var_names: Vec<String> = (0..=n).map(|i| format!("x{i}")).collect();
    let vertices: Vec<Arc<Vertex>> = (0..n)
        .map(|i| {
            let a = var_names[i as usize].as_str();
            let b = var_names[(i + 1) as usize].as_str();
            vertex(i, names[i as usize], &[a, b], 100)
        })
        .collect();
    JoinGraph::new(vertices, Vec::new()).unwrap()
}

/// Prices a cutoff join by the set of predicates in the prefix, recognized
/// by pointer identity against the graph's own predicate `Arc`s.
struct SetExecutor {
    graph_preds: Vec<(String, Arc<dyn Predicate>)>,
    card_of: fn(&[String]) -> u64,
}

impl SetExecutor {
    fn new(graph: &JoinGraph, card_of: fn(&[String]) -> u64) -> Self {
        let graph_preds = graph
            .vertices()
            .iter()
            .map(|v| (format!("p{}", v.id().0), Arc::clone(v.predicate())))
            .collect();
        SetExecutor {
            graph_preds,
            card_of,
        }
    }

    fn names_of(&self, predicates: &[Arc<dyn Predicate>]) -> Vec<String> {
        let mut names: Vec<String> = predicates
            .iter()
            .map(|p| {
                self.graph_preds
                    .iter()
                    .find(|(_, known)| Arc::ptr_eq(known, p))
                    .map(|(name, _)| name.clone())
                    .expect("executor handed an unknown predicate")
            })
            .collect();
        names.sort_unstable();
        names
    }
}

impl CutoffJoinExecutor for SetExecutor {
    fn cutoff_join(
        &self,
        source: &EdgeSample,
        predicates: &[Arc<dyn Predicate>],
        _constraints: &[Arc<dyn Constraint>],
        _path_is_complete: bool,
        limit: u64,
    ) -> Result<EdgeSample, SamplerError> {
        // A join over an empty source produces nothing, whatever the
        // prefix's nominal cardinality.
        let card = if source.est_card == 0 {
            0
        } else {
            (self.card_of)(&self.names_of(predicates))
        };
        let produced = card.min(limit);
        Ok(EdgeSample::new(
            limit,
            produced.max(1),
            produced,
            Estimate::derive(source.estimate, produced, limit),
        ))
    }
}

// ---------------------------------------------------------------------------
// Cheapest-path selection
// ---------------------------------------------------------------------------

#[test]
fn optimizer_returns_a_complete_path() {
    let graph = chain(5);
    let executor = SetExecutor::new(&graph, |_| 10);
    let path = optimize(&graph, &RtoConfig::default(), &executor).unwrap();
    assert_eq!(path.len(), 5);
    assert_eq!(
        path.vertex_set(),
        (0..5).map(VertexId).collect::<Vec<_>>()
    );
}

#[test]
fn cheaper_join_order_wins() {
    let graph = chain(3);
    // Prefixes containing p2 are much cheaper: the best order enters the
    // chain from its p2 end.
    let executor = SetExecutor::new(&graph, |names| {
        if names.contains(&"p2".to_string()) {
            2
        } else {
            90
        }
    });
    let path = optimize(&graph, &RtoConfig::default(), &executor).unwrap();
    // Both extensions of the winning order ran at the cheap cardinality;
    // any order paying the expensive first join (cost 90+) loses.
    assert_eq!(path.cost(), 4);
    assert!(path.contains(VertexId(2)));
}

// ---------------------------------------------------------------------------
// Scenario: a seven-vertex graph with one dead route and one live route
// ---------------------------------------------------------------------------

/// Routes that do not start from p0 hit a zero-cardinality intermediate
/// join and underflow; the route growing from p0 stays positive.
fn one_live_route(names: &[String]) -> u64 {
    if names.contains(&"p0".to_string()) {
        10
    } else {
        0
    }
}

#[test]
fn optimizer_picks_the_positive_route() {
    let graph = chain(7);
    let executor = SetExecutor::new(&graph, one_live_route);
    let path = optimize(&graph, &RtoConfig::default(), &executor).unwrap();

    assert_eq!(path.len(), 7);
    // Only paths grown from p0 ever produced rows.
    assert_eq!(path.vertices()[0].id(), VertexId(0));
    assert!(path.sample().est_card > 0);
}

#[test]
fn all_routes_underflowing_is_no_solutions() {
    let graph = chain(7);
    // Force even the p0 route to underflow.
    let executor = SetExecutor::new(&graph, |_| 0);
    let result = optimize(&graph, &RtoConfig::default(), &executor);
    assert!(matches!(result, Err(Error::NoSolutions)));
}

#[test]
fn exact_empty_result_is_a_valid_answer() {
    // An exact zero is a true empty join, not an estimation failure.
    let vertices = vec![
        Arc::new(Vertex::new(
            VertexId(0),
            Arc::new(Pattern {
                name: "a",
                vars: vec![Var::new("x"), Var::new("y")],
            }),
            VertexSample::new(0, 0, 100, true),
        )),
        Arc::new(Vertex::new(
            VertexId(1),
            Arc::new(Pattern {
                name: "b",
                vars: vec![Var::new("y"), Var::new("z")],
            }),
            VertexSample::new(5, 5, 100, true),
        )),
    ];
    let graph = JoinGraph::new(vertices, Vec::new()).unwrap();

    struct ExactEmpty;
    impl CutoffJoinExecutor for ExactEmpty {
        fn cutoff_join(
            &self,
            source: &EdgeSample,
            _predicates: &[Arc<dyn Predicate>],
            _constraints: &[Arc<dyn Constraint>],
            _path_is_complete: bool,
            limit: u64,
        ) -> Result<EdgeSample, SamplerError> {
            Ok(EdgeSample::new(
                limit,
                1,
                0,
                Estimate::derive(source.estimate, 0, limit),
            ))
        }
    }

    let path = optimize(&graph, &RtoConfig::default(), &ExactEmpty).unwrap();
    assert_eq!(path.sample().est_card, 0);
    assert!(path.sample().is_exact());
}

// ---------------------------------------------------------------------------
// Underflow recovery
// ---------------------------------------------------------------------------

#[test]
fn underflowed_path_recovers_at_a_doubled_limit() {
    struct SkewedExecutor;
    impl CutoffJoinExecutor for SkewedExecutor {
        fn cutoff_join(
            &self,
            source: &EdgeSample,
            _predicates: &[Arc<dyn Predicate>],
            _constraints: &[Arc<dyn Constraint>],
            _path_is_complete: bool,
            limit: u64,
        ) -> Result<EdgeSample, SamplerError> {
            // The join produces nothing until the sample is deep enough.
            let produced = if limit >= 200 { 50 } else { 0 };
            Ok(EdgeSample::new(
                limit,
                limit,
                produced,
                Estimate::derive(source.estimate, produced, limit),
            ))
        }
    }

    let graph = chain(2);
    let (path, metrics) =
        optimize_with_metrics(&graph, &RtoConfig::default(), &SkewedExecutor).unwrap();
    assert_eq!(path.sample().est_card, 50);
    assert!(metrics.resamples >= 1, "recovery must have re-sampled");
}

#[test]
fn recovery_attempts_are_bounded() {
    struct AlwaysUnderflow;
    impl CutoffJoinExecutor for AlwaysUnderflow {
        fn cutoff_join(
            &self,
            source: &EdgeSample,
            _predicates: &[Arc<dyn Predicate>],
            _constraints: &[Arc<dyn Constraint>],
            _path_is_complete: bool,
            limit: u64,
        ) -> Result<EdgeSample, SamplerError> {
            Ok(EdgeSample::new(
                limit,
                1,
                0,
                Estimate::derive(source.estimate, 0, limit),
            ))
        }
    }

    let graph = chain(2);
    let mut config = RtoConfig::default();
    config.max_resamples = 3;
    let result = optimize_with_metrics(&graph, &config, &AlwaysUnderflow);
    match result {
        Err(Error::NoSolutions) => {}
        other => panic!("expected NoSolutions, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Constraints as join bridges, end to end
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Filter {
    vars: Vec<Var>,
}

impl Constraint for Filter {
    fn vars(&self) -> &[Var] {
        &self.vars
    }
}

#[test]
fn bridged_graph_avoids_cross_products() {
    // Two variable-disjoint islands bridged only by a filter over one
    // variable of each.
    let vertices = vec![
        vertex(0, "p0", &["a", "b"], 10),
        vertex(1, "p1", &["c", "d"], 10),
    ];
    let constraints: Vec<Arc<dyn Constraint>> = vec![Arc::new(Filter {
        vars: vec![Var::new("b"), Var::new("c")],
    })];
    let graph = JoinGraph::new(vertices, constraints).unwrap();

    struct ConstraintChecker;
    impl CutoffJoinExecutor for ConstraintChecker {
        fn cutoff_join(
            &self,
            source: &EdgeSample,
            _predicates: &[Arc<dyn Predicate>],
            constraints: &[Arc<dyn Constraint>],
            path_is_complete: bool,
            limit: u64,
        ) -> Result<EdgeSample, SamplerError> {
            // The bridging filter becomes fully bound at the second vertex
            // of a complete two-vertex path and must be attached there.
            assert!(path_is_complete);
            assert_eq!(constraints.len(), 1);
            Ok(EdgeSample::new(
                limit,
                5,
                5,
                Estimate::derive(source.estimate, 5, limit),
            ))
        }
    }

    let path = optimize(&graph, &RtoConfig::default(), &ConstraintChecker).unwrap();
    assert_eq!(path.len(), 2);
}

#[test]
fn metrics_report_exploration_effort() {
    let graph = chain(4);
    let executor = SetExecutor::new(&graph, |_| 10);
    let (_, metrics) = optimize_with_metrics(&graph, &RtoConfig::default(), &executor).unwrap();
    assert_eq!(metrics.rounds, 3);
    assert!(metrics.cutoff_joins >= 3);
    assert!(metrics.pruned_paths > 0);
}
