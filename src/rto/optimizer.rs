//! Runtime exploration of the join-order space.
//!
//! The engine grows all surviving partial paths by one vertex per round,
//! pricing each extension with a cutoff join against the path's sample.
//! Paths visiting the same unordered vertex set are interchangeable for
//! every future extension, so only the cheapest of each class survives a
//! round; the search therefore stays polynomial in practice while the
//! samples keep the cardinality estimates grounded in the actual data.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RtoConfig;
use crate::error::{Error, Result};
use crate::metrics::OptimizerMetrics;

use super::analysis::{can_join_using_constraints, join_graph_constraints};
use super::executor::CutoffJoinExecutor;
use super::graph::{JoinGraph, Vertex, VertexId};
use super::path::Path;

/// Finds the cheapest complete join path of `graph`.
///
/// Fails with [`Error::NoSolutions`] when every surviving complete path
/// underflows to zero cardinality without an exact source, and with
/// [`Error::Sampler`] when the executor reports a failure.
pub fn optimize(
    graph: &JoinGraph,
    config: &RtoConfig,
    executor: &dyn CutoffJoinExecutor,
) -> Result<Path> {
    optimize_with_metrics(graph, config, executor).map(|(path, _)| path)
}

/// Like [`optimize`], additionally returning the run statistics.
pub fn optimize_with_metrics(
    graph: &JoinGraph,
    config: &RtoConfig,
    executor: &dyn CutoffJoinExecutor,
) -> Result<(Path, OptimizerMetrics)> {
    config.validate()?;
    let span = graph.vertex_count();
    let mut metrics = OptimizerMetrics::default();

    // Round 1: every vertex starts a path; the per-class pruning below
    // collapses symmetric orders as soon as paths grow.
    let mut survivors: Vec<Tracked> = graph
        .vertices()
        .iter()
        .map(|vertex| Tracked {
            path: Path::start(Arc::clone(vertex)),
            resamples: 0,
        })
        .collect();

    for target_len in 2..=span {
        metrics.rounds += 1;
        resample_underflowed(graph, config, executor, &mut survivors, &mut metrics)?;

        // Group all admissible one-vertex extensions by the unordered
        // vertex set of the resulting path.
        let mut classes: BTreeMap<Vec<VertexId>, Vec<Candidate<'_>>> = BTreeMap::new();
        for tracked in &survivors {
            for vertex in graph.vertices() {
                if tracked.path.contains(vertex.id()) {
                    continue;
                }
                let constrained = can_join_using_constraints(
                    tracked.path.vertices(),
                    vertex,
                    graph.constraints(),
                )?;
                let mut key = tracked.path.vertex_set();
                key.push(vertex.id());
                key.sort_unstable();
                classes.entry(key).or_default().push(Candidate {
                    path: &tracked.path,
                    vertex,
                    constrained,
                });
            }
        }

        let mut next: Vec<Tracked> = Vec::new();
        for (_, mut candidates) in classes {
            // Cross products only compete when the class has no
            // variable-connected way in.
            if candidates.iter().any(|c| c.constrained) {
                candidates.retain(|c| c.constrained);
            }

            let sampled = candidates.len() as u64;
            let mut best: Option<Path> = None;
            for candidate in candidates {
                let complete = config.path_is_complete && target_len == span;
                let extended = sample_extension(
                    graph,
                    config,
                    executor,
                    candidate.path,
                    candidate.vertex,
                    complete,
                )?;
                metrics.cutoff_joins += 1;
                best = Some(match best.take() {
                    Some(current) => pick_survivor(current, extended),
                    None => extended,
                });
            }
            metrics.pruned_paths += sampled.saturating_sub(1);
            if let Some(path) = best {
                next.push(Tracked { path, resamples: 0 });
            }
        }
        survivors = next;
    }

    // Give complete paths that underflowed a bounded chance to recover.
    resample_underflowed(graph, config, executor, &mut survivors, &mut metrics)?;

    let winner = survivors
        .iter()
        .filter(|t| !t.path.sample().is_underflow())
        .min_by_key(|t| t.path.cost());
    match winner {
        Some(tracked) => {
            log::debug!(
                "selected join path over {} vertices, cost {} ({} cutoff joins, {} rounds)",
                span,
                tracked.path.cost(),
                metrics.cutoff_joins,
                metrics.rounds,
            );
            Ok((tracked.path.clone(), metrics))
        }
        None => Err(Error::NoSolutions),
    }
}

struct Tracked {
    path: Path,
    resamples: u32,
}

struct Candidate<'a> {
    path: &'a Path,
    vertex: &'a Arc<Vertex>,
    constrained: bool,
}

/// Chooses between two paths over the same unordered vertex set.
///
/// A sample that carries signal beats an underflowed one regardless of
/// cost: an underflowed path reports zero cardinality, which would
/// otherwise always win the class and starve the estimable alternative.
/// With equal signal, lower cost wins; ties keep the earlier candidate,
/// which keeps the selection deterministic.
fn pick_survivor(current: Path, challenger: Path) -> Path {
    match (
        current.sample().is_underflow(),
        challenger.sample().is_underflow(),
    ) {
        (false, true) => current,
        (true, false) => challenger,
        _ => {
            if challenger.cost() < current.cost() {
                challenger
            } else {
                current
            }
        }
    }
}

/// Extends `path` by `vertex`, attaching the constraints that become
/// eligible at the new position.
fn sample_extension(
    graph: &JoinGraph,
    config: &RtoConfig,
    executor: &dyn CutoffJoinExecutor,
    path: &Path,
    vertex: &Arc<Vertex>,
    path_is_complete: bool,
) -> Result<Path> {
    let mut extended: Vec<Arc<Vertex>> = path.vertices().to_vec();
    extended.push(Arc::clone(vertex));
    let attachments = join_graph_constraints(
        &extended,
        graph.constraints(),
        &config.known_bound,
        path_is_complete,
    );
    let eligible = attachments
        .last()
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    path.add_edge(
        executor,
        config.limit,
        vertex,
        eligible,
        path_is_complete,
        config.cost_policy,
    )
}

/// Re-samples surviving paths whose sample underflowed, at a growing limit,
/// up to the configured attempt bound.
fn resample_underflowed(
    graph: &JoinGraph,
    config: &RtoConfig,
    executor: &dyn CutoffJoinExecutor,
    survivors: &mut [Tracked],
    metrics: &mut OptimizerMetrics,
) -> Result<()> {
    let span = graph.vertex_count();
    for tracked in survivors.iter_mut() {
        while tracked.path.sample().is_underflow() && tracked.resamples < config.max_resamples {
            tracked.resamples += 1;
            metrics.resamples += 1;
            let limit = tracked.path.new_limit(config.default_increment);
            let complete = config.path_is_complete && tracked.path.len() == span;
            tracked.path = tracked.path.resample(
                executor,
                graph,
                &config.known_bound,
                complete,
                limit,
                config.cost_policy,
            )?;
            metrics.cutoff_joins += (tracked.path.len() - 1) as u64;
        }
    }
    Ok(())
}
