//! Runtime join-path exploration (RTO).
//!
//! The query optimizer's cost model is only as good as its cardinality
//! estimates, and for join orders those estimates are notoriously wrong
//! when derived statically. This engine prices candidate join orders at
//! runtime instead: it extends partial paths one vertex at a time, runs a
//! bounded *cutoff join* against a sample of the path's intermediate
//! solutions for each extension, prunes dominated orders, and returns the
//! cheapest complete path.
//!
//! The engine knows nothing about the data itself. Predicates, filters and
//! the join machinery live behind the [`Predicate`], [`Constraint`] and
//! [`CutoffJoinExecutor`] seams; the engine consumes variable sets and
//! sample statistics only.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triad_core::rto::{optimize, CutoffJoinExecutor, JoinGraph};
//! use triad_core::RtoConfig;
//!
//! # fn demo(graph: JoinGraph, executor: &dyn CutoffJoinExecutor) -> triad_core::Result<()> {
//! let config = RtoConfig::new(100);
//! let path = optimize(&graph, &config, executor)?;
//! for vertex in path.vertices() {
//!     println!("join {}", vertex.id());
//! }
//! # Ok(())
//! # }
//! ```

mod analysis;
mod executor;
pub(crate) mod graph;
mod optimizer;
mod path;
mod sample;

pub use analysis::{can_join, can_join_using_constraints, join_graph_constraints};
pub use executor::{CutoffJoinExecutor, SamplerError};
pub use graph::{Constraint, JoinGraph, Predicate, Var, Vertex, VertexId};
pub use optimizer::{optimize, optimize_with_metrics};
pub use path::{CostPolicy, Path};
pub use sample::{EdgeSample, Estimate, VertexSample};
