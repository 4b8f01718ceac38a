//! The join graph and its collaborator seams.
//!
//! The engine does not evaluate predicates or filters itself; the
//! surrounding query machinery implements [`Predicate`] and [`Constraint`]
//! and hands the engine nothing but identities and variable sets.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;

use crate::error::{Error, Result};

use super::sample::VertexSample;

/// A query variable name.
///
/// Cheap to clone and compare; the engine only ever tests membership.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(Arc<str>);

impl Var {
    /// Creates a variable by name.
    pub fn new(name: &str) -> Self {
        Var(Arc::from(name))
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Var::new(name)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// An access-path predicate (e.g. a triple pattern): the engine needs only
/// the variables it binds.
pub trait Predicate: fmt::Debug + Send + Sync {
    /// Variables bound by evaluating this predicate.
    fn vars(&self) -> &[Var];
}

/// A filter expression: the engine needs only the variables it references.
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Variables the filter references; it can run once all of them are
    /// bound.
    fn vars(&self) -> &[Var];
}

/// Identifier of a vertex within its join graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A predicate plus its initial sample, as a member of a join graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    predicate: Arc<dyn Predicate>,
    sample: VertexSample,
}

impl Vertex {
    /// Wraps a predicate for optimization.
    pub fn new(id: VertexId, predicate: Arc<dyn Predicate>, sample: VertexSample) -> Self {
        Vertex {
            id,
            predicate,
            sample,
        }
    }

    /// The vertex identifier.
    pub fn id(&self) -> VertexId {
        self.id
    }

    /// The wrapped predicate.
    pub fn predicate(&self) -> &Arc<dyn Predicate> {
        &self.predicate
    }

    /// The initial vertex sample.
    pub fn sample(&self) -> VertexSample {
        self.sample
    }

    /// Variables bound by this vertex's predicate.
    pub fn vars(&self) -> &[Var] {
        self.predicate.vars()
    }

    /// `true` if the two predicates share at least one variable.
    pub fn shares_var_with(&self, other: &Vertex) -> bool {
        let mine: HashSet<&Var> = self.vars().iter().collect();
        other.vars().iter().any(|v| mine.contains(v))
    }
}

/// The immutable set of vertices and constraints being optimized.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    vertices: Vec<Arc<Vertex>>,
    constraints: Vec<Arc<dyn Constraint>>,
}

impl JoinGraph {
    /// Builds a join graph.
    ///
    /// Fails with [`Error::InvalidArgument`] when the vertex set is empty
    /// or contains duplicate identifiers.
    pub fn new(
        vertices: Vec<Arc<Vertex>>,
        constraints: Vec<Arc<dyn Constraint>>,
    ) -> Result<Self> {
        if vertices.is_empty() {
            return Err(Error::invalid("join graph needs at least one vertex"));
        }
        let mut seen = HashSet::new();
        for vertex in &vertices {
            if !seen.insert(vertex.id()) {
                return Err(Error::invalid(format!(
                    "duplicate vertex {} in join graph",
                    vertex.id()
                )));
            }
        }
        Ok(JoinGraph {
            vertices,
            constraints,
        })
    }

    /// The graph's vertices.
    pub fn vertices(&self) -> &[Arc<Vertex>] {
        &self.vertices
    }

    /// The graph's filter constraints.
    pub fn constraints(&self) -> &[Arc<dyn Constraint>] {
        &self.constraints
    }

    /// Number of vertices a complete path must span.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
