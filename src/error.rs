//! Shared error vocabulary for the cache and the join-path engine.

use thiserror::Error;

/// Error type shared by both cores.
///
/// Recency state-machine violations inside the eviction policies are not
/// represented here: a transition from the wrong source state indicates a
/// corrupted policy and is raised as a panic by the checked transition
/// methods rather than surfaced as a recoverable error.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument failed validation (non-positive capacity, load factor or
    /// concurrency level; empty or duplicate-vertex path; zero sampling
    /// limit).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Every surviving complete join path underflowed to zero cardinality
    /// without an exact source sample.
    #[error("join graph produced no path with positive cardinality")]
    NoSolutions,

    /// The cutoff-join executor reported a failure; the underlying error is
    /// propagated verbatim.
    #[error("cutoff join sampling failed: {0}")]
    Sampler(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`] with a formatted message.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
