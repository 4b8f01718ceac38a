//! Sample statistics for vertices and cutoff-join edges.

/// Classification of an estimated cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Estimate {
    /// The source was exact and the join had headroom below the limit; the
    /// reported cardinality is the true cardinality.
    Exact,
    /// The join filled the limit; the true cardinality is at least the
    /// reported one.
    LowerBound,
    /// Sampled estimate without special provenance.
    Normal,
    /// Zero rows out of an inexact source; the estimate carries no signal
    /// and the path should be re-sampled at a larger limit.
    Underflow,
}

impl Estimate {
    /// Derives the classification of a cutoff-join output.
    ///
    /// A full output is always reported as a lower bound, even from an
    /// exact source: the cutoff cannot distinguish "exactly limit rows"
    /// from a truncation.
    pub fn derive(source: Estimate, produced: u64, limit: u64) -> Estimate {
        if source == Estimate::Exact && produced < limit {
            Estimate::Exact
        } else if produced >= limit {
            Estimate::LowerBound
        } else if produced == 0 {
            Estimate::Underflow
        } else {
            Estimate::Normal
        }
    }
}

/// Initial sample of a bare vertex (its predicate scanned alone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexSample {
    /// Estimated cardinality of the predicate.
    pub est_card: u64,
    /// Tuples read to produce the sample.
    pub est_read: u64,
    /// Sampling limit in effect.
    pub limit: u64,
    /// Whether the sample is the full, exact result.
    pub exact: bool,
}

impl VertexSample {
    /// Creates a vertex sample.
    pub fn new(est_card: u64, est_read: u64, limit: u64, exact: bool) -> Self {
        VertexSample {
            est_card,
            est_read,
            limit,
            exact,
        }
    }

    /// The sample of a single-vertex path is the vertex sample itself.
    pub(crate) fn as_edge(&self) -> EdgeSample {
        EdgeSample {
            limit: self.limit,
            est_read: self.est_read,
            est_card: self.est_card,
            estimate: if self.exact {
                Estimate::Exact
            } else {
                Estimate::Normal
            },
        }
    }
}

/// Bounded sample produced by one cutoff join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeSample {
    /// Cutoff limit the join ran with.
    pub limit: u64,
    /// Tuples read by the join.
    pub est_read: u64,
    /// Output rows (capped at `limit`).
    pub est_card: u64,
    /// Provenance of `est_card`.
    pub estimate: Estimate,
}

impl EdgeSample {
    /// Creates an edge sample; `estimate` is typically produced with
    /// [`Estimate::derive`].
    pub fn new(limit: u64, est_read: u64, est_card: u64, estimate: Estimate) -> Self {
        EdgeSample {
            limit,
            est_read,
            est_card,
            estimate,
        }
    }

    /// `true` when the sample is the full result.
    pub fn is_exact(&self) -> bool {
        self.estimate == Estimate::Exact
    }

    /// `true` when the sample carries no signal and needs re-sampling.
    pub fn is_underflow(&self) -> bool {
        self.estimate == Estimate::Underflow
    }

    /// Limit for a re-sampling attempt: underflowed samples double their
    /// limit, everything else grows by `default_increment`.
    pub fn new_limit(&self, default_increment: u64) -> u64 {
        if self.is_underflow() {
            self.limit.saturating_mul(2)
        } else {
            self.limit.saturating_add(default_increment)
        }
    }
}
