//! Error taxonomy for domain construction and scenario execution.
//!
//! Domain-level failures (shape mismatches) abort the batch. Scenario-local
//! failures (empty candidate sets, degenerate spreads) are logged and the
//! scenario continues with a partial result. Numeric degeneracy never
//! surfaces as an error: NaN/Inf from normalization is replaced with 0 at
//! the point of computation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReefError {
    /// The scenario row named an MCDA algorithm id outside {-1, 0, 1, 2, 3}.
    /// Fatal for the scenario; never silently defaulted.
    #[error("unknown MCDA method id {0} (expected -1, 0, 1, 2 or 3)")]
    UnknownMcdaMethod(i32),

    /// Risk filters removed every candidate location. The selector recovers
    /// by returning zero-filled preferences; builders propagate it.
    #[error("risk filters removed every candidate location")]
    EmptyCandidateSet,

    /// Array dimensionality or site count disagreement at Domain
    /// construction. Fatal for the batch.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, ReefError>;
