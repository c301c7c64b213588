//! Seams to the outside world: building candidates, comparing them, and
//! measuring progress against a reference.

use serde::{Deserialize, Serialize};
use spsa_types::{BuildError, EvaluationError, ParameterVector, VerificationError};
use std::fmt;

/// Which role a realized candidate plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSlot {
    Plus,
    Minus,
    /// Full-strength snapshot after `iteration` completed iterations.
    Verification { iteration: usize },
    /// The fixed vector verification measures against. Realized once per run.
    Reference,
}

impl fmt::Display for CandidateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plus => write!(f, "plus"),
            Self::Minus => write!(f, "minus"),
            Self::Verification { iteration } => write!(f, "verification@{iteration}"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Turns a projected parameter vector into something runnable.
pub trait Realizer {
    type Handle;

    fn realize(&mut self, candidate: &ParameterVector, slot: CandidateSlot) -> Result<Self::Handle, BuildError>;
}

/// Noisy paired comparison. A positive score means `plus` outperformed
/// `minus`.
pub trait Evaluator<H> {
    /// One-time setup before the first iteration.
    fn prepare(&mut self) -> Result<(), EvaluationError> {
        Ok(())
    }

    fn evaluate(&mut self, plus: &H, minus: &H) -> Result<f64, EvaluationError>;
}

/// High-trial-count comparison of a candidate against the realized
/// reference. Returns a rating difference; only ever observed, never fed
/// back into the optimizer.
pub trait Verifier<H> {
    fn verify(&mut self, candidate: &H, reference: &H, iteration: usize) -> Result<f64, VerificationError>;
}

/// Realizer for in-process objectives: the handle is the projected vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRealizer;

impl Realizer for DirectRealizer {
    type Handle = ParameterVector;

    fn realize(&mut self, candidate: &ParameterVector, _slot: CandidateSlot) -> Result<ParameterVector, BuildError> {
        Ok(candidate.clone())
    }
}

impl<H, F> Evaluator<H> for F
where
    F: FnMut(&H, &H) -> Result<f64, EvaluationError>,
{
    fn evaluate(&mut self, plus: &H, minus: &H) -> Result<f64, EvaluationError> {
        self(plus, minus)
    }
}
