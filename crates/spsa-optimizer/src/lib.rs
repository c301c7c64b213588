//! # spsa-optimizer
//!
//! Simultaneous Perturbation Stochastic Approximation for noisy black-box
//! tuning of engine parameters.
//!
//! Provides the projector, perturbation sources, gain schedule, gradient
//! estimator, the collaborator traits through which candidates are built and
//! compared, the sequential optimization loop, and trajectory persistence.

mod collaborators;
mod gradient;
mod optimizer;
mod perturbation;
mod projection;
mod run;
mod schedule;
mod trajectory;

pub use collaborators::{CandidateSlot, DirectRealizer, Evaluator, Realizer, Verifier};
pub use gradient::GradientEstimator;
pub use optimizer::{IterationReport, RunOutcome, SpsaOptimizer};
pub use perturbation::{PerturbationSource, RademacherPerturbation};
pub use projection::{stochastic_round, Projector};
pub use run::{RunId, RunState, RunStatus};
pub use schedule::{GainSchedule, Gains};
pub use trajectory::TrajectoryStore;
