//! # spsa-runner
//!
//! Concrete collaborators for tuning a chess engine with `spsa-optimizer`:
//! candidates are realized by regenerating the engine's constants module and
//! rebuilding it, and compared by playing short matches through a
//! `cutechess-cli` compatible runner.

pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod cutechess;
pub mod process;
pub mod source;

pub use builder::{BuilderConfig, EngineBuilder, EngineHandle};
pub use catalog::default_parameters;
pub use config::RunnerConfig;
pub use cutechess::{
    parse_elo, parse_score, CutechessEvaluator, CutechessVerifier, MatchRunner, MatchRunnerConfig, MatchScore,
};
pub use source::{clamp_for_preview, render_constants};
