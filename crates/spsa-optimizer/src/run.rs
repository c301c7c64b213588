//! Run lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique tuning run identifier.
pub type RunId = Uuid;

/// Lifecycle state of the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initializing,
    Iterating,
    Verifying,
    Completed,
    Failed,
}

/// Aggregate status of a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub state: RunState,
    pub planned_iterations: usize,
    pub iterations_completed: usize,
    pub last_score: Option<f64>,
    pub verifications_run: usize,
    pub verifications_failed: usize,
    /// Most recent rating difference against the reference.
    pub last_rating: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(planned_iterations: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Initializing,
            planned_iterations,
            iterations_completed: 0,
            last_score: None,
            verifications_run: 0,
            verifications_failed: 0,
            last_rating: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_iterating(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.state = RunState::Iterating;
    }

    pub fn mark_verifying(&mut self) {
        self.state = RunState::Verifying;
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn record_iteration(&mut self, score: f64) {
        self.iterations_completed += 1;
        self.last_score = Some(score);
    }

    /// `None` records a failed verification.
    pub fn record_verification(&mut self, rating: Option<f64>) {
        self.verifications_run += 1;
        match rating {
            Some(r) => self.last_rating = Some(r),
            None => self.verifications_failed += 1,
        }
    }
}
