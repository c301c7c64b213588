//! The SPSA optimization loop.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use spsa_types::{
    internal_error, ConfigError, EvaluationError, ParameterSpace, ParameterVector, RunConfig, TrajectoryError,
    TuneError, TuneResult, VerificationError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{CandidateSlot, Evaluator, Realizer, Verifier};
use crate::gradient::GradientEstimator;
use crate::perturbation::{PerturbationSource, RademacherPerturbation};
use crate::projection::Projector;
use crate::run::{RunState, RunStatus};
use crate::schedule::{GainSchedule, Gains};
use crate::trajectory::TrajectoryStore;

/// Everything that happened during one iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    pub gains: Gains,
    pub delta: ParameterVector,
    pub plus: ParameterVector,
    pub minus: ParameterVector,
    pub score: f64,
    pub gradient: ParameterVector,
    /// The logical vector after the update (not projected).
    pub params: ParameterVector,
    /// Rating from a verification triggered by this iteration, if it succeeded.
    pub rating: Option<f64>,
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub final_params: ParameterVector,
    pub history: Vec<ParameterVector>,
}

/// Drives `Initializing -> Iterating <-> Verifying -> Completed`.
///
/// Iterations are strictly sequential. Bounds are enforced lazily: only the
/// candidates handed to the realizer are projected, the running vector is
/// updated unclamped. Any build or evaluation failure aborts the run; the
/// trajectory persisted so far stays on disk.
pub struct SpsaOptimizer<R: Realizer> {
    config: RunConfig,
    space: Arc<ParameterSpace>,
    schedule: GainSchedule,
    projector: Projector,
    estimator: GradientEstimator,
    perturbation: Box<dyn PerturbationSource>,
    realizer: R,
    evaluator: Box<dyn Evaluator<R::Handle>>,
    verifier: Option<Box<dyn Verifier<R::Handle>>>,
    reference: ParameterVector,
    reference_handle: Option<R::Handle>,
    seed: u64,
    rng: ChaCha8Rng,
    current: ParameterVector,
    trajectory: TrajectoryStore,
    status: RunStatus,
    next_iteration: usize,
}

impl<R: Realizer> SpsaOptimizer<R> {
    pub fn new<E>(config: RunConfig, space: Arc<ParameterSpace>, realizer: R, evaluator: E) -> Result<Self, ConfigError>
    where
        E: Evaluator<R::Handle> + 'static,
    {
        config.validate()?;
        let current = space.initial_with_overrides(&config.initial_overrides)?;
        let reference = space.initial_with_overrides(&config.reference_overrides)?;
        let seed = config.seed.unwrap_or_else(rand::random);

        Ok(Self {
            schedule: GainSchedule::new(&config),
            projector: Projector::new(),
            estimator: GradientEstimator::new(),
            perturbation: Box::new(RademacherPerturbation),
            realizer,
            evaluator: Box::new(evaluator),
            verifier: None,
            reference,
            reference_handle: None,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            current,
            trajectory: TrajectoryStore::new(Arc::clone(&space)),
            status: RunStatus::new(config.num_iterations),
            next_iteration: 0,
            space,
            config,
        })
    }

    pub fn with_verifier<V>(mut self, verifier: V) -> Self
    where
        V: Verifier<R::Handle> + 'static,
    {
        self.verifier = Some(Box::new(verifier));
        self
    }

    pub fn with_perturbation<P>(mut self, perturbation: P) -> Self
    where
        P: PerturbationSource + 'static,
    {
        self.perturbation = Box::new(perturbation);
        self
    }

    pub fn with_trajectory_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.trajectory = self.trajectory.with_sink(path);
        self
    }

    /// Continues a run from a persisted trajectory: the last snapshot becomes
    /// the current vector and iteration numbering picks up after it.
    pub fn resume_from(mut self, trajectory: TrajectoryStore) -> TuneResult<Self> {
        if self.status.state != RunState::Initializing {
            return Err(internal_error!("cannot resume a run that has already started"));
        }
        if **trajectory.space() != *self.space {
            return Err(TrajectoryError::HeaderMismatch {
                expected: self.space.names().collect::<Vec<_>>().join(", "),
                found: trajectory.space().names().collect::<Vec<_>>().join(", "),
            }
            .into());
        }
        let last = trajectory.last().cloned().ok_or_else(|| TrajectoryError::Empty {
            path: trajectory
                .sink()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        })?;

        self.next_iteration = trajectory.len() - 1;
        self.status.iterations_completed = self.next_iteration;
        self.current = last;
        self.trajectory = trajectory;
        info!(
            "Resuming run at iteration {} of {}",
            self.next_iteration, self.config.num_iterations
        );
        Ok(self)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    pub fn schedule(&self) -> &GainSchedule {
        &self.schedule
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The fixed vector verification measures against.
    pub fn reference(&self) -> &ParameterVector {
        &self.reference
    }

    pub fn current(&self) -> &ParameterVector {
        &self.current
    }

    pub fn trajectory(&self) -> &TrajectoryStore {
        &self.trajectory
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn next_iteration(&self) -> usize {
        self.next_iteration
    }

    /// Runs all remaining iterations.
    pub fn run(&mut self) -> TuneResult<RunOutcome> {
        while self.step()?.is_some() {}
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome {
            status: self.status.clone(),
            final_params: self.current.clone(),
            history: self.trajectory.snapshots().to_vec(),
        }
    }

    /// Runs exactly one iteration. Returns `None` once the planned number of
    /// iterations has been reached.
    pub fn step(&mut self) -> TuneResult<Option<IterationReport>> {
        match self.status.state {
            RunState::Completed => return Ok(None),
            RunState::Failed => {
                return Err(internal_error!(
                    "run {} already failed: {}",
                    self.status.id,
                    self.status.error.as_deref().unwrap_or("unknown error")
                ))
            }
            RunState::Initializing => {
                if let Err(e) = self.initialize() {
                    return Err(self.fail(e));
                }
            }
            RunState::Iterating | RunState::Verifying => {}
        }

        if self.next_iteration >= self.config.num_iterations {
            self.status.mark_completed();
            info!(
                run_id = %self.status.id,
                "SPSA run completed after {} iterations",
                self.status.iterations_completed
            );
            return Ok(None);
        }

        match self.iterate() {
            Ok(report) => Ok(Some(report)),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn initialize(&mut self) -> TuneResult<()> {
        info!(
            run_id = %self.status.id,
            seed = self.seed,
            "Initializing SPSA run: {} parameters ({} active), {} iterations",
            self.space.len(),
            self.space.active_count(),
            self.config.num_iterations
        );
        debug!(
            perturbation = self.perturbation.name(),
            c0 = self.schedule.c0(),
            a0 = self.schedule.a0(),
            "Gain schedule calibrated"
        );
        if self.config.verification_enabled() {
            if self.verifier.is_some() {
                let reference = self.projector.project(&self.reference, &mut self.rng);
                debug!("Reference params:\n{reference}");
                self.reference_handle = Some(self.realizer.realize(&reference, CandidateSlot::Reference)?);
            } else {
                warn!(
                    "verification_period is {} but no verifier is attached; verification disabled",
                    self.config.verification_period
                );
            }
        }

        self.evaluator.prepare()?;

        if self.trajectory.is_empty() {
            self.trajectory.push(self.current.clone())?;
        } else {
            self.trajectory.flush()?;
        }
        self.status.mark_iterating();
        Ok(())
    }

    fn iterate(&mut self) -> TuneResult<IterationReport> {
        let n = self.next_iteration;
        let gains = self.schedule.gains(n);
        debug!("Step {n} params:\n{}", self.current);

        let delta = gains.c * self.perturbation.base_delta(&self.space, &mut self.rng);
        debug!("Step {n} delta:\n{delta}");

        let plus = self.projector.project(&(&self.current + &delta), &mut self.rng);
        let minus = self.projector.project(&(&self.current - &delta), &mut self.rng);

        let plus_handle = self.realizer.realize(&plus, CandidateSlot::Plus)?;
        let minus_handle = self.realizer.realize(&minus, CandidateSlot::Minus)?;

        let score = self.evaluator.evaluate(&plus_handle, &minus_handle)?;
        if !score.is_finite() {
            return Err(EvaluationError::MalformedOutput {
                message: format!("non-finite score {score}"),
            }
            .into());
        }

        let gradient = self.estimator.estimate(score, &delta, gains.a);
        debug!("Step {n} gradient:\n{gradient}");

        self.current = &self.current + &gradient;
        self.trajectory.push(self.current.clone())?;
        self.next_iteration += 1;
        self.status.record_iteration(score);
        info!(
            iteration = n,
            score,
            c = gains.c,
            a = gains.a,
            "Completed SPSA iteration {}/{}",
            n + 1,
            self.config.num_iterations
        );

        let rating = if self.verification_due(self.next_iteration) {
            self.verify(self.next_iteration)
        } else {
            None
        };

        Ok(IterationReport {
            iteration: n,
            gains,
            delta,
            plus,
            minus,
            score,
            gradient,
            params: self.current.clone(),
            rating,
        })
    }

    fn verification_due(&self, completed: usize) -> bool {
        self.verifier.is_some()
            && self.reference_handle.is_some()
            && self.config.verification_enabled()
            && completed % self.config.verification_period == 0
    }

    /// Failures are logged and swallowed: verification only observes.
    fn verify(&mut self, iteration: usize) -> Option<f64> {
        let verifier = self.verifier.as_mut()?;
        let reference = self.reference_handle.as_ref()?;
        self.status.mark_verifying();

        let candidate = self.projector.project(&self.current, &mut self.rng);
        let result = self
            .realizer
            .realize(&candidate, CandidateSlot::Verification { iteration })
            .map_err(VerificationError::from)
            .and_then(|handle| verifier.verify(&handle, reference, iteration));

        let rating = match result {
            Ok(rating) => {
                info!(
                    iteration,
                    rating, "Verification step {iteration}: estimated rating difference from reference {rating}"
                );
                Some(rating)
            }
            Err(e) => {
                warn!(iteration, "Verification step {iteration} failed: {e}");
                None
            }
        };
        self.status.record_verification(rating);
        self.status.mark_iterating();
        rating
    }

    fn fail(&mut self, err: TuneError) -> TuneError {
        error!(
            run_id = %self.status.id,
            "SPSA run aborted at iteration {}: {err}",
            self.next_iteration
        );
        self.status.mark_failed(err.to_string());
        err
    }
}
