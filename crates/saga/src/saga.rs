//! Saga definition and execution.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cancellation::{Cancellation, Interrupt};
use crate::error::{CompensationFailure, Result, SagaError};
use crate::state::SagaState;
use crate::step::SagaStep;

#[derive(Debug, Default)]
struct Progress {
    state: SagaState,
    executed: Vec<String>,
}

/// An ordered list of steps run once, front to back.
///
/// If a step fails, or the saga is cancelled between steps, the steps that
/// already succeeded are compensated in reverse order. The failing step's
/// own compensation never runs.
pub struct Saga {
    name: String,
    steps: Vec<SagaStep>,
    cancellation: Cancellation,
    progress: Arc<Mutex<Progress>>,
}

impl Saga {
    pub fn builder(name: impl Into<String>) -> SagaBuilder {
        SagaBuilder {
            name: name.into(),
            steps: Vec::new(),
            cancellation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn state(&self) -> SagaState {
        self.progress().state
    }

    /// Number of steps that have run successfully so far.
    pub fn executed_steps(&self) -> usize {
        self.progress().executed.len()
    }

    pub fn executed_step_names(&self) -> Vec<String> {
        self.progress().executed.clone()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Requests that the saga stop before its next step.
    pub fn stop(&self) {
        self.cancellation.stop();
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SagaState) {
        let mut progress = self.progress();
        debug_assert!(
            progress.state.can_transition_to(state),
            "saga state {} -> {}",
            progress.state,
            state
        );
        progress.state = state;
    }

    /// Runs the saga. May only be called once.
    #[tracing::instrument(skip(self), fields(saga = %self.name))]
    pub async fn execute(&self) -> Result<()> {
        {
            let mut progress = self.progress();
            if !progress.state.can_transition_to(SagaState::Running) {
                return Err(SagaError::AlreadyStarted);
            }
            progress.state = SagaState::Running;
        }
        metrics::counter!("saga_executions_total").increment(1);
        let started = std::time::Instant::now();

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(interrupt) = self.cancellation.check() {
                let before_step = step.name().to_string();
                tracing::info!(step = %before_step, ?interrupt, "saga interrupted");
                let cause = match interrupt {
                    Interrupt::Stopped => SagaError::Cancelled { before_step },
                    Interrupt::DeadlineExceeded => SagaError::DeadlineExceeded { before_step },
                };
                return self.abort(index, cause, SagaState::Cancelled).await;
            }

            tracing::debug!(step = step.name(), "saga step started");
            match step.run().await {
                Ok(()) => {
                    self.progress().executed.push(step.name().to_string());
                    tracing::debug!(step = step.name(), "saga step completed");
                }
                Err(err) => {
                    tracing::warn!(step = step.name(), error = %err, "saga step failed");
                    let cause = SagaError::StepFailed {
                        step: step.name().to_string(),
                        reason: err.to_string(),
                    };
                    return self.abort(index, cause, SagaState::Failed).await;
                }
            }
        }

        self.set_state(SagaState::Completed);
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_completed_total").increment(1);
        tracing::info!(duration, "saga completed");
        Ok(())
    }

    /// Compensates the first `executed` steps in reverse and settles the
    /// error the caller sees.
    async fn abort(&self, executed: usize, cause: SagaError, terminal: SagaState) -> Result<()> {
        self.set_state(SagaState::Compensating);
        metrics::counter!("saga_compensations_total").increment(1);

        let mut failures = Vec::new();
        for step in self.steps[..executed].iter().rev() {
            match step.undo().await {
                Some(Ok(())) => tracing::debug!(step = step.name(), "step compensated"),
                Some(Err(err)) => {
                    tracing::error!(step = step.name(), error = %err, "compensation failed");
                    failures.push(CompensationFailure {
                        step: step.name().to_string(),
                        reason: err.to_string(),
                    });
                }
                None => tracing::debug!(step = step.name(), "nothing to compensate"),
            }
        }

        if failures.is_empty() {
            self.set_state(terminal);
            return Err(cause);
        }

        self.set_state(SagaState::Failed);
        metrics::counter!("saga_compensation_failures_total").increment(1);
        let step = cause.step().unwrap_or_default().to_string();
        Err(SagaError::CompensationFailed {
            step,
            reason: cause.to_string(),
            failures,
        })
    }
}

impl std::fmt::Debug for Saga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("state", &self.state())
            .finish()
    }
}

/// Fluent constructor for [`Saga`].
pub struct SagaBuilder {
    name: String,
    steps: Vec<SagaStep>,
    cancellation: Option<Cancellation>,
}

impl SagaBuilder {
    pub fn step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Uses an existing cancellation handle, e.g. one shared with a caller.
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Gives the saga a deadline `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.cancellation = Some(Cancellation::with_timeout(timeout));
        self
    }

    pub fn build(self) -> Result<Saga> {
        if self.steps.is_empty() {
            return Err(SagaError::InvalidDefinition(format!(
                "saga '{}' has no steps",
                self.name
            )));
        }
        Ok(Saga {
            name: self.name,
            steps: self.steps,
            cancellation: self.cancellation.unwrap_or_default(),
            progress: Arc::default(),
        })
    }
}
