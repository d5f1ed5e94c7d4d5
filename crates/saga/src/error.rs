//! Saga error types.

use thiserror::Error;

/// A compensation that failed while undoing a saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    pub step: String,
    pub reason: String,
}

impl std::fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}': {}", self.step, self.reason)
    }
}

fn join_failures(failures: &[CompensationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga or one of its steps was built incorrectly.
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),

    /// Saga has already been started.
    #[error("Saga has already been started")]
    AlreadyStarted,

    /// A step failed and every earlier step was compensated.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// Cancellation was requested; completed steps were compensated.
    #[error("Saga cancelled before step '{before_step}'")]
    Cancelled { before_step: String },

    /// The saga's deadline passed; completed steps were compensated.
    #[error("Saga deadline exceeded before step '{before_step}'")]
    DeadlineExceeded { before_step: String },

    /// The saga stopped at `step` and undoing the earlier steps failed too.
    /// Side effects may be partially applied.
    #[error(
        "Saga stopped at step '{step}' ({reason}) and compensation failed for {}",
        join_failures(.failures)
    )]
    CompensationFailed {
        step: String,
        reason: String,
        failures: Vec<CompensationFailure>,
    },
}

impl SagaError {
    /// Returns true if the saga may have left side effects behind.
    pub fn is_compensation_failure(&self) -> bool {
        matches!(self, SagaError::CompensationFailed { .. })
    }

    /// Name of the step at which the saga stopped, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            SagaError::StepFailed { step, .. } | SagaError::CompensationFailed { step, .. } => {
                Some(step)
            }
            SagaError::Cancelled { before_step } | SagaError::DeadlineExceeded { before_step } => {
                Some(before_step)
            }
            SagaError::InvalidDefinition(_) | SagaError::AlreadyStarted => None,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensation_failure_message_lists_every_failure() {
        let err = SagaError::CompensationFailed {
            step: "charge".into(),
            reason: "card declined".into(),
            failures: vec![
                CompensationFailure {
                    step: "reserve".into(),
                    reason: "timeout".into(),
                },
                CompensationFailure {
                    step: "open".into(),
                    reason: "gone".into(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("'charge'"));
        assert!(message.contains("card declined"));
        assert!(message.contains("'reserve': timeout"));
        assert!(message.contains("'open': gone"));
        assert!(err.is_compensation_failure());
        assert_eq!(err.step(), Some("charge"));
    }

    #[test]
    fn plain_failures_are_not_compensation_failures() {
        let err = SagaError::StepFailed {
            step: "b".into(),
            reason: "x".into(),
        };
        assert!(!err.is_compensation_failure());
        assert!(!SagaError::AlreadyStarted.is_compensation_failure());
        assert_eq!(SagaError::AlreadyStarted.step(), None);
    }
}
