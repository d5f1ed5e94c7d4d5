//! Saga lifecycle.

use serde::{Deserialize, Serialize};

/// Where a saga is in its run.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──┬──► Failed
///                                              └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    /// Undoing the steps that already succeeded.
    Compensating,
    Completed,
    /// A step failed, or undoing one did.
    Failed,
    /// Stopped or timed out between steps, then compensated.
    Cancelled,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Failed | SagaState::Cancelled
        )
    }

    /// Returns true if a saga in this state may move to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Completed | Compensating)
                | (Compensating, Failed | Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "not_started",
            SagaState::Running => "running",
            SagaState::Compensating => "compensating",
            SagaState::Completed => "completed",
            SagaState::Failed => "failed",
            SagaState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
