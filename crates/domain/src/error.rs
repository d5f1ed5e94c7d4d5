//! Workflow error types.

use saga::SagaError;
use store::{StoreError, TransactionError};
use thiserror::Error;

use crate::reward::RewardError;

/// Errors returned by the challenge workflow.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The request was malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request is well-formed but not allowed in the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A unit of work failed to begin, commit or roll back.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    /// An event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The re-evaluation queue has been shut down.
    #[error("Re-evaluation queue is closed")]
    QueueClosed,
}

impl ChallengeError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ChallengeError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ChallengeError::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChallengeError::Validation(message.into())
    }

    /// Returns true if the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChallengeError::Validation(_)
                | ChallengeError::NotFound { .. }
                | ChallengeError::Conflict(_)
        )
    }

    /// Returns true if storage or side effects may be left half-applied.
    pub fn requires_operator_attention(&self) -> bool {
        match self {
            ChallengeError::Transaction(err) => err.requires_operator_attention(),
            ChallengeError::Saga(err) => err.is_compensation_failure(),
            _ => false,
        }
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, ChallengeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_faults_are_client_errors() {
        assert!(ChallengeError::validation("empty title").is_client_error());
        assert!(ChallengeError::not_found("submission", "x").is_client_error());
        assert!(ChallengeError::conflict("duplicate vote").is_client_error());
        assert!(!ChallengeError::QueueClosed.is_client_error());
    }

    #[test]
    fn rollback_failure_needs_an_operator() {
        let err = ChallengeError::from(TransactionError::RollbackFailed {
            cause: "boom".into(),
            source: StoreError::Unavailable("down".into()),
        });
        assert!(!err.is_client_error());
        assert!(err.requires_operator_attention());

        let commit = ChallengeError::from(TransactionError::Commit(StoreError::Unavailable(
            "down".into(),
        )));
        assert!(!commit.requires_operator_attention());
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = ChallengeError::not_found("challenge", "42");
        assert_eq!(err.to_string(), "challenge not found: 42");
    }
}
