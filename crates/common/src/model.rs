//! Persisted records shared by the store and the voting workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChallengeId, SubmissionId, UserId, VoteId};

/// Error returned when a stored status string does not name a known status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus {
    pub value: String,
}

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown status: {}", self.value)
    }
}

impl std::error::Error for UnknownStatus {}

/// Whether a challenge accepts new submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChallengeStatus {
    #[default]
    Active,
    Inactive,
}

impl ChallengeStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChallengeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChallengeStatus::Active),
            "inactive" => Ok(ChallengeStatus::Inactive),
            other => Err(UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// The status of a submission under community review.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Approved
///           └──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SubmissionStatus {
    /// Waiting for enough votes.
    #[default]
    Pending,

    /// Accepted by the community (terminal state).
    Approved,

    /// Refused by the community (terminal state).
    Rejected,
}

impl SubmissionStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Rejected)
    }

    /// Returns true if a submission in this state may move to `next`.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (
                SubmissionStatus::Pending,
                SubmissionStatus::Approved | SubmissionStatus::Rejected
            )
        )
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// A challenge users can complete for an experience reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    pub description: String,
    /// Experience points granted for an approved submission.
    pub reward: i64,
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Creates an active challenge.
    pub fn new(title: impl Into<String>, description: impl Into<String>, reward: i64) -> Self {
        Self {
            id: ChallengeId::new(),
            title: title.into(),
            description: description.into(),
            reward,
            status: ChallengeStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ChallengeStatus::Active
    }
}

/// A user's proof of completing a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub proof_url: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Creates a pending submission.
    pub fn new(challenge_id: ChallengeId, user_id: UserId, proof_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SubmissionId::new(),
            challenge_id,
            user_id,
            proof_url: proof_url.into(),
            status: SubmissionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending
    }
}

/// A single user's decision on a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub submission_id: SubmissionId,
    pub voter_id: UserId,
    pub approved: bool,
    /// How long the voter spent reviewing the proof.
    pub review_time_ms: i64,
    /// False when the review was too quick to be trusted; such votes are
    /// kept for audit but excluded from the decision.
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        submission_id: SubmissionId,
        voter_id: UserId,
        approved: bool,
        review_time_ms: i64,
        is_valid: bool,
    ) -> Self {
        Self {
            id: VoteId::new(),
            submission_id,
            voter_id,
            approved,
            review_time_ms,
            is_valid,
            created_at: Utc::now(),
        }
    }
}

/// One credit in the experience ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpEntry {
    pub id: Uuid,
    pub user_id: UserId,
    /// What kind of record produced the credit, e.g. `"challenge_submission"`.
    pub source_type: String,
    pub source_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl XpEntry {
    pub fn new(
        user_id: UserId,
        source_type: impl Into<String>,
        source_id: Uuid,
        amount: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            source_type: source_type.into(),
            source_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_transitions_only_leave_pending() {
        use SubmissionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(SubmissionStatus::Approved.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_text_round_trips_through_storage_form() {
        for status in [
            SubmissionStatus::Pending,
            SubmissionStatus::Approved,
            SubmissionStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<SubmissionStatus>(), Ok(status));
        }
        assert_eq!("inactive".parse::<ChallengeStatus>(), Ok(ChallengeStatus::Inactive));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "archived".parse::<SubmissionStatus>().unwrap_err();
        assert_eq!(err.value, "archived");
        assert_eq!(err.to_string(), "Unknown status: archived");
    }

    #[test]
    fn new_records_start_in_initial_state() {
        let challenge = Challenge::new("Run 5k", "Post a screenshot", 100);
        assert!(challenge.is_active());

        let submission = Submission::new(challenge.id, UserId::new(), "https://proof");
        assert!(submission.is_pending());
        assert_eq!(submission.created_at, submission.updated_at);
    }
}
