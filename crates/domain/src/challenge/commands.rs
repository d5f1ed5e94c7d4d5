//! Challenge workflow commands.

use common::{ChallengeId, SubmissionId, UserId};
use serde::Deserialize;

/// Command to publish a new challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChallenge {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Experience points credited for an approved submission.
    pub reward: i64,
}

impl CreateChallenge {
    pub fn new(title: impl Into<String>, description: impl Into<String>, reward: i64) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            reward,
        }
    }
}

/// Command to submit proof of completing a challenge.
#[derive(Debug, Clone)]
pub struct SubmitProof {
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub proof_url: String,
}

impl SubmitProof {
    pub fn new(challenge_id: ChallengeId, user_id: UserId, proof_url: impl Into<String>) -> Self {
        Self {
            challenge_id,
            user_id,
            proof_url: proof_url.into(),
        }
    }
}

/// Command to vote on a pending submission.
#[derive(Debug, Clone)]
pub struct CastVote {
    pub submission_id: SubmissionId,
    pub voter_id: UserId,
    pub approved: bool,
    /// Time the voter spent on the proof before deciding.
    pub review_time_ms: i64,
}

impl CastVote {
    pub fn new(
        submission_id: SubmissionId,
        voter_id: UserId,
        approved: bool,
        review_time_ms: i64,
    ) -> Self {
        Self {
            submission_id,
            voter_id,
            approved,
            review_time_ms,
        }
    }

    pub fn approve(submission_id: SubmissionId, voter_id: UserId, review_time_ms: i64) -> Self {
        Self::new(submission_id, voter_id, true, review_time_ms)
    }

    pub fn reject(submission_id: SubmissionId, voter_id: UserId, review_time_ms: i64) -> Self {
        Self::new(submission_id, voter_id, false, review_time_ms)
    }
}
