//! The decide-and-transition step.

use std::sync::Arc;

use common::{Submission, SubmissionId, SubmissionStatus};
use event_bus::EventBus;
use serde::Serialize;
use store::{Store, TransactionManager};

use super::events::{ChallengeApprovedData, ChallengeEvent, ChallengeRejectedData};
use super::locks::SubmissionLocks;
use super::tally::{Decision, Tally};
use crate::error::{ChallengeError, Result};
use crate::reward::RewardGranter;

/// `source_type` of ledger entries granted for approved submissions.
pub const REWARD_SOURCE_TYPE: &str = "challenge_submission";

/// Result of one re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Not enough votes yet.
    Pending,
    /// Someone else already moved the submission to a terminal state.
    AlreadyDecided,
    Approved,
    Rejected,
}

/// Decides submissions once enough votes are in.
///
/// Two guards keep the terminal transition and the reward to at most one
/// per submission: re-evaluations of the same submission are serialized by
/// [`SubmissionLocks`], and the status change itself is a conditional
/// update from `Pending` that a second writer cannot win.
pub struct ApprovalEngine<S: Store> {
    store: S,
    transactions: TransactionManager<S>,
    rewards: Arc<dyn RewardGranter<S::Tx>>,
    bus: EventBus,
    locks: SubmissionLocks,
    min_votes_required: u64,
}

impl<S: Store> Clone for ApprovalEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transactions: self.transactions.clone(),
            rewards: Arc::clone(&self.rewards),
            bus: self.bus.clone(),
            locks: self.locks.clone(),
            min_votes_required: self.min_votes_required,
        }
    }
}

impl<S: Store> ApprovalEngine<S> {
    pub fn new(
        store: S,
        rewards: Arc<dyn RewardGranter<S::Tx>>,
        bus: EventBus,
        min_votes_required: u64,
    ) -> Self {
        Self {
            transactions: TransactionManager::new(store.clone()),
            store,
            rewards,
            bus,
            locks: SubmissionLocks::new(),
            min_votes_required,
        }
    }

    pub fn locks(&self) -> &SubmissionLocks {
        &self.locks
    }

    /// Counts the submission's votes and, past the threshold, approves or
    /// rejects it.
    #[tracing::instrument(skip(self))]
    pub async fn re_evaluate(&self, submission_id: SubmissionId) -> Result<Outcome> {
        let _guard = self.locks.acquire(submission_id).await;

        let submission = self
            .store
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| ChallengeError::not_found("submission", submission_id))?;
        if submission.status.is_terminal() {
            tracing::debug!(status = %submission.status, "submission already decided");
            return Ok(Outcome::AlreadyDecided);
        }

        let total = self.store.count_votes_by_submission(submission_id).await?;
        if total < self.min_votes_required {
            tracing::debug!(total, required = self.min_votes_required, "waiting for votes");
            return Ok(Outcome::Pending);
        }

        let votes = self.store.list_votes_by_submission(submission_id).await?;
        let tally = Tally::from_votes(&votes);
        match tally.decide(self.min_votes_required) {
            None => Ok(Outcome::Pending),
            Some(Decision::Approve) => self.approve(&submission).await,
            Some(Decision::Reject) => {
                let reason = format!(
                    "{} valid approvals did not outnumber {} valid rejections ({} invalid votes ignored)",
                    tally.valid_positive, tally.valid_negative, tally.invalid
                );
                self.reject(&submission, reason).await
            }
        }
    }

    /// Marks the submission approved, credits the challenge reward and
    /// announces it, all in one transaction.
    async fn approve(&self, submission: &Submission) -> Result<Outcome> {
        let store = self.store.clone();
        let rewards = Arc::clone(&self.rewards);
        let bus = self.bus.clone();
        let id = submission.id;
        let challenge_id = submission.challenge_id;
        let user_id = submission.user_id;

        let applied = self
            .transactions
            .with_transaction_result(move |tx| {
                Box::pin(async move {
                    let challenge = store
                        .get_challenge_tx(tx, challenge_id)
                        .await?
                        .ok_or_else(|| ChallengeError::not_found("challenge", challenge_id))?;

                    let moved = store
                        .transition_submission_tx(
                            tx,
                            id,
                            SubmissionStatus::Pending,
                            SubmissionStatus::Approved,
                        )
                        .await?;
                    if !moved {
                        return Ok::<_, ChallengeError>(false);
                    }

                    rewards
                        .grant_reward(
                            tx,
                            user_id,
                            REWARD_SOURCE_TYPE,
                            id.as_uuid(),
                            challenge.reward,
                        )
                        .await?;

                    let event = ChallengeEvent::Approved(ChallengeApprovedData {
                        submission_id: id,
                        challenge_id,
                        user_id,
                        reward: challenge.reward,
                    })
                    .to_event()?;
                    bus.publish_with_tx(tx, event).await;
                    Ok(true)
                })
            })
            .await?;

        if !applied {
            tracing::info!(submission_id = %id, "lost the race to decide, nothing granted");
            return Ok(Outcome::AlreadyDecided);
        }
        metrics::counter!("challenge_submissions_decided_total", "decision" => "approved")
            .increment(1);
        tracing::info!(submission_id = %id, %user_id, "submission approved");
        Ok(Outcome::Approved)
    }

    async fn reject(&self, submission: &Submission, reason: String) -> Result<Outcome> {
        let store = self.store.clone();
        let bus = self.bus.clone();
        let id = submission.id;
        let challenge_id = submission.challenge_id;
        let user_id = submission.user_id;

        let applied = self
            .transactions
            .with_transaction_result(move |tx| {
                Box::pin(async move {
                    let moved = store
                        .transition_submission_tx(
                            tx,
                            id,
                            SubmissionStatus::Pending,
                            SubmissionStatus::Rejected,
                        )
                        .await?;
                    if !moved {
                        return Ok::<_, ChallengeError>(false);
                    }

                    let event = ChallengeEvent::Rejected(ChallengeRejectedData {
                        submission_id: id,
                        challenge_id,
                        user_id,
                        reason,
                    })
                    .to_event()?;
                    bus.publish_with_tx(tx, event).await;
                    Ok(true)
                })
            })
            .await?;

        if !applied {
            return Ok(Outcome::AlreadyDecided);
        }
        metrics::counter!("challenge_submissions_decided_total", "decision" => "rejected")
            .increment(1);
        tracing::info!(submission_id = %id, %user_id, "submission rejected");
        Ok(Outcome::Rejected)
    }
}
