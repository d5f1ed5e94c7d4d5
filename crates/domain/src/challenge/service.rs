//! Challenge service providing the workflow's public API.

use std::sync::Arc;

use common::{
    Challenge, ChallengeId, ChallengeStatus, Submission, SubmissionId, UserId, Vote,
};
use event_bus::EventBus;
use saga::{Saga, SagaManager, SagaStep, StepError};
use store::Store;

use super::approval::ApprovalEngine;
use super::commands::{CastVote, CreateChallenge, SubmitProof};
use super::events::{
    ChallengeCreatedData, ChallengeEvent, ChallengeSubmittedData, ChallengeVoteAddedData,
};
use super::queue::ReEvaluationQueue;
use super::tally::Tally;
use crate::config::ChallengeConfig;
use crate::error::{ChallengeError, Result};
use crate::reward::{LedgerRewardGranter, RewardGranter};

/// Service for challenges, submissions and votes.
///
/// Votes are recorded synchronously; deciding a submission happens on the
/// re-evaluation workers once enough votes are in.
pub struct ChallengeService<S: Store> {
    store: S,
    bus: EventBus,
    sagas: SagaManager,
    engine: ApprovalEngine<S>,
    queue: Arc<ReEvaluationQueue>,
    config: ChallengeConfig,
}

impl<S: Store> Clone for ChallengeService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
            sagas: self.sagas.clone(),
            engine: self.engine.clone(),
            queue: Arc::clone(&self.queue),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> ChallengeService<S> {
    /// Creates the service and starts its re-evaluation workers. Must be
    /// called from within a Tokio runtime.
    pub fn new(
        store: S,
        bus: EventBus,
        sagas: SagaManager,
        rewards: Arc<dyn RewardGranter<S::Tx>>,
        config: ChallengeConfig,
    ) -> Self {
        let engine = ApprovalEngine::new(
            store.clone(),
            rewards,
            bus.clone(),
            config.min_votes_required,
        );
        let queue = Arc::new(ReEvaluationQueue::start(engine.clone(), &config));
        Self {
            store,
            bus,
            sagas,
            engine,
            queue,
            config,
        }
    }

    /// Like [`new`](Self::new), crediting rewards to the store's own ledger.
    pub fn with_ledger_rewards(
        store: S,
        bus: EventBus,
        sagas: SagaManager,
        config: ChallengeConfig,
    ) -> Self {
        let rewards: Arc<dyn RewardGranter<S::Tx>> =
            Arc::new(LedgerRewardGranter::new(store.clone()));
        Self::new(store, bus, sagas, rewards, config)
    }

    pub fn engine(&self) -> &ApprovalEngine<S> {
        &self.engine
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn sagas(&self) -> &SagaManager {
        &self.sagas
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    /// Stops taking re-evaluations and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    async fn publish(&self, event: ChallengeEvent) -> Result<()> {
        let event = event.to_event()?;
        self.bus.publish(event).await;
        Ok(())
    }

    /// Creates an active challenge and announces it.
    ///
    /// Runs as a saga: if the announcement cannot be made, the stored
    /// challenge is deleted again.
    #[tracing::instrument(skip(self, cmd), fields(title = %cmd.title))]
    pub async fn create_challenge(&self, cmd: CreateChallenge) -> Result<Challenge> {
        let title = cmd.title.trim();
        if title.is_empty() {
            return Err(ChallengeError::validation("title must not be empty"));
        }
        if cmd.reward <= 0 {
            return Err(ChallengeError::validation("reward must be positive"));
        }

        let challenge = Challenge::new(title, cmd.description.trim(), cmd.reward);
        let announcement = ChallengeEvent::Created(ChallengeCreatedData {
            challenge_id: challenge.id,
            title: challenge.title.clone(),
            reward: challenge.reward,
        })
        .to_event()?;

        let store = self.store.clone();
        let undo_store = self.store.clone();
        let bus = self.bus.clone();
        let stored = challenge.clone();
        let id = challenge.id;

        let saga = Saga::builder("create_challenge")
            .step(
                SagaStep::builder("store_challenge")
                    .description("Persist the new challenge")
                    .execute(move || {
                        let store = store.clone();
                        let challenge = stored.clone();
                        async move {
                            store.create_challenge(&challenge).await?;
                            Ok::<(), StepError>(())
                        }
                    })
                    .compensate(move || {
                        let store = undo_store.clone();
                        async move {
                            store.delete_challenge(id).await?;
                            Ok::<(), StepError>(())
                        }
                    })
                    .build()?,
            )
            .step(
                SagaStep::builder("announce_challenge")
                    .description("Publish ChallengeCreated")
                    .execute(move || {
                        let bus = bus.clone();
                        let event = announcement.clone();
                        async move {
                            if bus.is_closed() {
                                return Err::<(), StepError>("event bus is shut down".into());
                            }
                            bus.publish(event).await;
                            Ok(())
                        }
                    })
                    .build()?,
            )
            .build()?;

        let (saga_id, result) = self.sagas.run(saga).await;
        result?;

        metrics::counter!("challenges_created_total").increment(1);
        tracing::info!(challenge_id = %challenge.id, %saga_id, "challenge created");
        Ok(challenge)
    }

    /// Takes a challenge out of circulation. Existing submissions are kept.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_challenge(&self, id: ChallengeId) -> Result<Challenge> {
        let updated = self
            .store
            .update_challenge_status(id, ChallengeStatus::Inactive)
            .await?;
        if !updated {
            return Err(ChallengeError::not_found("challenge", id));
        }
        tracing::info!(challenge_id = %id, "challenge deactivated");
        self.get_challenge(id).await
    }

    /// Records a user's proof for a challenge as a pending submission.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self, cmd: SubmitProof) -> Result<Submission> {
        let proof_url = cmd.proof_url.trim();
        if proof_url.is_empty() {
            return Err(ChallengeError::validation("proof URL is required"));
        }

        let challenge = self.get_challenge(cmd.challenge_id).await?;
        if !challenge.is_active() {
            return Err(ChallengeError::conflict("challenge is not active"));
        }
        if self
            .store
            .find_submission(cmd.user_id, cmd.challenge_id)
            .await?
            .is_some()
        {
            return Err(ChallengeError::conflict(
                "user already submitted proof for this challenge",
            ));
        }

        let submission = Submission::new(cmd.challenge_id, cmd.user_id, proof_url);
        match self.store.create_submission(&submission).await {
            Err(err) if err.is_duplicate() => {
                return Err(ChallengeError::conflict(
                    "user already submitted proof for this challenge",
                ));
            }
            other => other?,
        }

        self.publish(ChallengeEvent::Submitted(ChallengeSubmittedData {
            submission_id: submission.id,
            challenge_id: submission.challenge_id,
            user_id: submission.user_id,
        }))
        .await?;

        metrics::counter!("challenge_submissions_total").increment(1);
        tracing::info!(submission_id = %submission.id, "submission created");
        Ok(submission)
    }

    /// Records a vote and schedules a re-evaluation of the submission.
    ///
    /// The pending check and the insert run under the submission's lock, so
    /// a vote cannot land on a submission that a re-evaluation has decided
    /// in between.
    #[tracing::instrument(skip(self))]
    pub async fn vote(&self, cmd: CastVote) -> Result<Vote> {
        if cmd.review_time_ms < 0 {
            return Err(ChallengeError::validation(
                "review time must not be negative",
            ));
        }
        if self.queue.is_closed() {
            return Err(ChallengeError::QueueClosed);
        }

        let vote = {
            let _guard = self.engine.locks().acquire(cmd.submission_id).await;
            self.record_vote(&cmd).await?
        };

        metrics::counter!(
            "challenge_votes_total",
            "valid" => if vote.is_valid { "true" } else { "false" }
        )
        .increment(1);
        self.publish(ChallengeEvent::VoteAdded(ChallengeVoteAddedData {
            vote_id: vote.id,
            submission_id: vote.submission_id,
            voter_id: vote.voter_id,
            approved: vote.approved,
            is_valid: vote.is_valid,
        }))
        .await?;

        // The vote is stored; losing the re-evaluation only delays the
        // decision until the next vote.
        if let Err(err) = self.queue.enqueue(vote.submission_id).await {
            metrics::counter!("challenge_reevaluations_dropped_total").increment(1);
            tracing::warn!(submission_id = %vote.submission_id, error = %err, "vote stored but not queued for re-evaluation");
        }
        Ok(vote)
    }

    /// Checks and inserts one vote. Callers hold the submission's lock.
    async fn record_vote(&self, cmd: &CastVote) -> Result<Vote> {
        let submission = self.get_submission(cmd.submission_id).await?;
        if !submission.is_pending() {
            return Err(ChallengeError::conflict("submission is no longer pending"));
        }
        if submission.user_id == cmd.voter_id {
            return Err(ChallengeError::conflict(
                "cannot vote on your own submission",
            ));
        }
        if self
            .store
            .has_user_voted(cmd.submission_id, cmd.voter_id)
            .await?
        {
            return Err(ChallengeError::conflict(
                "user already voted on this submission",
            ));
        }

        let is_valid = cmd.review_time_ms >= self.config.min_review_time_ms();
        let vote = Vote::new(
            cmd.submission_id,
            cmd.voter_id,
            cmd.approved,
            cmd.review_time_ms,
            is_valid,
        );
        match self.store.create_vote(&vote).await {
            Err(err) if err.is_duplicate() => Err(ChallengeError::conflict(
                "user already voted on this submission",
            )),
            other => {
                other?;
                Ok(vote)
            }
        }
    }

    pub async fn get_challenge(&self, id: ChallengeId) -> Result<Challenge> {
        self.store
            .get_challenge(id)
            .await?
            .ok_or_else(|| ChallengeError::not_found("challenge", id))
    }

    pub async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        Ok(self.store.list_challenges().await?)
    }

    pub async fn get_submission(&self, id: SubmissionId) -> Result<Submission> {
        self.store
            .get_submission(id)
            .await?
            .ok_or_else(|| ChallengeError::not_found("submission", id))
    }

    pub async fn list_submissions(&self, challenge_id: ChallengeId) -> Result<Vec<Submission>> {
        self.get_challenge(challenge_id).await?;
        Ok(self.store.list_submissions_by_challenge(challenge_id).await?)
    }

    pub async fn list_votes(&self, submission_id: SubmissionId) -> Result<Vec<Vote>> {
        self.get_submission(submission_id).await?;
        Ok(self.store.list_votes_by_submission(submission_id).await?)
    }

    /// Current vote counts for a submission.
    pub async fn tally(&self, submission_id: SubmissionId) -> Result<Tally> {
        let votes = self.list_votes(submission_id).await?;
        Ok(Tally::from_votes(&votes))
    }

    pub async fn xp_balance(&self, user_id: UserId) -> Result<i64> {
        Ok(self.store.xp_balance(user_id).await?)
    }
}
