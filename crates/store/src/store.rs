use async_trait::async_trait;
use common::{
    Challenge, ChallengeId, ChallengeStatus, Submission, SubmissionId, SubmissionStatus, UserId,
    Vote, XpEntry,
};

use crate::Result;

/// A store that can group writes into a transaction.
///
/// Dropping a transaction without committing it discards its writes, the
/// same as an explicit rollback.
#[async_trait]
pub trait Transactional: Send + Sync {
    /// The handle passed to transactional repository methods.
    type Tx: Send + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Makes every write done through `tx` visible.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Discards every write done through `tx`.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

#[async_trait]
pub trait ChallengeRepository: Transactional {
    async fn create_challenge(&self, challenge: &Challenge) -> Result<()>;

    async fn create_challenge_tx(&self, tx: &mut Self::Tx, challenge: &Challenge) -> Result<()>;

    async fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>>;

    async fn get_challenge_tx(
        &self,
        tx: &mut Self::Tx,
        id: ChallengeId,
    ) -> Result<Option<Challenge>>;

    /// Lists all challenges, oldest first.
    async fn list_challenges(&self) -> Result<Vec<Challenge>>;

    /// Returns false if the challenge does not exist.
    async fn update_challenge_status(&self, id: ChallengeId, status: ChallengeStatus)
    -> Result<bool>;

    /// Returns false if the challenge does not exist.
    async fn delete_challenge(&self, id: ChallengeId) -> Result<bool>;
}

#[async_trait]
pub trait SubmissionRepository: Transactional {
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) if
    /// the user already submitted to the challenge.
    async fn create_submission(&self, submission: &Submission) -> Result<()>;

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>>;

    async fn get_submission_tx(
        &self,
        tx: &mut Self::Tx,
        id: SubmissionId,
    ) -> Result<Option<Submission>>;

    /// Finds the submission a user made to a challenge, if any.
    async fn find_submission(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<Option<Submission>>;

    async fn list_submissions_by_challenge(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Vec<Submission>>;

    /// Replaces a stored submission. Returns false if it does not exist.
    async fn update_submission(&self, submission: &Submission) -> Result<bool>;

    /// Moves a submission from `from` to `to` only if its stored status is
    /// still `from`. Returns false when another writer got there first.
    async fn transition_submission_tx(
        &self,
        tx: &mut Self::Tx,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<bool>;
}

#[async_trait]
pub trait VoteRepository: Transactional {
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) if
    /// the voter already voted on the submission.
    async fn create_vote(&self, vote: &Vote) -> Result<()>;

    /// Lists votes in arrival order.
    async fn list_votes_by_submission(&self, submission_id: SubmissionId) -> Result<Vec<Vote>>;

    async fn count_votes_by_submission(&self, submission_id: SubmissionId) -> Result<u64>;

    async fn has_user_voted(&self, submission_id: SubmissionId, voter_id: UserId) -> Result<bool>;
}

#[async_trait]
pub trait LedgerRepository: Transactional {
    async fn credit_tx(&self, tx: &mut Self::Tx, entry: &XpEntry) -> Result<()>;

    async fn xp_balance(&self, user_id: UserId) -> Result<i64>;

    async fn list_entries(&self, user_id: UserId) -> Result<Vec<XpEntry>>;
}

/// Everything the voting workflow needs from storage.
pub trait Store:
    ChallengeRepository + SubmissionRepository + VoteRepository + LedgerRepository + Clone + 'static
{
}

impl<T> Store for T where
    T: ChallengeRepository
        + SubmissionRepository
        + VoteRepository
        + LedgerRepository
        + Clone
        + 'static
{
}
