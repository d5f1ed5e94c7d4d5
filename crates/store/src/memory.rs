use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Challenge, ChallengeId, ChallengeStatus, Submission, SubmissionId, SubmissionStatus, UserId,
    Vote, XpEntry,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::store::{
    ChallengeRepository, LedgerRepository, SubmissionRepository, Transactional, VoteRepository,
};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    challenges: HashMap<ChallengeId, Challenge>,
    submissions: HashMap<SubmissionId, Submission>,
    votes: Vec<Vote>,
    ledger: Vec<XpEntry>,
}

impl Tables {
    fn insert_challenge(&mut self, challenge: &Challenge) -> Result<()> {
        if self.challenges.contains_key(&challenge.id) {
            return Err(StoreError::Duplicate {
                entity: "challenge",
                key: challenge.id.to_string(),
            });
        }
        self.challenges.insert(challenge.id, challenge.clone());
        Ok(())
    }

    fn insert_submission(&mut self, submission: &Submission) -> Result<()> {
        let taken = self.submissions.values().any(|s| {
            s.id == submission.id
                || (s.challenge_id == submission.challenge_id && s.user_id == submission.user_id)
        });
        if taken {
            return Err(StoreError::Duplicate {
                entity: "submission",
                key: format!("{}/{}", submission.challenge_id, submission.user_id),
            });
        }
        self.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    fn insert_vote(&mut self, vote: &Vote) -> Result<()> {
        let taken = self.votes.iter().any(|v| {
            v.id == vote.id
                || (v.submission_id == vote.submission_id && v.voter_id == vote.voter_id)
        });
        if taken {
            return Err(StoreError::Duplicate {
                entity: "vote",
                key: format!("{}/{}", vote.submission_id, vote.voter_id),
            });
        }
        self.votes.push(vote.clone());
        Ok(())
    }

    fn insert_credit(&mut self, entry: &XpEntry) -> Result<()> {
        let taken = self.ledger.iter().any(|e| {
            e.id == entry.id
                || (e.source_type == entry.source_type && e.source_id == entry.source_id)
        });
        if taken {
            return Err(StoreError::Duplicate {
                entity: "xp_ledger",
                key: format!("{}/{}", entry.source_type, entry.source_id),
            });
        }
        self.ledger.push(entry.clone());
        Ok(())
    }

    fn transition_submission(
        &mut self,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> bool {
        match self.submissions.get_mut(&id) {
            Some(submission) if submission.status == from => {
                submission.status = to;
                submission.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct FailureHooks {
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
}

/// In-memory store for tests and single-process runs without a database.
///
/// Writers are serialized: a transaction holds the writer lock from
/// `begin` until it commits or rolls back, working on a private copy of the
/// tables that replaces the shared copy on commit. Non-transactional writes
/// take the same lock for their own duration, so calling one from inside an
/// open transaction on the same task deadlocks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    hooks: Arc<FailureHooks>,
}

/// Transaction handle for [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    tables: Tables,
    _writer: OwnedMutexGuard<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail, discarding the transaction.
    pub fn fail_next_commit(&self) {
        self.hooks.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Makes the next rollback report a failure.
    pub fn fail_next_rollback(&self) {
        self.hooks.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// Returns the number of ledger entries across all users.
    pub async fn ledger_len(&self) -> usize {
        self.tables.read().await.ledger.len()
    }

    async fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T> + Send) -> Result<T> {
        let _writer = self.writer.lock().await;
        let mut tables = self.tables.write().await;
        f(&mut tables)
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tables = self.tables.read().await.clone();
        Ok(MemoryTx {
            tables,
            _writer: guard,
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        if self.hooks.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        let MemoryTx { tables, _writer } = tx;
        *self.tables.write().await = tables;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        if self.hooks.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected rollback failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeRepository for MemoryStore {
    async fn create_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.write(|t| t.insert_challenge(challenge)).await
    }

    async fn create_challenge_tx(&self, tx: &mut MemoryTx, challenge: &Challenge) -> Result<()> {
        tx.tables.insert_challenge(challenge)
    }

    async fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>> {
        Ok(self.tables.read().await.challenges.get(&id).cloned())
    }

    async fn get_challenge_tx(
        &self,
        tx: &mut MemoryTx,
        id: ChallengeId,
    ) -> Result<Option<Challenge>> {
        Ok(tx.tables.challenges.get(&id).cloned())
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        let tables = self.tables.read().await;
        let mut challenges: Vec<_> = tables.challenges.values().cloned().collect();
        challenges.sort_by_key(|c| c.created_at);
        Ok(challenges)
    }

    async fn update_challenge_status(
        &self,
        id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<bool> {
        self.write(|t| match t.challenges.get_mut(&id) {
            Some(challenge) => {
                challenge.status = status;
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn delete_challenge(&self, id: ChallengeId) -> Result<bool> {
        self.write(|t| Ok(t.challenges.remove(&id).is_some())).await
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStore {
    async fn create_submission(&self, submission: &Submission) -> Result<()> {
        self.write(|t| t.insert_submission(submission)).await
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn get_submission_tx(
        &self,
        tx: &mut MemoryTx,
        id: SubmissionId,
    ) -> Result<Option<Submission>> {
        Ok(tx.tables.submissions.get(&id).cloned())
    }

    async fn find_submission(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<Option<Submission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .find(|s| s.user_id == user_id && s.challenge_id == challenge_id)
            .cloned())
    }

    async fn list_submissions_by_challenge(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Vec<Submission>> {
        let tables = self.tables.read().await;
        let mut submissions: Vec<_> = tables
            .submissions
            .values()
            .filter(|s| s.challenge_id == challenge_id)
            .cloned()
            .collect();
        submissions.sort_by_key(|s| s.created_at);
        Ok(submissions)
    }

    async fn update_submission(&self, submission: &Submission) -> Result<bool> {
        self.write(|t| match t.submissions.get_mut(&submission.id) {
            Some(stored) => {
                *stored = submission.clone();
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn transition_submission_tx(
        &self,
        tx: &mut MemoryTx,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<bool> {
        Ok(tx.tables.transition_submission(id, from, to))
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn create_vote(&self, vote: &Vote) -> Result<()> {
        self.write(|t| t.insert_vote(vote)).await
    }

    async fn list_votes_by_submission(&self, submission_id: SubmissionId) -> Result<Vec<Vote>> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn count_votes_by_submission(&self, submission_id: SubmissionId) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.submission_id == submission_id)
            .count() as u64)
    }

    async fn has_user_voted(&self, submission_id: SubmissionId, voter_id: UserId) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .any(|v| v.submission_id == submission_id && v.voter_id == voter_id))
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn credit_tx(&self, tx: &mut MemoryTx, entry: &XpEntry) -> Result<()> {
        tx.tables.insert_credit(entry)
    }

    async fn xp_balance(&self, user_id: UserId) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.amount)
            .sum())
    }

    async fn list_entries(&self, user_id: UserId) -> Result<Vec<XpEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
