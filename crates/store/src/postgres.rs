use async_trait::async_trait;
use common::{
    Challenge, ChallengeId, ChallengeStatus, Submission, SubmissionId, SubmissionStatus, UserId,
    Vote, VoteId, XpEntry,
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::schema::{ModelSchema, SchemaRegistry};
use crate::store::{
    ChallengeRepository, LedgerRepository, SubmissionRepository, Transactional, VoteRepository,
};
use crate::{Result, StoreError};

/// Tables owned by the challenge workflow.
pub const CHALLENGE_MODELS: &[ModelSchema] = &[
    ModelSchema {
        name: "challenges",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS challenges (
            id          UUID PRIMARY KEY,
            title       TEXT NOT NULL,
            description TEXT NOT NULL,
            reward      BIGINT NOT NULL CHECK (reward > 0),
            status      TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL
        )
        "#,
    },
    ModelSchema {
        name: "submissions",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id           UUID PRIMARY KEY,
            challenge_id UUID NOT NULL REFERENCES challenges (id),
            user_id      UUID NOT NULL,
            proof_url    TEXT NOT NULL,
            status       TEXT NOT NULL,
            created_at   TIMESTAMPTZ NOT NULL,
            updated_at   TIMESTAMPTZ NOT NULL,
            CONSTRAINT submissions_challenge_user_key UNIQUE (challenge_id, user_id)
        )
        "#,
    },
    ModelSchema {
        name: "votes",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS votes (
            id             UUID PRIMARY KEY,
            submission_id  UUID NOT NULL REFERENCES submissions (id),
            voter_id       UUID NOT NULL,
            approved       BOOLEAN NOT NULL,
            review_time_ms BIGINT NOT NULL,
            is_valid       BOOLEAN NOT NULL,
            created_at     TIMESTAMPTZ NOT NULL,
            CONSTRAINT votes_submission_voter_key UNIQUE (submission_id, voter_id)
        )
        "#,
    },
];

/// The experience ledger.
pub const LEDGER_MODELS: &[ModelSchema] = &[ModelSchema {
    name: "xp_ledger",
    ddl: r#"
    CREATE TABLE IF NOT EXISTS xp_ledger (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL,
        source_type TEXT NOT NULL,
        source_id   UUID NOT NULL,
        amount      BIGINT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        CONSTRAINT xp_ledger_source_key UNIQUE (source_type, source_id)
    );
    CREATE INDEX IF NOT EXISTS xp_ledger_user_idx ON xp_ledger (user_id);
    "#,
}];

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a small pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates every registered table, in order, in one transaction.
    pub async fn bootstrap(&self, registry: &SchemaRegistry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for model in registry.models() {
            sqlx::raw_sql(model.ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Schema(format!("{}: {e}", model.name)))?;
            tracing::debug!(model = model.name, "schema ready");
        }
        tx.commit().await?;
        tracing::info!(models = registry.models().len(), "schema bootstrap complete");
        Ok(())
    }

    fn row_to_challenge(row: PgRow) -> Result<Challenge> {
        Ok(Challenge {
            id: ChallengeId::from_uuid(row.try_get::<Uuid, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            reward: row.try_get("reward")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_submission(row: PgRow) -> Result<Submission> {
        Ok(Submission {
            id: SubmissionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            challenge_id: ChallengeId::from_uuid(row.try_get::<Uuid, _>("challenge_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            proof_url: row.try_get("proof_url")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_vote(row: PgRow) -> Result<Vote> {
        Ok(Vote {
            id: VoteId::from_uuid(row.try_get::<Uuid, _>("id")?),
            submission_id: SubmissionId::from_uuid(row.try_get::<Uuid, _>("submission_id")?),
            voter_id: UserId::from_uuid(row.try_get::<Uuid, _>("voter_id")?),
            approved: row.try_get("approved")?,
            review_time_ms: row.try_get("review_time_ms")?,
            is_valid: row.try_get("is_valid")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<XpEntry> {
        Ok(XpEntry {
            id: row.try_get("id")?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            source_type: row.try_get("source_type")?,
            source_id: row.try_get("source_id")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Maps a unique-key violation to [`StoreError::Duplicate`].
fn map_unique(err: sqlx::Error, entity: &'static str, key: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate { entity, key };
    }
    StoreError::Database(err)
}

const INSERT_CHALLENGE: &str = r#"
    INSERT INTO challenges (id, title, description, reward, status, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

const SELECT_CHALLENGE: &str = r#"
    SELECT id, title, description, reward, status, created_at
    FROM challenges
    WHERE id = $1
"#;

const SELECT_SUBMISSION: &str = r#"
    SELECT id, challenge_id, user_id, proof_url, status, created_at, updated_at
    FROM submissions
    WHERE id = $1
"#;

fn bind_challenge<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    challenge: &'q Challenge,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(challenge.id.as_uuid())
        .bind(&challenge.title)
        .bind(&challenge.description)
        .bind(challenge.reward)
        .bind(challenge.status.as_str())
        .bind(challenge.created_at)
}

#[async_trait]
impl Transactional for PgStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.rollback().await?)
    }
}

#[async_trait]
impl ChallengeRepository for PgStore {
    async fn create_challenge(&self, challenge: &Challenge) -> Result<()> {
        bind_challenge(sqlx::query(INSERT_CHALLENGE), challenge)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, "challenge", challenge.id.to_string()))?;
        Ok(())
    }

    async fn create_challenge_tx(&self, tx: &mut Self::Tx, challenge: &Challenge) -> Result<()> {
        bind_challenge(sqlx::query(INSERT_CHALLENGE), challenge)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_unique(e, "challenge", challenge.id.to_string()))?;
        Ok(())
    }

    async fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>> {
        sqlx::query(SELECT_CHALLENGE)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_challenge)
            .transpose()
    }

    async fn get_challenge_tx(
        &self,
        tx: &mut Self::Tx,
        id: ChallengeId,
    ) -> Result<Option<Challenge>> {
        sqlx::query(SELECT_CHALLENGE)
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .map(Self::row_to_challenge)
            .transpose()
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, reward, status, created_at
            FROM challenges
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_challenge).collect()
    }

    async fn update_challenge_status(
        &self,
        id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE challenges SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_challenge(&self, id: ChallengeId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM challenges WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl SubmissionRepository for PgStore {
    async fn create_submission(&self, submission: &Submission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO submissions (id, challenge_id, user_id, proof_url, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(submission.id.as_uuid())
        .bind(submission.challenge_id.as_uuid())
        .bind(submission.user_id.as_uuid())
        .bind(&submission.proof_url)
        .bind(submission.status.as_str())
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "submission",
                format!("{}/{}", submission.challenge_id, submission.user_id),
            )
        })?;
        Ok(())
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        sqlx::query(SELECT_SUBMISSION)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_submission)
            .transpose()
    }

    async fn get_submission_tx(
        &self,
        tx: &mut Self::Tx,
        id: SubmissionId,
    ) -> Result<Option<Submission>> {
        sqlx::query(SELECT_SUBMISSION)
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .map(Self::row_to_submission)
            .transpose()
    }

    async fn find_submission(
        &self,
        user_id: UserId,
        challenge_id: ChallengeId,
    ) -> Result<Option<Submission>> {
        sqlx::query(
            r#"
            SELECT id, challenge_id, user_id, proof_url, status, created_at, updated_at
            FROM submissions
            WHERE user_id = $1 AND challenge_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(challenge_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_submission)
        .transpose()
    }

    async fn list_submissions_by_challenge(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Vec<Submission>> {
        let rows = sqlx::query(
            r#"
            SELECT id, challenge_id, user_id, proof_url, status, created_at, updated_at
            FROM submissions
            WHERE challenge_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(challenge_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_submission).collect()
    }

    async fn update_submission(&self, submission: &Submission) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET proof_url = $2, status = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(submission.id.as_uuid())
        .bind(&submission.proof_url)
        .bind(submission.status.as_str())
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition_submission_tx(
        &self,
        tx: &mut Self::Tx,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn create_vote(&self, vote: &Vote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (id, submission_id, voter_id, approved, review_time_ms, is_valid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(vote.id.as_uuid())
        .bind(vote.submission_id.as_uuid())
        .bind(vote.voter_id.as_uuid())
        .bind(vote.approved)
        .bind(vote.review_time_ms)
        .bind(vote.is_valid)
        .bind(vote.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "vote",
                format!("{}/{}", vote.submission_id, vote.voter_id),
            )
        })?;
        Ok(())
    }

    async fn list_votes_by_submission(&self, submission_id: SubmissionId) -> Result<Vec<Vote>> {
        let rows = sqlx::query(
            r#"
            SELECT id, submission_id, voter_id, approved, review_time_ms, is_valid, created_at
            FROM votes
            WHERE submission_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(submission_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_vote).collect()
    }

    async fn count_votes_by_submission(&self, submission_id: SubmissionId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE submission_id = $1")
            .bind(submission_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn has_user_voted(&self, submission_id: SubmissionId, voter_id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM votes WHERE submission_id = $1 AND voter_id = $2)",
        )
        .bind(submission_id.as_uuid())
        .bind(voter_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn credit_tx(&self, tx: &mut Self::Tx, entry: &XpEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO xp_ledger (id, user_id, source_type, source_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id.as_uuid())
        .bind(&entry.source_type)
        .bind(entry.source_id)
        .bind(entry.amount)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "xp_ledger",
                format!("{}/{}", entry.source_type, entry.source_id),
            )
        })?;
        Ok(())
    }

    async fn xp_balance(&self, user_id: UserId) -> Result<i64> {
        let balance: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_ledger WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn list_entries(&self, user_id: UserId) -> Result<Vec<XpEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, source_type, source_id, amount, created_at
            FROM xp_ledger
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
