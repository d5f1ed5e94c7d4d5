//! Reward granting on the caller's transaction.

use async_trait::async_trait;
use common::{UserId, XpEntry};
use store::{LedgerRepository, StoreError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Invalid reward amount: {0}")]
    InvalidAmount(i64),

    #[error("Ledger error: {0}")]
    Ledger(#[from] StoreError),
}

/// Credits experience points.
///
/// The grant is written through `tx`, so it commits or rolls back together
/// with whatever else the caller does in that transaction.
#[async_trait]
pub trait RewardGranter<Tx: Send + 'static>: Send + Sync {
    async fn grant_reward(
        &self,
        tx: &mut Tx,
        user_id: UserId,
        source_type: &str,
        source_id: Uuid,
        amount: i64,
    ) -> Result<(), RewardError>;
}

/// Grants rewards as entries in the store's experience ledger.
#[derive(Debug, Clone)]
pub struct LedgerRewardGranter<S> {
    store: S,
}

impl<S> LedgerRewardGranter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: LedgerRepository> RewardGranter<S::Tx> for LedgerRewardGranter<S> {
    async fn grant_reward(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        source_type: &str,
        source_id: Uuid,
        amount: i64,
    ) -> Result<(), RewardError> {
        if amount <= 0 {
            return Err(RewardError::InvalidAmount(amount));
        }
        let entry = XpEntry::new(user_id, source_type, source_id, amount);
        self.store.credit_tx(tx, &entry).await?;

        metrics::counter!("xp_granted_total").increment(amount.unsigned_abs());
        tracing::info!(%user_id, source_type, %source_id, amount, "reward granted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{MemoryStore, Transactional};

    #[tokio::test]
    async fn grant_is_visible_only_after_commit() {
        let store = MemoryStore::new();
        let granter = LedgerRewardGranter::new(store.clone());
        let user = UserId::new();

        let mut tx = store.begin().await.unwrap();
        granter
            .grant_reward(&mut tx, user, "challenge_submission", Uuid::new_v4(), 30)
            .await
            .unwrap();
        assert_eq!(store.xp_balance(user).await.unwrap(), 0);

        store.commit(tx).await.unwrap();
        assert_eq!(store.xp_balance(user).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_refused() {
        let store = MemoryStore::new();
        let granter = LedgerRewardGranter::new(store.clone());

        let mut tx = store.begin().await.unwrap();
        let err = granter
            .grant_reward(&mut tx, UserId::new(), "challenge_submission", Uuid::new_v4(), 0)
            .await
            .unwrap_err();
        store.rollback(tx).await.unwrap();

        assert!(matches!(err, RewardError::InvalidAmount(0)));
    }
}
