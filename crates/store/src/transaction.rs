//! Unit-of-work wrapper with guaranteed rollback.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::StoreError;
use crate::store::Transactional;

/// Failures of the transaction machinery itself, as opposed to failures of
/// the work running inside it.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The transaction could not be opened.
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] StoreError),

    /// The work succeeded but the commit did not; nothing was applied.
    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] StoreError),

    /// The work failed and undoing it failed too. Storage state is
    /// indeterminate until an operator checks it.
    #[error("Rollback failed after error '{cause}': {source}")]
    RollbackFailed {
        cause: String,
        #[source]
        source: StoreError,
    },
}

impl TransactionError {
    /// Returns true if storage may be left half-written.
    pub fn requires_operator_attention(&self) -> bool {
        matches!(self, TransactionError::RollbackFailed { .. })
    }
}

/// Runs units of work inside store transactions.
///
/// The manager holds no state between calls. The work closure receives the
/// open transaction handle and returns a boxed future borrowing it:
///
/// ```ignore
/// manager
///     .with_transaction(move |tx| {
///         Box::pin(async move {
///             store.create_challenge_tx(tx, &challenge).await?;
///             Ok::<_, MyError>(())
///         })
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct TransactionManager<S> {
    store: S,
}

impl<S: Transactional> TransactionManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `work` in a transaction, committing on `Ok` and rolling back on
    /// `Err` or panic. A panic is re-raised once the rollback has run.
    pub async fn with_transaction<E, F>(&self, work: F) -> Result<(), E>
    where
        E: From<TransactionError> + std::fmt::Display + Send + 'static,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<(), E>> + Send,
    {
        self.with_transaction_result(work).await
    }

    /// Like [`with_transaction`](Self::with_transaction), handing back the
    /// value produced inside the transaction once it has committed.
    pub async fn with_transaction_result<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<TransactionError> + std::fmt::Display + Send + 'static,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| E::from(TransactionError::Begin(e)))?;

        let outcome = AssertUnwindSafe(work(&mut tx)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                self.store.commit(tx).await.map_err(|e| {
                    metrics::counter!("store_transactions_failed_total", "stage" => "commit")
                        .increment(1);
                    E::from(TransactionError::Commit(e))
                })?;
                Ok(value)
            }
            Ok(Err(err)) => {
                metrics::counter!("store_transactions_rolled_back_total").increment(1);
                match self.store.rollback(tx).await {
                    Ok(()) => {
                        tracing::debug!(error = %err, "transaction rolled back");
                        Err(err)
                    }
                    Err(rollback_err) => {
                        metrics::counter!("store_transactions_failed_total", "stage" => "rollback")
                            .increment(1);
                        tracing::error!(
                            error = %err,
                            rollback_error = %rollback_err,
                            "rollback failed, storage state is indeterminate"
                        );
                        Err(E::from(TransactionError::RollbackFailed {
                            cause: err.to_string(),
                            source: rollback_err,
                        }))
                    }
                }
            }
            Err(panic) => {
                metrics::counter!("store_transactions_rolled_back_total").increment(1);
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(
                        rollback_error = %rollback_err,
                        "rollback after panic failed, storage state is indeterminate"
                    );
                } else {
                    tracing::warn!("transaction rolled back after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
