//! Per-submission mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::SubmissionId;
use tokio::sync::OwnedMutexGuard;

type Table = Arc<Mutex<HashMap<SubmissionId, Arc<tokio::sync::Mutex<()>>>>>;

/// In-memory lock table keyed by submission.
///
/// Entries exist only while some task holds or waits for them.
#[derive(Debug, Clone, Default)]
pub struct SubmissionLocks {
    table: Table,
}

/// Holds a submission's lock until dropped.
#[derive(Debug)]
pub struct SubmissionGuard {
    id: SubmissionId,
    table: Table,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds the lock for `id`, then takes it.
    pub async fn acquire(&self, id: SubmissionId) -> SubmissionGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(id).or_default())
        };
        let guard = lock.lock_owned().await;
        SubmissionGuard {
            id,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Number of submissions currently locked or waited on.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table's own reference left: nobody holds or awaits it.
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}
