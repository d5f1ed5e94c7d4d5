//! Registry of sagas that are currently running.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::saga::Saga;
use crate::state::SagaState;

/// Identifier assigned to a saga while the manager runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time view of a running saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaSummary {
    pub id: SagaId,
    pub name: String,
    pub state: SagaState,
    pub executed_steps: usize,
    pub total_steps: usize,
}

type Registry = Arc<RwLock<HashMap<SagaId, Arc<Saga>>>>;

/// Tracks in-flight sagas so operators can list and stop them.
#[derive(Debug, Clone, Default)]
pub struct SagaManager {
    running: Registry,
}

/// Removes a saga from the registry when its run ends, including when the
/// run's future is dropped early.
struct Registration {
    running: Registry,
    id: SagaId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
        metrics::gauge!("saga_active").decrement(1.0);
    }
}

impl SagaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `saga`, executes it to the end, then forgets it.
    ///
    /// Returns the id the saga ran under alongside its result.
    pub async fn run(&self, saga: Saga) -> (SagaId, Result<()>) {
        let id = SagaId::new();
        let saga = Arc::new(saga);
        self.running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&saga));
        metrics::gauge!("saga_active").increment(1.0);
        let _registration = Registration {
            running: Arc::clone(&self.running),
            id,
        };

        tracing::info!(saga_id = %id, saga = saga.name(), "saga registered");
        let result = saga.execute().await;
        if let Err(err) = &result {
            tracing::warn!(saga_id = %id, saga = saga.name(), error = %err, "saga did not complete");
        }
        (id, result)
    }

    /// Lists running sagas with their progress.
    pub fn active(&self) -> Vec<SagaSummary> {
        let running = self.running.read().unwrap_or_else(|e| e.into_inner());
        running
            .iter()
            .map(|(id, saga)| SagaSummary {
                id: *id,
                name: saga.name().to_string(),
                state: saga.state(),
                executed_steps: saga.executed_steps(),
                total_steps: saga.total_steps(),
            })
            .collect()
    }

    /// Asks a running saga to stop before its next step. Returns false if no
    /// saga with that id is running.
    pub fn stop(&self, id: SagaId) -> bool {
        let running = self.running.read().unwrap_or_else(|e| e.into_inner());
        match running.get(&id) {
            Some(saga) => {
                saga.stop();
                tracing::info!(saga_id = %id, "saga stop requested");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.running.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
