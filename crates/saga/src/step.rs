//! Saga steps and their builder.

use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::{Result, SagaError};

/// Error returned by a step's action.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

type Action = Box<dyn Fn() -> BoxFuture<'static, std::result::Result<(), StepError>> + Send + Sync>;

fn boxed_action<F, Fut>(f: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), StepError>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

/// One unit of a saga: an action and, optionally, the action that undoes it.
///
/// Steps are never interrupted once started. A step that must tolerate
/// cancellation or retries has to be idempotent.
pub struct SagaStep {
    name: String,
    description: String,
    execute: Action,
    compensate: Option<Action>,
}

impl SagaStep {
    pub fn builder(name: impl Into<String>) -> SagaStepBuilder {
        SagaStepBuilder {
            name: name.into(),
            description: String::new(),
            execute: None,
            compensate: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    pub(crate) async fn run(&self) -> std::result::Result<(), StepError> {
        (self.execute)().await
    }

    /// Runs the compensation. `None` if the step has nothing to undo.
    pub(crate) async fn undo(&self) -> Option<std::result::Result<(), StepError>> {
        match &self.compensate {
            Some(compensate) => Some(compensate().await),
            None => None,
        }
    }
}

impl std::fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("has_compensation", &self.has_compensation())
            .finish()
    }
}

/// Fluent constructor for [`SagaStep`].
pub struct SagaStepBuilder {
    name: String,
    description: String,
    execute: Option<Action>,
    compensate: Option<Action>,
}

impl SagaStepBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the step's action. Required.
    pub fn execute<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), StepError>> + Send + 'static,
    {
        self.execute = Some(boxed_action(f));
        self
    }

    /// Sets the action that undoes a successful `execute`.
    pub fn compensate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), StepError>> + Send + 'static,
    {
        self.compensate = Some(boxed_action(f));
        self
    }

    pub fn build(self) -> Result<SagaStep> {
        if self.name.trim().is_empty() {
            return Err(SagaError::InvalidDefinition(
                "step name must not be empty".to_string(),
            ));
        }
        let execute = self.execute.ok_or_else(|| {
            SagaError::InvalidDefinition(format!("step '{}' has no execute action", self.name))
        })?;

        Ok(SagaStep {
            name: self.name,
            description: self.description,
            execute,
            compensate: self.compensate,
        })
    }
}
