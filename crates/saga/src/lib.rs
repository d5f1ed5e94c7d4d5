//! Saga orchestration for workflows that span more than one local
//! transaction.
//!
//! A [`Saga`] runs its [`SagaStep`]s strictly in order. When a step fails,
//! the steps that already succeeded are compensated in reverse order. A
//! failed compensation is reported as [`SagaError::CompensationFailed`],
//! which outranks the failure that triggered it.
//!
//! Cancellation is cooperative: [`Cancellation`] is checked between steps,
//! never during one.

pub mod cancellation;
pub mod error;
pub mod manager;
pub mod saga;
pub mod state;
pub mod step;

pub use cancellation::Cancellation;
pub use error::{CompensationFailure, Result, SagaError};
pub use manager::{SagaId, SagaManager, SagaSummary};
pub use saga::{Saga, SagaBuilder};
pub use state::SagaState;
pub use step::{SagaStep, SagaStepBuilder, StepError};
