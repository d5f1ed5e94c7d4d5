//! Event bus error types.

use thiserror::Error;

/// Errors returned by the bus itself.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus has been shut down and takes no new subscriptions.
    #[error("Event bus is shut down")]
    Closed,
}

/// Errors a subscriber may return from [`EventHandler::handle`](crate::EventHandler::handle).
///
/// They are logged by the dispatcher and never reach the publisher.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not have the shape the handler expected.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
