//! Subscriber trait and the built-in audit subscriber.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::event::Event;

/// A subscriber to one or more event types.
///
/// Handlers run on the bus's dispatcher tasks. A handler that returns an
/// error or panics affects only its own subscription.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name used in logs and metrics.
    fn name(&self) -> &str;

    /// Handles one event.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Writes every event it receives to the log.
#[derive(Debug, Default, Clone)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "audit_log"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            source = %event.source,
            payload = %event.payload,
            "event"
        );
        Ok(())
    }
}
