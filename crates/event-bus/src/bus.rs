//! Publish/subscribe dispatch with bounded per-subscription queues.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;

use crate::config::EventBusConfig;
use crate::error::{EventBusError, Result};
use crate::event::Event;
use crate::handler::EventHandler;

/// How a call to [`EventBus::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Every queued event was handled before the deadline.
    Drained,
    /// The deadline passed first; some handlers may still be running.
    TimedOut,
}

struct Subscription {
    handler: String,
    queue: mpsc::Sender<Arc<Event>>,
}

struct Inner {
    config: EventBusConfig,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// In-process event bus.
///
/// Each subscription owns a bounded queue and a dispatcher task that hands
/// queued events to the handler one at a time, so events reach a given
/// handler in publish order. A slow handler fills only its own queue; once
/// full, further events for that subscription are dropped after
/// `publish_timeout`.
///
/// Cloning the bus is cheap and every clone shares the same subscriptions.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                subscriptions: RwLock::new(HashMap::new()),
                dispatchers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers `handler` for events named `event_type`.
    ///
    /// Spawns the subscription's dispatcher, so this must be called from
    /// within a Tokio runtime.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let event_type = event_type.into();
        let mut subscriptions = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EventBusError::Closed);
        }

        let (queue, receiver) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let handler_name = handler.name().to_string();
        let dispatcher = tokio::spawn(dispatch(event_type.clone(), handler, receiver));
        self.inner
            .dispatchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(dispatcher);

        tracing::debug!(%event_type, handler = %handler_name, "subscribed");
        subscriptions
            .entry(event_type)
            .or_default()
            .push(Subscription {
                handler: handler_name,
                queue,
            });
        Ok(())
    }

    /// Registers `handler` for each of `event_types`.
    pub fn subscribe_many(
        &self,
        event_types: &[&str],
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        for event_type in event_types {
            self.subscribe(*event_type, Arc::clone(&handler))?;
        }
        Ok(())
    }

    /// Returns the number of handlers registered for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_type)
            .map_or(0, Vec::len)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Queues `event` for every handler subscribed to its type and returns
    /// how many accepted it.
    ///
    /// Never waits on a handler. A full queue is waited on for at most
    /// `publish_timeout`, after which that subscriber misses the event.
    /// Returns 0 once the bus is shut down.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn publish(&self, event: Event) -> usize {
        if self.is_closed() {
            tracing::debug!("bus closed, event discarded");
            return 0;
        }

        let targets: Vec<(String, mpsc::Sender<Arc<Event>>)> = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event.event_type)
            .map(|subs| {
                subs.iter()
                    .map(|s| (s.handler.clone(), s.queue.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let event = Arc::new(event);
        let mut accepted = 0;
        for (handler, queue) in targets {
            match queue
                .send_timeout(Arc::clone(&event), self.inner.config.publish_timeout)
                .await
            {
                Ok(()) => accepted += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    metrics::counter!("event_bus_dropped_total", "handler" => handler.clone())
                        .increment(1);
                    tracing::warn!(
                        %handler,
                        event_id = %event.event_id,
                        "subscriber queue full, event dropped"
                    );
                }
                Err(SendTimeoutError::Closed(_)) => {
                    tracing::debug!(%handler, "subscriber stopped, event discarded");
                }
            }
        }

        metrics::counter!("event_bus_published_total").increment(1);
        accepted
    }

    /// Publishes `event` alongside a transaction.
    ///
    /// The transaction handle is not used: the event is queued immediately
    /// and is not withdrawn if the transaction later rolls back.
    pub async fn publish_with_tx<Tx: Send>(&self, _tx: &mut Tx, event: Event) -> usize {
        self.publish(event).await
    }

    /// Stops accepting events and waits for queued ones to be handled,
    /// for at most `shutdown_timeout`.
    pub async fn shutdown(&self) -> ShutdownStatus {
        self.inner.closed.store(true, Ordering::Release);
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        let dispatchers = std::mem::take(
            &mut *self
                .inner
                .dispatchers
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        let count = dispatchers.len();

        match tokio::time::timeout(self.inner.config.shutdown_timeout, join_all(dispatchers)).await
        {
            Ok(_) => {
                tracing::info!(dispatchers = count, "event bus drained");
                ShutdownStatus::Drained
            }
            Err(_) => {
                tracing::warn!(
                    dispatchers = count,
                    timeout = ?self.inner.config.shutdown_timeout,
                    "event bus shutdown timed out, handlers may still be running"
                );
                ShutdownStatus::TimedOut
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn dispatch(
    event_type: String,
    handler: Arc<dyn EventHandler>,
    mut queue: mpsc::Receiver<Arc<Event>>,
) {
    while let Some(event) = queue.recv().await {
        match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
            Ok(Ok(())) => {
                metrics::counter!("event_bus_handled_total", "event_type" => event_type.clone())
                    .increment(1);
            }
            Ok(Err(err)) => {
                metrics::counter!("event_bus_handler_errors_total", "handler" => handler.name().to_string())
                    .increment(1);
                tracing::warn!(
                    handler = handler.name(),
                    event_id = %event.event_id,
                    %event_type,
                    error = %err,
                    "event handler failed"
                );
            }
            Err(panic) => {
                metrics::counter!("event_bus_handler_panics_total", "handler" => handler.name().to_string())
                    .increment(1);
                tracing::error!(
                    handler = handler.name(),
                    event_id = %event.event_id,
                    %event_type,
                    panic = panic_message(&*panic),
                    "event handler panicked"
                );
            }
        }
    }
    tracing::debug!(handler = handler.name(), %event_type, "dispatcher stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::LoggingHandler;

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let bus = EventBus::default();
        let accepted = bus
            .publish(Event::new("Nobody", "test", serde_json::Value::Null))
            .await;
        assert_eq!(accepted, 0);
    }

    #[tokio::test]
    async fn subscribe_after_shutdown_is_refused() {
        let bus = EventBus::default();
        assert_eq!(bus.shutdown().await, ShutdownStatus::Drained);
        assert!(bus.is_closed());

        let result = bus.subscribe("X", Arc::new(LoggingHandler));
        assert!(matches!(result, Err(EventBusError::Closed)));
    }

    #[tokio::test]
    async fn subscribe_many_registers_each_type() {
        let bus = EventBus::default();
        bus.subscribe_many(&["A", "B"], Arc::new(LoggingHandler))
            .unwrap();

        assert_eq!(bus.subscriber_count("A"), 1);
        assert_eq!(bus.subscriber_count("B"), 1);
        assert_eq!(bus.subscriber_count("C"), 0);
        bus.shutdown().await;
        assert_eq!(bus.subscriber_count("A"), 0);
    }

    #[tokio::test]
    async fn zero_queue_capacity_still_delivers() {
        let bus = EventBus::new(EventBusConfig {
            queue_capacity: 0,
            ..EventBusConfig::default()
        });
        bus.subscribe("A", Arc::new(LoggingHandler)).unwrap();

        let accepted = bus
            .publish(Event::new("A", "test", serde_json::Value::Null))
            .await;
        assert_eq!(accepted, 1);
        assert_eq!(bus.shutdown().await, ShutdownStatus::Drained);
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*s), "static");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }
}
