//! In-process publish/subscribe for workflow notifications.
//!
//! - [`Event`] is the immutable `{type, source, payload}` record
//! - [`EventHandler`] is implemented by subscribers
//! - [`EventBus`] fans events out to a bounded queue per subscription, each
//!   drained by its own dispatcher task
//!
//! Delivery is best effort: there is no redelivery and no durable outbox.

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;

pub use bus::{EventBus, ShutdownStatus};
pub use config::EventBusConfig;
pub use error::{EventBusError, HandlerError, Result};
pub use event::Event;
pub use handler::{EventHandler, LoggingHandler};
