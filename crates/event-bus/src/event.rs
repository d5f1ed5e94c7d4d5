use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable notification that some state change has happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    /// Name subscribers register for, e.g. `"ChallengeApproved"`.
    pub event_type: String,
    /// Component that produced the event.
    pub source: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            source: source.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Replaces the payload with the serialized form of `payload`.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> serde_json::Result<Self> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Deserializes the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}
