use std::time::Duration;

/// Event bus tuning.
///
/// Reads from environment variables:
/// - `EVENT_BUS_QUEUE_CAPACITY` — events buffered per subscription (default: `256`)
/// - `EVENT_BUS_PUBLISH_TIMEOUT_MS` — how long `publish` waits on a full queue (default: `250`)
/// - `EVENT_BUS_SHUTDOWN_TIMEOUT_SECS` — drain budget for `shutdown` (default: `5`)
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub queue_capacity: usize,
    pub publish_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl EventBusConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_capacity: std::env::var("EVENT_BUS_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(defaults.queue_capacity),
            publish_timeout: std::env::var("EVENT_BUS_PUBLISH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
            shutdown_timeout: std::env::var("EVENT_BUS_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            publish_timeout: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EventBusConfig::default();
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.publish_timeout, Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }
}
