//! Workflow configuration loaded from environment variables.

use std::time::Duration;

/// Voting thresholds and re-evaluation pool sizing.
///
/// Reads from environment variables:
/// - `MIN_VOTES_REQUIRED` — votes needed before a decision (default: `10`)
/// - `MIN_REVIEW_TIME_SECONDS` — review time for a vote to count (default: `60`)
/// - `REEVALUATION_WORKERS` — worker tasks draining the queue (default: `4`)
/// - `REEVALUATION_QUEUE_CAPACITY` — pending re-evaluations buffered (default: `1024`)
/// - `REEVALUATION_TIMEOUT_SECS` — budget for one re-evaluation (default: `30`)
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub min_votes_required: u64,
    pub minimum_review_time_secs: u64,
    pub reevaluation_workers: usize,
    pub reevaluation_queue_capacity: usize,
    pub reevaluation_timeout: Duration,
}

impl ChallengeConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_votes_required: env_parse("MIN_VOTES_REQUIRED")
                .unwrap_or(defaults.min_votes_required),
            minimum_review_time_secs: env_parse("MIN_REVIEW_TIME_SECONDS")
                .unwrap_or(defaults.minimum_review_time_secs),
            reevaluation_workers: env_parse("REEVALUATION_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reevaluation_workers),
            reevaluation_queue_capacity: env_parse("REEVALUATION_QUEUE_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reevaluation_queue_capacity),
            reevaluation_timeout: env_parse("REEVALUATION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reevaluation_timeout),
        }
    }

    /// Review time, in milliseconds, at or above which a vote is valid.
    pub fn min_review_time_ms(&self) -> i64 {
        i64::try_from(self.minimum_review_time_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            min_votes_required: 10,
            minimum_review_time_secs: 60,
            reevaluation_workers: 4,
            reevaluation_queue_capacity: 1024,
            reevaluation_timeout: Duration::from_secs(30),
        }
    }
}
