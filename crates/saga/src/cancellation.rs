use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Cooperative cancellation for a saga: a stop flag plus an optional
/// deadline, both checked between steps only.
///
/// Clones share the same stop flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    stopped: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Stopped,
    DeadlineExceeded,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            stopped: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Requests that the saga stop before its next step.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Option<Interrupt> {
        if self.is_stopped() {
            return Some(Interrupt::Stopped);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_shared_between_clones() {
        let cancellation = Cancellation::new();
        let clone = cancellation.clone();
        assert_eq!(cancellation.check(), None);

        clone.stop();
        assert!(cancellation.is_stopped());
        assert_eq!(cancellation.check(), Some(Interrupt::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_trips_after_timeout() {
        let cancellation = Cancellation::with_timeout(Duration::from_secs(1));
        assert_eq!(cancellation.check(), None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cancellation.check(), Some(Interrupt::DeadlineExceeded));
    }
}
