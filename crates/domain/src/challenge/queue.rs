//! Bounded queue of re-evaluation requests drained by a worker pool.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::SubmissionId;
use futures_util::FutureExt;
use futures_util::future::join_all;
use store::Store;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::approval::ApprovalEngine;
use crate::config::ChallengeConfig;
use crate::error::{ChallengeError, Result};

/// Hands re-evaluations to a fixed pool of workers.
///
/// Requests outlive the call that enqueued them: each runs under its own
/// timeout on a worker task, not under the caller's cancellation.
#[derive(Debug)]
pub struct ReEvaluationQueue {
    sender: Mutex<Option<mpsc::Sender<SubmissionId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReEvaluationQueue {
    /// Spawns the workers. Must be called from within a Tokio runtime.
    pub fn start<S: Store>(engine: ApprovalEngine<S>, config: &ChallengeConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.reevaluation_queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.reevaluation_workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    engine.clone(),
                    Arc::clone(&receiver),
                    config.reevaluation_timeout,
                ))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_none_or(mpsc::Sender::is_closed)
    }

    /// Queues a re-evaluation, waiting for room if the queue is full.
    pub async fn enqueue(&self, submission_id: SubmissionId) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ChallengeError::QueueClosed)?;
        sender
            .send(submission_id)
            .await
            .map_err(|_| ChallengeError::QueueClosed)?;
        metrics::counter!("challenge_reevaluations_enqueued_total").increment(1);
        Ok(())
    }

    /// Closes the queue, lets the workers finish what is already queued and
    /// waits for them.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(|e| e.into_inner()).take());
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        let count = workers.len();
        for joined in join_all(workers).await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "re-evaluation worker ended abnormally");
            }
        }
        tracing::info!(workers = count, "re-evaluation queue drained");
    }
}

async fn run_worker<S: Store>(
    worker: usize,
    engine: ApprovalEngine<S>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<SubmissionId>>>,
    timeout: Duration,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(submission_id) = next else {
            break;
        };

        let attempt = tokio::time::timeout(timeout, engine.re_evaluate(submission_id));
        let finished = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(finished) => finished,
            Err(panic) => {
                metrics::counter!("challenge_reevaluation_panics_total").increment(1);
                tracing::error!(
                    worker,
                    %submission_id,
                    panic = panic_message(&*panic),
                    "re-evaluation panicked"
                );
                continue;
            }
        };

        match finished {
            Ok(Ok(outcome)) => {
                tracing::debug!(worker, %submission_id, ?outcome, "re-evaluated");
            }
            Ok(Err(err)) if err.requires_operator_attention() => {
                metrics::counter!("challenge_reevaluation_errors_total").increment(1);
                tracing::error!(worker, %submission_id, error = %err, "re-evaluation left storage indeterminate");
            }
            Ok(Err(err)) => {
                metrics::counter!("challenge_reevaluation_errors_total").increment(1);
                tracing::warn!(worker, %submission_id, error = %err, "re-evaluation failed");
            }
            Err(_) => {
                metrics::counter!("challenge_reevaluation_timeouts_total").increment(1);
                tracing::warn!(worker, %submission_id, ?timeout, "re-evaluation timed out");
            }
        }
    }
    tracing::debug!(worker, "re-evaluation worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
