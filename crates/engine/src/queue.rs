// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue runtime.
//!
//! Named queues with fixed concurrency ceilings, bounded retry with
//! exponential back-off, a hard per-job deadline, and an idempotent live
//! set keyed on `(queue, job_id)`. The runtime appends `worker-*` twin
//! events around every attempt; handlers publish their own domain events.

use crate::bus::EventBus;
use crate::config::EngineConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};
use warden_core::{EventPayload, QueueName, RetryPolicy};

/// Handler-level error classification. Only transient errors are retried;
/// everything else ends the job.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transient error: {0}")]
    Transient(String),
    #[error("fatal stage error: {0}")]
    Fatal(String),
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }
}

/// Errors from job submission
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job id contains reserved ':' character: {0}")]
    ReservedJobId(String),
    #[error("queue {0} is not accepting jobs")]
    Closed(QueueName),
}

/// What `submit` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    /// The job id is already live in this queue; the submission was a no-op.
    Duplicate,
}

/// A job as seen by its handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub queue: QueueName,
    pub job_id: String,
    pub payload: serde_json::Value,
    /// Wall-clock budget for one attempt
    pub deadline: Duration,
}

/// A queue handler. `run` must be idempotent at the data level: retries
/// and crash-recovery replays re-enter it with the same payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &JobContext) -> Result<(), StageError>;

    /// Called once when the job will not run again (retries exhausted,
    /// fatal error, or deadline expiry).
    async fn on_final_failure(&self, _job: &JobContext, _reason: &str) {}
}

struct QueuedJob {
    job_id: String,
    payload: serde_json::Value,
}

struct QueueEntry {
    tx: mpsc::UnboundedSender<QueuedJob>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedJob>>>,
    concurrency: usize,
    deadline: Duration,
}

struct RuntimeInner {
    queues: HashMap<QueueName, QueueEntry>,
    bus: Arc<EventBus>,
    live: Mutex<HashSet<(QueueName, String)>>,
    retry: RetryPolicy,
}

/// The queue runtime. Queues exist from construction; consumption starts
/// when a handler is registered.
pub struct QueueRuntime {
    inner: Arc<RuntimeInner>,
}

/// Cheap submission handle for stage handlers and the control surface.
#[derive(Clone)]
pub struct QueueHandle {
    inner: Arc<RuntimeInner>,
}

impl QueueRuntime {
    pub fn new(bus: Arc<EventBus>, config: &EngineConfig) -> Self {
        let queues = QueueName::ALL
            .iter()
            .map(|&name| {
                let (tx, rx) = mpsc::unbounded_channel();
                let queue_config = config.queue(name);
                (
                    name,
                    QueueEntry {
                        tx,
                        rx: Mutex::new(Some(rx)),
                        concurrency: queue_config.concurrency.max(1),
                        deadline: queue_config.deadline(),
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(RuntimeInner {
                queues,
                bus,
                live: Mutex::new(HashSet::new()),
                retry: config.retry.policy(),
            }),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            inner: self.inner.clone(),
        }
    }

    /// Attach a handler and start consuming. Registering twice is a no-op
    /// (the receiver is gone).
    pub fn register(&self, queue: QueueName, handler: Arc<dyn JobHandler>) {
        let Some(entry) = self.inner.queues.get(&queue) else {
            return;
        };
        let Some(mut rx) = entry.rx.lock().take() else {
            warn!(queue = %queue, "handler already registered");
            return;
        };

        let semaphore = Arc::new(Semaphore::new(entry.concurrency));
        let deadline = entry.deadline;
        let inner = self.inner.clone();
        info!(queue = %queue, concurrency = entry.concurrency, "queue consuming");

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let inner = inner.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    inner.run_job(queue, job, handler, deadline).await;
                    drop(permit);
                });
            }
        });
    }

    pub fn submit(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: serde_json::Value,
    ) -> Result<SubmitOutcome, QueueError> {
        self.inner.submit(queue, job_id, payload)
    }
}

impl QueueHandle {
    pub fn submit(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: serde_json::Value,
    ) -> Result<SubmitOutcome, QueueError> {
        self.inner.submit(queue, job_id, payload)
    }
}

impl RuntimeInner {
    fn submit(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: serde_json::Value,
    ) -> Result<SubmitOutcome, QueueError> {
        if job_id.contains(':') {
            return Err(QueueError::ReservedJobId(job_id.to_string()));
        }
        let Some(entry) = self.queues.get(&queue) else {
            return Err(QueueError::Closed(queue));
        };

        {
            let mut live = self.live.lock();
            if !live.insert((queue, job_id.to_string())) {
                return Ok(SubmitOutcome::Duplicate);
            }
        }

        let sent = entry.tx.send(QueuedJob {
            job_id: job_id.to_string(),
            payload,
        });
        if sent.is_err() {
            self.live.lock().remove(&(queue, job_id.to_string()));
            return Err(QueueError::Closed(queue));
        }
        Ok(SubmitOutcome::Enqueued)
    }

    async fn run_job(
        &self,
        queue: QueueName,
        job: QueuedJob,
        handler: Arc<dyn JobHandler>,
        deadline: Duration,
    ) {
        let ctx = JobContext {
            queue,
            job_id: job.job_id,
            payload: job.payload,
            deadline,
        };

        let mut attempt = 1u32;
        loop {
            let _ = self.bus.publish(
                queue,
                &ctx.job_id,
                EventPayload::WorkerStarted { attempt },
            );
            let started = Instant::now();

            match tokio::time::timeout(deadline, handler.run(&ctx)).await {
                Ok(Ok(())) => {
                    let _ = self.bus.publish(
                        queue,
                        &ctx.job_id,
                        EventPayload::WorkerCompleted {
                            attempt,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        },
                    );
                    break;
                }
                Ok(Err(e)) => {
                    let _ = self.bus.publish(
                        queue,
                        &ctx.job_id,
                        EventPayload::WorkerFailed {
                            attempt,
                            message: e.to_string(),
                        },
                    );
                    if e.is_retryable() && self.retry.should_retry(attempt) {
                        let delay = jittered(self.retry.delay_for(attempt));
                        warn!(
                            queue = %queue,
                            job_id = %ctx.job_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "job attempt failed, retrying",
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    error!(queue = %queue, job_id = %ctx.job_id, error = %e, "job failed");
                    handler.on_final_failure(&ctx, &e.to_string()).await;
                    break;
                }
                Err(_) => {
                    // Deadline expiry is fatal for the stage, never retried.
                    let _ = self.bus.publish(
                        queue,
                        &ctx.job_id,
                        EventPayload::Timeout {
                            deadline_ms: deadline.as_millis() as u64,
                        },
                    );
                    let _ = self.bus.publish(
                        queue,
                        &ctx.job_id,
                        EventPayload::WorkerFailed {
                            attempt,
                            message: "job deadline exceeded".to_string(),
                        },
                    );
                    error!(queue = %queue, job_id = %ctx.job_id, "job deadline exceeded");
                    handler.on_final_failure(&ctx, "job deadline exceeded").await;
                    break;
                }
            }
        }

        self.live.lock().remove(&(queue, ctx.job_id.clone()));
    }
}

/// Up to 10% random jitter keeps synchronized retries apart.
fn jittered(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return delay;
    }
    let jitter = rand::rng().random_range(0..=ms / 10);
    Duration::from_millis(ms + jitter)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
