// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress event bus: durable append plus live per-job streaming.
//!
//! Every published event lands in the catalog's append-only log first,
//! then fans out to live subscribers of that job id. The live stream does
//! not replay events emitted before the subscription; late readers fetch
//! [`EventBus::history`] explicitly.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use warden_core::{Clock, EventPayload, JobEvent, QueueName};
use warden_storage::{CatalogError, CatalogStore};

/// How long a live watcher waits without events before flagging the
/// worker as offline.
pub const OFFLINE_WARNING_AFTER: Duration = Duration::from_secs(30);

struct Subscriber {
    job_id: String,
    tx: mpsc::UnboundedSender<JobEvent>,
}

/// The two-tier event bus.
pub struct EventBus {
    catalog: Arc<CatalogStore>,
    clock: Arc<dyn Clock>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new(catalog: Arc<CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            clock,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Durably append an event, then deliver it to live subscribers of the
    /// job id. Events for one job id arrive in insertion order.
    pub fn publish(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: EventPayload,
    ) -> Result<JobEvent, CatalogError> {
        let event = self
            .catalog
            .append_job_event(queue, job_id, payload, self.clock.epoch_ms())?;

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| {
            if s.job_id == job_id {
                // A closed receiver unsubscribes itself.
                s.tx.send(event.clone()).is_ok()
            } else {
                true
            }
        });

        debug!(job_id, event = event.payload.name(), seq = event.seq, "event published");
        Ok(event)
    }

    /// Subscribe to every future event of a job id. Dropping the receiver
    /// disconnects.
    pub fn subscribe(&self, job_id: &str) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            job_id: job_id.to_string(),
            tx,
        });
        rx
    }

    /// The durable log for a job id, in insertion order.
    pub fn history(&self, job_id: &str) -> Vec<JobEvent> {
        self.catalog.read(|c| c.job_events_for(job_id))
    }

    /// Subscribe with offline detection baked in.
    pub fn watch(&self, job_id: &str) -> JobWatch {
        JobWatch {
            rx: self.subscribe(job_id),
            idle: OFFLINE_WARNING_AFTER,
        }
    }
}

/// An item surfaced by [`JobWatch::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatchItem {
    Event(JobEvent),
    /// No events for the idle window while the job should be producing.
    OfflineWarning,
}

/// Live stream wrapper that flags silence as a worker-offline warning.
pub struct JobWatch {
    rx: mpsc::UnboundedReceiver<JobEvent>,
    idle: Duration,
}

impl JobWatch {
    #[cfg(any(test, feature = "test-support"))]
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Next event, an offline warning after the idle window, or `None`
    /// when the bus dropped the stream.
    pub async fn next(&mut self) -> Option<WatchItem> {
        match tokio::time::timeout(self.idle, self.rx.recv()).await {
            Ok(Some(event)) => Some(WatchItem::Event(event)),
            Ok(None) => None,
            Err(_) => Some(WatchItem::OfflineWarning),
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
