// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::{QueueConfig, RetryConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use warden_core::FakeClock;
use warden_storage::CatalogStore;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
    };
    config.queues.insert(
        "verify".to_string(),
        QueueConfig {
            concurrency: 2,
            deadline_secs: 1,
        },
    );
    config
}

fn runtime() -> (QueueRuntime, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new(
        Arc::new(CatalogStore::in_memory()),
        Arc::new(FakeClock::new()),
    ));
    (QueueRuntime::new(bus.clone(), &test_config()), bus)
}

/// Handler scripted by a closure over the attempt counter.
struct ScriptedHandler {
    attempts: AtomicU32,
    final_failures: AtomicU32,
    script: Box<dyn Fn(u32) -> Result<(), StageError> + Send + Sync>,
    delay: Duration,
}

impl ScriptedHandler {
    fn new(script: impl Fn(u32) -> Result<(), StageError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            final_failures: AtomicU32::new(0),
            script: Box::new(script),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            final_failures: AtomicU32::new(0),
            script: Box::new(|_| Ok(())),
            delay,
        })
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn run(&self, _job: &JobContext) -> Result<(), StageError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(attempt)
    }

    async fn on_final_failure(&self, _job: &JobContext, _reason: &str) {
        self.final_failures.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_for_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<warden_core::JobEvent>, name: &str) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
            .unwrap_or_else(|| panic!("bus closed waiting for {name}"));
        if event.payload.name() == name {
            return;
        }
    }
}

#[tokio::test]
async fn successful_job_publishes_worker_twins() {
    let (runtime, bus) = runtime();
    let handler = ScriptedHandler::new(|_| Ok(()));
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    let outcome = runtime
        .submit(QueueName::Verify, "job-1", serde_json::json!({}))
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Enqueued);

    wait_for_event(&mut rx, "worker-completed").await;
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);

    let history = bus.history("job-1");
    let names: Vec<&str> = history.iter().map(|e| e.payload.name()).collect();
    assert_eq!(names, vec!["worker-started", "worker-completed"]);
}

#[tokio::test]
async fn transient_errors_are_retried_up_to_three_attempts() {
    let (runtime, bus) = runtime();
    let handler = ScriptedHandler::new(|attempt| {
        if attempt < 3 {
            Err(StageError::Transient("flaky".into()))
        } else {
            Ok(())
        }
    });
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    runtime
        .submit(QueueName::Verify, "job-1", serde_json::json!({}))
        .unwrap();
    wait_for_event(&mut rx, "worker-completed").await;

    assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(handler.final_failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retries_exhaust_and_fail_finally() {
    let (runtime, bus) = runtime();
    let handler = ScriptedHandler::new(|_| Err(StageError::Transient("always down".into())));
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    runtime
        .submit(QueueName::Verify, "job-1", serde_json::json!({}))
        .unwrap();

    // Three failed attempts land in the log
    for _ in 0..3 {
        wait_for_event(&mut rx, "worker-failed").await;
    }
    // Allow the final-failure hook to run
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(handler.final_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    let (runtime, bus) = runtime();
    let handler = ScriptedHandler::new(|_| Err(StageError::Fatal("broken".into())));
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    runtime
        .submit(QueueName::Verify, "job-1", serde_json::json!({}))
        .unwrap();
    wait_for_event(&mut rx, "worker-failed").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(handler.final_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deadline_expiry_is_fatal_and_emits_timeout() {
    let (runtime, bus) = runtime();
    // Verify queue deadline is 1 s in the test config
    let handler = ScriptedHandler::slow(Duration::from_secs(30));
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    runtime
        .submit(QueueName::Verify, "job-1", serde_json::json!({}))
        .unwrap();
    wait_for_event(&mut rx, "timeout").await;
    wait_for_event(&mut rx, "worker-failed").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(handler.final_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn live_job_id_makes_resubmission_a_noop() {
    let (runtime, bus) = runtime();
    let handler = ScriptedHandler::slow(Duration::from_millis(100));
    runtime.register(QueueName::Verify, handler.clone());

    let mut rx = bus.subscribe("job-1");
    assert_eq!(
        runtime.submit(QueueName::Verify, "job-1", serde_json::json!({})).unwrap(),
        SubmitOutcome::Enqueued
    );
    assert_eq!(
        runtime.submit(QueueName::Verify, "job-1", serde_json::json!({})).unwrap(),
        SubmitOutcome::Duplicate
    );

    wait_for_event(&mut rx, "worker-completed").await;
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);

    // After completion the id is free again
    assert_eq!(
        runtime.submit(QueueName::Verify, "job-1", serde_json::json!({})).unwrap(),
        SubmitOutcome::Enqueued
    );
}

#[tokio::test]
async fn colons_in_job_ids_are_rejected() {
    let (runtime, _) = runtime();
    let err = runtime
        .submit(QueueName::Verify, "verify:p:a", serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, QueueError::ReservedJobId(_)));
}

#[tokio::test]
async fn concurrency_ceiling_is_enforced() {
    let (runtime, bus) = runtime();

    struct CountingHandler {
        current: AtomicU32,
        peak: AtomicU32,
    }
    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _job: &JobContext) -> Result<(), StageError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let handler = Arc::new(CountingHandler {
        current: AtomicU32::new(0),
        peak: AtomicU32::new(0),
    });
    runtime.register(QueueName::Verify, handler.clone());

    let mut receivers: Vec<_> = (0..6)
        .map(|i| bus.subscribe(&format!("job-{i}")))
        .collect();
    for i in 0..6 {
        runtime
            .submit(QueueName::Verify, &format!("job-{i}"), serde_json::json!({}))
            .unwrap();
    }
    for rx in &mut receivers {
        wait_for_event(rx, "worker-completed").await;
    }

    // Verify queue is configured with concurrency 2
    assert!(handler.peak.load(Ordering::SeqCst) <= 2);
}
