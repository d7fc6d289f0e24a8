// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-engine: queue runtime, pipeline stages, event bus, and the
//! exposed control-plane surface

mod bootstrap;
mod bus;
mod config;
mod control;
mod diff;
mod pipeline;
mod queue;
mod rate_limit;

pub use bootstrap::{Engine, EngineAdapters};
pub use bus::{EventBus, JobWatch, WatchItem, OFFLINE_WARNING_AFTER};
pub use config::{ConfigError, EngineConfig, QueueConfig, RateLimitConfig, RetryConfig};
pub use control::{AuditComparison, AuditDiff, ControlError, ControlPlane};
pub use diff::{diff_files, FileDiff};
pub use pipeline::ingest::{IngestFailurePolicy, INGEST_FAILURE_POLICY};
pub use pipeline::{recover, register_stages, StageDeps};
pub use queue::{
    JobContext, JobHandler, QueueError, QueueHandle, QueueRuntime, StageError, SubmitOutcome,
};
pub use rate_limit::{
    Decision, InMemorySlidingWindow, RateLimitError, RateLimiter, SlidingWindowStore,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
