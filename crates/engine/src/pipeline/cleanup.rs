// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cleanup stage: the daily retention sweep.

use super::StageDeps;
use crate::queue::{JobContext, JobHandler, StageError};
use async_trait::async_trait;
use warden_core::EventPayload;
use warden_storage::sweep;

pub(crate) struct CleanupStage {
    deps: StageDeps,
}

impl CleanupStage {
    pub(crate) fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for CleanupStage {
    async fn run(&self, job: &JobContext) -> Result<(), StageError> {
        let deps = &self.deps;
        let _ = deps
            .bus
            .publish(job.queue, &job.job_id, EventPayload::Started {});

        sweep(
            &deps.catalog,
            &deps.objects,
            deps.clock.epoch_ms(),
            deps.config.retention_days(),
        )
        .await
        .map_err(|e| StageError::Fatal(e.to_string()))?;

        let _ = deps.bus.publish(
            job.queue,
            &job.job_id,
            EventPayload::Completed { elapsed_ms: None },
        );
        Ok(())
    }
}

/// Date-stamped idempotent job id for the daily sweep.
pub fn cleanup_job_id(now_ms: u64) -> String {
    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    format!("cleanup-day-{}", now_ms / DAY_MS)
}
