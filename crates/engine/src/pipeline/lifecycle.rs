// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finding-lifecycle stage: diff this audit's findings against the
//! previous completed audit, record transitions, and complete the run.

use super::{StageDeps, StageWork};
use crate::queue::{JobContext, StageError};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;
use warden_core::{
    compute_transitions, AuditRun, FindingId, FindingTransition, Stage, StagePayload,
};

pub(crate) struct LifecycleWork;

#[async_trait]
impl StageWork for LifecycleWork {
    fn stage(&self) -> Stage {
        Stage::FindingLifecycle
    }

    async fn work(
        &self,
        deps: &StageDeps,
        payload: &StagePayload,
        run: &AuditRun,
        _job: &JobContext,
    ) -> Result<(), StageError> {
        // The most recent completed run is the comparison baseline; this
        // run is still `running` so it cannot match itself.
        let previous = deps
            .catalog
            .read(|c| c.completed_runs_for(&payload.project_id).pop());

        let current_ids: HashSet<FindingId> = deps
            .catalog
            .read(|c| c.instances_of_run(&run.id))
            .into_iter()
            .map(|i| i.finding_id)
            .collect();
        let previous_ids: HashSet<FindingId> = match &previous {
            Some(prev) => deps
                .catalog
                .read(|c| c.instances_of_run(&prev.id))
                .into_iter()
                .map(|i| i.finding_id)
                .collect(),
            None => HashSet::new(),
        };
        let statuses = deps
            .catalog
            .read(|c| c.finding_statuses_for(&payload.project_id));

        let transitions = compute_transitions(&previous_ids, &current_ids, &statuses);
        let now = deps.clock.epoch_ms();

        for (finding_id, kind) in &transitions {
            if let Some(prev) = &previous {
                deps.catalog.record_transition(FindingTransition {
                    finding_id: finding_id.clone(),
                    from_audit_run_id: prev.id.clone(),
                    to_audit_run_id: run.id.clone(),
                    transition: *kind,
                    created_at_ms: now,
                })?;
            }
            deps.catalog
                .set_finding_status(finding_id, kind.resulting_status())?;
        }

        deps.catalog
            .complete_audit_run(&run.id, deps.clock.epoch_ms())?;
        info!(
            run = %run.id,
            transitions = transitions.len(),
            baseline = previous.as_ref().map(|p| p.id.as_str()).unwrap_or("none"),
            "audit completed",
        );
        Ok(())
    }
}
