// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The exposed control-plane surface: subscribe, enqueue, snapshot,
//! upload-audit start, and audit diff/comparison.

use crate::bus::JobWatch;
use crate::diff::{diff_files, FileDiff};
use crate::pipeline::cleanup::cleanup_job_id;
use crate::pipeline::StageDeps;
use crate::queue::{QueueError, SubmitOutcome};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use warden_core::{
    compare_instances, stage_job_id, to_safe_job_id, AuditRun, AuditRunConfig, AuditRunId,
    AuditStatus, FindingComparison, JobEvent, ProjectId, QueueName, Revision, RevisionId,
    RevisionSource, Stage, StagePayload, UploadId, WorkingCopyId,
};
use warden_storage::{CatalogError, RevisionError, SnapshotParams};

/// Errors from the control surface
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("stage {0} is not externally submittable")]
    NotSubmittable(Stage),
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    #[error("upload not found: {0}")]
    UploadNotFound(UploadId),
    #[error("audit run not found: {0}")]
    AuditRunNotFound(AuditRunId),
    #[error("audit run {0} does not belong to this project")]
    ProjectMismatch(AuditRunId),
    #[error("audit run {0} is not completed")]
    NotCompleted(AuditRunId),
    #[error("an audit run is already active for this project: {existing}")]
    ActiveAuditRunConflict { existing: AuditRunId },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("revision error: {0}")]
    Revision(String),
}

impl From<RevisionError> for ControlError {
    fn from(e: RevisionError) -> Self {
        match e {
            RevisionError::ActiveAuditRunConflict { existing } => {
                ControlError::ActiveAuditRunConflict { existing }
            }
            other => ControlError::Revision(other.to_string()),
        }
    }
}

/// File and finding difference of one audit against its parent revision
/// and the previous completed audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditDiff {
    pub audit_run_id: AuditRunId,
    pub revision_id: RevisionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_revision_id: Option<RevisionId>,
    pub files: FileDiff,
    /// Absent when the project has no earlier completed audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<FindingComparison>,
}

/// Directed comparison between two completed audits, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditComparison {
    pub from_audit_run_id: AuditRunId,
    pub to_audit_run_id: AuditRunId,
    pub files: FileDiff,
    pub findings: FindingComparison,
}

/// The facade external surfaces (HTTP, admin tooling) talk to.
pub struct ControlPlane {
    deps: StageDeps,
}

impl ControlPlane {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }

    // -- events --

    /// Live stream of job events; no replay of earlier events.
    pub fn subscribe(&self, job_id: &str) -> mpsc::UnboundedReceiver<JobEvent> {
        self.deps.bus.subscribe(job_id)
    }

    /// Live stream with worker-offline detection.
    pub fn watch(&self, job_id: &str) -> JobWatch {
        self.deps.bus.watch(job_id)
    }

    /// The durable event history for a job id.
    pub fn history(&self, job_id: &str) -> Vec<JobEvent> {
        self.deps.bus.history(job_id)
    }

    // -- submission --

    /// Submit an externally submittable stage (`ingest` or `pdf` only).
    pub fn enqueue(
        &self,
        stage: Stage,
        payload: StagePayload,
        job_id: &str,
    ) -> Result<SubmitOutcome, ControlError> {
        if !stage.is_externally_submittable() {
            return Err(ControlError::NotSubmittable(stage));
        }
        let value = serde_json::to_value(&payload)
            .map_err(|e| ControlError::Revision(e.to_string()))?;
        let outcome = self
            .deps
            .queue
            .submit(stage.queue(), &to_safe_job_id(job_id), value)?;
        Ok(outcome)
    }

    /// Snapshot a working copy into a revision plus a queued audit run and
    /// start the pipeline. Surfaces `ActiveAuditRunConflict` when the
    /// project already has a live run.
    pub async fn snapshot(
        &self,
        working_copy_id: &WorkingCopyId,
        params: SnapshotParams,
    ) -> Result<(Revision, AuditRun), ControlError> {
        let project_id = self
            .deps
            .catalog
            .read(|c| c.working_copy(working_copy_id).map(|w| w.project_id.clone()))
            .ok_or_else(|| {
                ControlError::Revision(format!("working copy not found: {working_copy_id}"))
            })?;

        let (revision, run) = self
            .deps
            .revisions
            .snapshot_working_copy(&project_id, working_copy_id, params)
            .await?;

        self.submit_ingest(&project_id, &run.id, None)?;
        Ok((revision, run))
    }

    /// Start an audit from an uploaded payload: create the (still empty)
    /// revision and the queued run atomically, then submit ingest.
    pub fn start_upload_audit(
        &self,
        project_id: &ProjectId,
        upload_id: &UploadId,
        params: SnapshotParams,
    ) -> Result<(Revision, AuditRun), ControlError> {
        let deps = &self.deps;
        let project = deps
            .catalog
            .read(|c| c.project(project_id).cloned())
            .ok_or_else(|| ControlError::ProjectNotFound(project_id.clone()))?;
        let upload = deps
            .catalog
            .read(|c| c.upload(upload_id).cloned())
            .ok_or_else(|| ControlError::UploadNotFound(upload_id.clone()))?;
        if upload.project_id != project.id {
            return Err(ControlError::UploadNotFound(upload_id.clone()));
        }

        let now = deps.clock.epoch_ms();
        let revision = Revision::new(
            RevisionId::new(deps.ids.fresh()),
            project_id.clone(),
            RevisionSource::Upload,
            format!("upload {}", upload.name),
            now,
        );
        let run = AuditRun::new(
            AuditRunConfig {
                id: AuditRunId::new(deps.ids.fresh()),
                project_id: project_id.clone(),
                revision_id: revision.id.clone(),
                profile: params.profile,
                requested_by: params.requested_by,
                primary_model_id: params.primary_model_id,
                fallback_model_id: params.fallback_model_id,
            },
            now,
        );

        match deps
            .catalog
            .commit_snapshot(revision.clone(), Vec::new(), run.clone())
        {
            Ok(()) => {}
            Err(CatalogError::ActiveAuditRunConflict { existing, .. }) => {
                return Err(ControlError::ActiveAuditRunConflict { existing });
            }
            Err(e) => return Err(e.into()),
        }

        self.submit_ingest(project_id, &run.id, Some(upload_id.clone()))?;
        info!(project = %project_id, run = %run.id, upload = %upload_id, "upload audit started");
        Ok((revision, run))
    }

    fn submit_ingest(
        &self,
        project_id: &ProjectId,
        run_id: &AuditRunId,
        upload_id: Option<UploadId>,
    ) -> Result<(), ControlError> {
        let mut payload = StagePayload::new(project_id.clone(), run_id.clone());
        if let Some(upload_id) = upload_id {
            payload = payload.with_upload(upload_id);
        }
        let job_id = stage_job_id(Stage::Ingest, project_id, run_id);
        let value = serde_json::to_value(&payload)
            .map_err(|e| ControlError::Revision(e.to_string()))?;
        self.deps.queue.submit(QueueName::Ingest, &job_id, value)?;
        Ok(())
    }

    /// Submit today's retention sweep under its idempotent job id.
    pub fn schedule_cleanup(&self) -> Result<SubmitOutcome, ControlError> {
        let job_id = cleanup_job_id(self.deps.clock.epoch_ms());
        let outcome =
            self.deps
                .queue
                .submit(QueueName::Cleanup, &job_id, serde_json::json!({}))?;
        Ok(outcome)
    }

    // -- derived views --

    /// Diff one audit's revision against its parent, with finding buckets
    /// against the previous completed audit when one exists.
    pub fn audit_diff(
        &self,
        project_id: &ProjectId,
        audit_run_id: &AuditRunId,
    ) -> Result<AuditDiff, ControlError> {
        let run = self.owned_run(project_id, audit_run_id)?;
        let deps = &self.deps;

        let revision = deps
            .catalog
            .read(|c| c.revision(&run.revision_id).cloned())
            .ok_or_else(|| ControlError::Revision(format!(
                "revision not found: {}",
                run.revision_id
            )))?;

        let new_files = deps.catalog.read(|c| c.files_of(&run.revision_id));
        let old_files = revision
            .parent_id
            .as_ref()
            .map(|parent| deps.catalog.read(|c| c.files_of(parent)))
            .unwrap_or_default();

        let previous = deps.catalog.read(|c| {
            c.completed_runs_for(project_id)
                .into_iter()
                .filter(|r| {
                    r.id != run.id
                        && (r.created_at_ms, r.id.clone()) < (run.created_at_ms, run.id.clone())
                })
                .next_back()
        });
        let findings = previous.map(|prev| {
            let prev_instances = deps.catalog.read(|c| c.instances_of_run(&prev.id));
            let curr_instances = deps.catalog.read(|c| c.instances_of_run(&run.id));
            compare_instances(&prev_instances, &curr_instances)
        });

        Ok(AuditDiff {
            audit_run_id: run.id,
            revision_id: revision.id,
            parent_revision_id: revision.parent_id,
            files: diff_files(&old_files, &new_files),
            findings,
        })
    }

    /// Compare two completed audits, normalized oldest-to-newest by
    /// `(created_at, id)`. Either run not being `completed` is rejected.
    pub fn audit_comparison(
        &self,
        project_id: &ProjectId,
        from: &AuditRunId,
        to: &AuditRunId,
    ) -> Result<AuditComparison, ControlError> {
        let a = self.owned_run(project_id, from)?;
        let b = self.owned_run(project_id, to)?;
        for run in [&a, &b] {
            if run.status != AuditStatus::Completed {
                return Err(ControlError::NotCompleted(run.id.clone()));
            }
        }

        let (older, newer) = if (a.created_at_ms, a.id.clone()) <= (b.created_at_ms, b.id.clone())
        {
            (a, b)
        } else {
            (b, a)
        };

        let deps = &self.deps;
        let old_files = deps.catalog.read(|c| c.files_of(&older.revision_id));
        let new_files = deps.catalog.read(|c| c.files_of(&newer.revision_id));
        let old_instances = deps.catalog.read(|c| c.instances_of_run(&older.id));
        let new_instances = deps.catalog.read(|c| c.instances_of_run(&newer.id));

        Ok(AuditComparison {
            from_audit_run_id: older.id,
            to_audit_run_id: newer.id,
            files: diff_files(&old_files, &new_files),
            findings: compare_instances(&old_instances, &new_instances),
        })
    }

    fn owned_run(
        &self,
        project_id: &ProjectId,
        run_id: &AuditRunId,
    ) -> Result<AuditRun, ControlError> {
        let run = self
            .deps
            .catalog
            .read(|c| c.audit_run(run_id).cloned())
            .ok_or_else(|| ControlError::AuditRunNotFound(run_id.clone()))?;
        if run.project_id != *project_id {
            return Err(ControlError::ProjectMismatch(run_id.clone()));
        }
        Ok(run)
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
