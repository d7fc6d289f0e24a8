// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized catalog state, rebuilt from journal replay.
//!
//! The catalog is the serializing authority for every entity in the data
//! model. Mutations are expressed as [`CatalogEvent`]s: the write path
//! validates against the in-memory state, appends the events to the
//! journal, then applies them here. Replay applies the same events without
//! validation, so `apply` must never fail.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use warden_core::{
    AuditRun, AuditRunId, FileBlob, Finding, FindingId, FindingInstance, FindingStatus,
    FindingTransition, JobEvent, PdfExport, Project, ProjectId, ProjectLifecycle, Revision,
    RevisionFile, RevisionId, Upload, UploadId, UploadStatus, UserId, VerificationStep,
    WorkingCopy, WorkingCopyFile, WorkingCopyId, WorkingCopyStatus,
};

/// Typed mutations of the catalog. One journal line per event.
///
/// Serializes with `{"type": "entity:verb", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    // -- project --
    #[serde(rename = "project:created")]
    ProjectCreated { project: Project },

    #[serde(rename = "project:lifecycle")]
    ProjectLifecycleChanged {
        id: ProjectId,
        lifecycle: ProjectLifecycle,
    },

    // -- upload --
    #[serde(rename = "upload:created")]
    UploadCreated { upload: Upload },

    #[serde(rename = "upload:status")]
    UploadStatusChanged { id: UploadId, status: UploadStatus },

    #[serde(rename = "upload:deleted")]
    UploadDeleted { id: UploadId },

    // -- blob --
    #[serde(rename = "blob:inserted")]
    BlobInserted { blob: FileBlob },

    #[serde(rename = "blob:deleted")]
    BlobDeleted { digest: String },

    // -- revision --
    #[serde(rename = "revision:created")]
    RevisionCreated { revision: Revision },

    #[serde(rename = "revision:file-upserted")]
    RevisionFileUpserted { file: RevisionFile },

    #[serde(rename = "revision:files-cleared")]
    RevisionFilesCleared { id: RevisionId },

    // -- working copy --
    #[serde(rename = "working-copy:created")]
    WorkingCopyCreated { copy: WorkingCopy },

    #[serde(rename = "working-copy:file-saved")]
    WorkingCopyFileSaved { file: WorkingCopyFile },

    #[serde(rename = "working-copy:archived")]
    WorkingCopyArchived { id: WorkingCopyId },

    // -- audit run --
    #[serde(rename = "audit-run:created")]
    AuditRunCreated { run: AuditRun },

    #[serde(rename = "audit-run:started")]
    AuditRunStarted { id: AuditRunId, at_ms: u64 },

    #[serde(rename = "audit-run:report")]
    AuditRunReportStored {
        id: AuditRunId,
        report: serde_json::Value,
    },

    #[serde(rename = "audit-run:completed")]
    AuditRunCompleted { id: AuditRunId, at_ms: u64 },

    #[serde(rename = "audit-run:failed")]
    AuditRunFailed {
        id: AuditRunId,
        error: String,
        at_ms: u64,
    },

    #[serde(rename = "audit-run:cancelled")]
    AuditRunCancelled { id: AuditRunId, at_ms: u64 },

    // -- finding --
    #[serde(rename = "finding:inserted")]
    FindingInserted { finding: Finding },

    #[serde(rename = "finding:status")]
    FindingStatusChanged {
        id: FindingId,
        status: FindingStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<RevisionId>,
    },

    #[serde(rename = "finding:instance-upserted")]
    FindingInstanceUpserted { instance: FindingInstance },

    #[serde(rename = "finding:transition")]
    FindingTransitionRecorded { transition: FindingTransition },

    // -- verification / pdf --
    #[serde(rename = "verification:step")]
    VerificationStepRecorded { step: VerificationStep },

    #[serde(rename = "pdf:upserted")]
    PdfExportUpserted { export: PdfExport },

    #[serde(rename = "pdf:deleted")]
    PdfExportDeleted { id: AuditRunId, variant: String },

    // -- job events --
    #[serde(rename = "job-event:appended")]
    JobEventAppended { event: JobEvent },

    #[serde(rename = "job-event:trimmed")]
    JobEventsTrimmed { before_ms: u64 },
}

/// The complete materialized state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub projects: HashMap<ProjectId, Project>,
    pub uploads: HashMap<UploadId, Upload>,
    /// Blobs by digest
    pub blobs: HashMap<String, FileBlob>,
    pub revisions: HashMap<RevisionId, Revision>,
    /// Revision files by revision, keyed by normalized path
    pub revision_files: HashMap<RevisionId, BTreeMap<String, RevisionFile>>,
    pub working_copies: HashMap<WorkingCopyId, WorkingCopy>,
    pub working_copy_files: HashMap<WorkingCopyId, BTreeMap<String, WorkingCopyFile>>,
    /// Unique index: active copy per (owner, base revision)
    pub active_copies: HashMap<UserId, BTreeMap<RevisionId, WorkingCopyId>>,
    pub audit_runs: HashMap<AuditRunId, AuditRun>,
    /// Unique index: the queued-or-running run per project
    pub active_runs: HashMap<ProjectId, AuditRunId>,
    pub findings: HashMap<FindingId, Finding>,
    /// Unique index: finding per (project, fingerprint)
    pub finding_fingerprints: HashMap<ProjectId, HashMap<String, FindingId>>,
    /// Instances keyed (finding, audit run); unique per pair
    pub finding_instances: HashMap<FindingId, BTreeMap<AuditRunId, FindingInstance>>,
    pub finding_transitions: Vec<FindingTransition>,
    pub verification_steps: HashMap<AuditRunId, Vec<VerificationStep>>,
    pub pdf_exports: HashMap<AuditRunId, BTreeMap<String, PdfExport>>,
    /// Append-only job event log
    pub job_events: Vec<JobEvent>,
    pub next_event_seq: u64,
}

impl Catalog {
    /// Apply an event. Must be total: replay depends on it.
    pub fn apply(&mut self, event: &CatalogEvent) {
        match event {
            CatalogEvent::ProjectCreated { project } => {
                self.projects.insert(project.id.clone(), project.clone());
            }
            CatalogEvent::ProjectLifecycleChanged { id, lifecycle } => {
                if let Some(project) = self.projects.get_mut(id) {
                    project.lifecycle = *lifecycle;
                }
            }
            CatalogEvent::UploadCreated { upload } => {
                self.uploads.insert(upload.id.clone(), upload.clone());
            }
            CatalogEvent::UploadStatusChanged { id, status } => {
                if let Some(upload) = self.uploads.get_mut(id) {
                    upload.status = *status;
                }
            }
            CatalogEvent::UploadDeleted { id } => {
                self.uploads.remove(id);
            }
            CatalogEvent::BlobInserted { blob } => {
                self.blobs.insert(blob.digest.clone(), blob.clone());
            }
            CatalogEvent::BlobDeleted { digest } => {
                self.blobs.remove(digest);
            }
            CatalogEvent::RevisionCreated { revision } => {
                self.revisions.insert(revision.id.clone(), revision.clone());
            }
            CatalogEvent::RevisionFileUpserted { file } => {
                self.revision_files
                    .entry(file.revision_id.clone())
                    .or_default()
                    .insert(file.path.clone(), file.clone());
            }
            CatalogEvent::RevisionFilesCleared { id } => {
                self.revision_files.remove(id);
            }
            CatalogEvent::WorkingCopyCreated { copy } => {
                if copy.status == WorkingCopyStatus::Active {
                    self.active_copies
                        .entry(copy.owner.clone())
                        .or_default()
                        .insert(copy.base_revision_id.clone(), copy.id.clone());
                }
                self.working_copies.insert(copy.id.clone(), copy.clone());
            }
            CatalogEvent::WorkingCopyFileSaved { file } => {
                self.working_copy_files
                    .entry(file.working_copy_id.clone())
                    .or_default()
                    .insert(file.path.clone(), file.clone());
            }
            CatalogEvent::WorkingCopyArchived { id } => {
                if let Some(copy) = self.working_copies.get_mut(id) {
                    copy.status = WorkingCopyStatus::Archived;
                    if let Some(by_rev) = self.active_copies.get_mut(&copy.owner) {
                        by_rev.remove(&copy.base_revision_id);
                    }
                }
            }
            CatalogEvent::AuditRunCreated { run } => {
                if run.status.is_active() {
                    self.active_runs
                        .insert(run.project_id.clone(), run.id.clone());
                }
                self.audit_runs.insert(run.id.clone(), run.clone());
            }
            CatalogEvent::AuditRunStarted { id, at_ms } => {
                if let Some(run) = self.audit_runs.get_mut(id) {
                    run.status = warden_core::AuditStatus::Running;
                    run.started_at_ms = Some(*at_ms);
                }
            }
            CatalogEvent::AuditRunReportStored { id, report } => {
                if let Some(run) = self.audit_runs.get_mut(id) {
                    run.report_json = Some(report.clone());
                }
            }
            CatalogEvent::AuditRunCompleted { id, at_ms } => {
                self.finish_run(id, warden_core::AuditStatus::Completed, None, *at_ms);
            }
            CatalogEvent::AuditRunFailed { id, error, at_ms } => {
                self.finish_run(
                    id,
                    warden_core::AuditStatus::Failed,
                    Some(error.clone()),
                    *at_ms,
                );
            }
            CatalogEvent::AuditRunCancelled { id, at_ms } => {
                self.finish_run(id, warden_core::AuditStatus::Cancelled, None, *at_ms);
            }
            CatalogEvent::FindingInserted { finding } => {
                self.finding_fingerprints
                    .entry(finding.project_id.clone())
                    .or_default()
                    .insert(finding.fingerprint.clone(), finding.id.clone());
                self.findings.insert(finding.id.clone(), finding.clone());
            }
            CatalogEvent::FindingStatusChanged {
                id,
                status,
                last_seen,
            } => {
                if let Some(finding) = self.findings.get_mut(id) {
                    finding.current_status = *status;
                    if let Some(rev) = last_seen {
                        finding.last_seen_revision = rev.clone();
                    }
                }
            }
            CatalogEvent::FindingInstanceUpserted { instance } => {
                self.finding_instances
                    .entry(instance.finding_id.clone())
                    .or_default()
                    .insert(instance.audit_run_id.clone(), instance.clone());
            }
            CatalogEvent::FindingTransitionRecorded { transition } => {
                self.finding_transitions.push(transition.clone());
            }
            CatalogEvent::VerificationStepRecorded { step } => {
                self.verification_steps
                    .entry(step.audit_run_id.clone())
                    .or_default()
                    .push(step.clone());
            }
            CatalogEvent::PdfExportUpserted { export } => {
                self.pdf_exports
                    .entry(export.audit_run_id.clone())
                    .or_default()
                    .insert(export.variant.clone(), export.clone());
            }
            CatalogEvent::PdfExportDeleted { id, variant } => {
                if let Some(by_variant) = self.pdf_exports.get_mut(id) {
                    by_variant.remove(variant);
                }
            }
            CatalogEvent::JobEventAppended { event } => {
                self.next_event_seq = self.next_event_seq.max(event.seq + 1);
                self.job_events.push(event.clone());
            }
            CatalogEvent::JobEventsTrimmed { before_ms } => {
                self.job_events.retain(|e| e.created_at_ms >= *before_ms);
            }
        }
    }

    fn finish_run(
        &mut self,
        id: &AuditRunId,
        status: warden_core::AuditStatus,
        error: Option<String>,
        at_ms: u64,
    ) {
        if let Some(run) = self.audit_runs.get_mut(id) {
            run.status = status;
            run.finished_at_ms = Some(at_ms);
            if error.is_some() {
                run.error = error;
            }
            if self.active_runs.get(&run.project_id) == Some(id) {
                self.active_runs.remove(&run.project_id);
            }
        }
    }

    // -- read accessors --

    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn upload(&self, id: &UploadId) -> Option<&Upload> {
        self.uploads.get(id)
    }

    pub fn blob(&self, digest: &str) -> Option<&FileBlob> {
        self.blobs.get(digest)
    }

    pub fn revision(&self, id: &RevisionId) -> Option<&Revision> {
        self.revisions.get(id)
    }

    /// Files of a revision in path order.
    pub fn files_of(&self, id: &RevisionId) -> Vec<RevisionFile> {
        self.revision_files
            .get(id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn working_copy(&self, id: &WorkingCopyId) -> Option<&WorkingCopy> {
        self.working_copies.get(id)
    }

    pub fn working_copy_files_of(&self, id: &WorkingCopyId) -> Vec<WorkingCopyFile> {
        self.working_copy_files
            .get(id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active_copy_for(&self, owner: &UserId, base: &RevisionId) -> Option<&WorkingCopy> {
        self.active_copies
            .get(owner)
            .and_then(|by_rev| by_rev.get(base))
            .and_then(|id| self.working_copies.get(id))
    }

    pub fn audit_run(&self, id: &AuditRunId) -> Option<&AuditRun> {
        self.audit_runs.get(id)
    }

    pub fn active_run_for(&self, project: &ProjectId) -> Option<&AuditRun> {
        self.active_runs
            .get(project)
            .and_then(|id| self.audit_runs.get(id))
    }

    /// Completed runs of a project ordered by `(created_at, id)`.
    pub fn completed_runs_for(&self, project: &ProjectId) -> Vec<AuditRun> {
        let mut runs: Vec<AuditRun> = self
            .audit_runs
            .values()
            .filter(|r| {
                r.project_id == *project && r.status == warden_core::AuditStatus::Completed
            })
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            (a.created_at_ms, &a.id)
                .cmp(&(b.created_at_ms, &b.id))
        });
        runs
    }

    pub fn finding(&self, id: &FindingId) -> Option<&Finding> {
        self.findings.get(id)
    }

    pub fn finding_by_fingerprint(
        &self,
        project: &ProjectId,
        fingerprint: &str,
    ) -> Option<&Finding> {
        self.finding_fingerprints
            .get(project)
            .and_then(|by_fp| by_fp.get(fingerprint))
            .and_then(|id| self.findings.get(id))
    }

    /// Instances recorded in a given run.
    pub fn instances_of_run(&self, run: &AuditRunId) -> Vec<FindingInstance> {
        let mut instances: Vec<FindingInstance> = self
            .finding_instances
            .values()
            .filter_map(|by_run| by_run.get(run))
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));
        instances
    }

    /// Current statuses of every finding of a project.
    pub fn finding_statuses_for(&self, project: &ProjectId) -> HashMap<FindingId, FindingStatus> {
        self.findings
            .values()
            .filter(|f| f.project_id == *project)
            .map(|f| (f.id.clone(), f.current_status))
            .collect()
    }

    pub fn verification_steps_of(&self, run: &AuditRunId) -> Vec<VerificationStep> {
        self.verification_steps
            .get(run)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pdf_export(&self, run: &AuditRunId, variant: &str) -> Option<&PdfExport> {
        self.pdf_exports
            .get(run)
            .and_then(|by_variant| by_variant.get(variant))
    }

    /// Events for a job id in insertion order.
    pub fn job_events_for(&self, job_id: &str) -> Vec<JobEvent> {
        self.job_events
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
