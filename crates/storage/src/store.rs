// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable catalog store: the write path.
//!
//! Every mutation validates against the materialized catalog under a
//! single lock, appends its events to the journal, then applies them. The
//! lock is what makes a multi-event commit a transaction; the unique
//! indexes are checked before the commit and surface typed conflicts with
//! the winning row, mirroring an `ON CONFLICT`-plus-re-read strategy.

use crate::catalog::{Catalog, CatalogEvent};
use crate::journal::{Journal, JournalError};
use crate::snapshot::{Snapshot, SnapshotError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use warden_core::{
    fingerprint, AuditRun, AuditRunId, AuditStatus, EventPayload, FileBlob, Finding, FindingId,
    FindingInstance, FindingStatus, FindingTransition, JobEvent, PdfExport, Project,
    ProjectId, ProjectLifecycle, QueueName, ReportFinding, Revision, RevisionFile, RevisionId,
    Upload, UploadId, UploadStatus, VerificationStep, WorkingCopy, WorkingCopyFile,
    WorkingCopyId,
};

/// Errors from catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    #[error("project already exists: {0}")]
    ProjectExists(ProjectId),
    #[error("upload not found: {0}")]
    UploadNotFound(UploadId),
    #[error("revision not found: {0}")]
    RevisionNotFound(RevisionId),
    #[error("working copy not found: {0}")]
    WorkingCopyNotFound(WorkingCopyId),
    #[error("audit run not found: {0}")]
    AuditRunNotFound(AuditRunId),
    #[error("an active audit run already exists for project {project_id}: {existing}")]
    ActiveAuditRunConflict {
        project_id: ProjectId,
        existing: AuditRunId,
    },
    #[error("an active working copy already exists for this base revision: {existing}")]
    ActiveWorkingCopyConflict { existing: WorkingCopyId },
    #[error("audit run {id} is {status}, cannot become {wanted}")]
    InvalidTransition {
        id: AuditRunId,
        status: AuditStatus,
        wanted: AuditStatus,
    },
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

struct Inner {
    catalog: Catalog,
    journal: Option<Journal>,
}

/// The serializing authority over all durable state.
pub struct CatalogStore {
    inner: Mutex<Inner>,
    snapshot_path: Option<PathBuf>,
}

impl CatalogStore {
    /// Open the store from a state directory: load the snapshot if any,
    /// then replay journal entries past its sequence.
    pub fn open(state_dir: &Path) -> Result<Self, CatalogError> {
        let snapshot_path = state_dir.join("catalog.snapshot");
        let journal_path = state_dir.join("catalog.journal");

        let snapshot = Snapshot::load(&snapshot_path)?;
        let (snapshot_seq, mut catalog) = match snapshot {
            Some(s) => (s.seq, s.catalog),
            None => (0, Catalog::default()),
        };

        let (journal, entries) = Journal::open(&journal_path)?;
        let mut replayed = 0usize;
        for entry in &entries {
            if entry.seq > snapshot_seq {
                catalog.apply(&entry.event);
                replayed += 1;
            }
        }
        info!(
            snapshot_seq,
            replayed,
            path = %state_dir.display(),
            "catalog opened",
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                catalog,
                journal: Some(journal),
            }),
            snapshot_path: Some(snapshot_path),
        })
    }

    /// A store with no durability. Used by tests and embedded tooling.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                catalog: Catalog::default(),
                journal: None,
            }),
            snapshot_path: None,
        }
    }

    /// Read the catalog under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.catalog)
    }

    /// Persist a snapshot and truncate the journal. The snapshot rename is
    /// durable before the journal shrinks.
    pub fn checkpoint(&self) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let seq = inner.journal.as_ref().map(|j| j.write_seq()).unwrap_or(0);
        Snapshot::new(seq, inner.catalog.clone()).save(path)?;
        if let Some(journal) = inner.journal.as_mut() {
            journal.truncate()?;
        }
        Ok(())
    }

    fn commit(inner: &mut Inner, events: Vec<CatalogEvent>) -> Result<(), CatalogError> {
        if let Some(journal) = inner.journal.as_mut() {
            journal.append_commit(&events)?;
        }
        for event in &events {
            inner.catalog.apply(event);
        }
        Ok(())
    }

    // -- projects --

    pub fn create_project(&self, project: Project) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if inner.catalog.projects.contains_key(&project.id) {
            return Err(CatalogError::ProjectExists(project.id));
        }
        Self::commit(&mut inner, vec![CatalogEvent::ProjectCreated { project }])
    }

    pub fn set_project_lifecycle(
        &self,
        id: &ProjectId,
        lifecycle: ProjectLifecycle,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.projects.contains_key(id) {
            return Err(CatalogError::ProjectNotFound(id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::ProjectLifecycleChanged {
                id: id.clone(),
                lifecycle,
            }],
        )
    }

    // -- uploads --

    pub fn create_upload(&self, upload: Upload) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![CatalogEvent::UploadCreated { upload }])
    }

    pub fn set_upload_status(
        &self,
        id: &UploadId,
        status: UploadStatus,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.uploads.contains_key(id) {
            return Err(CatalogError::UploadNotFound(id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::UploadStatusChanged {
                id: id.clone(),
                status,
            }],
        )
    }

    pub fn delete_upload(&self, id: &UploadId) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![CatalogEvent::UploadDeleted { id: id.clone() }])
    }

    // -- blobs --

    /// Insert a blob row, or return the winner when the digest already
    /// exists (the unique-digest race resolves by re-read).
    pub fn insert_blob(&self, blob: FileBlob) -> Result<FileBlob, CatalogError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.catalog.blobs.get(&blob.digest) {
            return Ok(existing.clone());
        }
        let stored = blob.clone();
        Self::commit(&mut inner, vec![CatalogEvent::BlobInserted { blob }])?;
        Ok(stored)
    }

    pub fn delete_blob(&self, digest: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::BlobDeleted {
                digest: digest.to_string(),
            }],
        )
    }

    // -- revisions --

    pub fn create_revision(&self, revision: Revision) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.projects.contains_key(&revision.project_id) {
            return Err(CatalogError::ProjectNotFound(revision.project_id.clone()));
        }
        Self::commit(&mut inner, vec![CatalogEvent::RevisionCreated { revision }])
    }

    pub fn upsert_revision_file(&self, file: RevisionFile) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.revisions.contains_key(&file.revision_id) {
            return Err(CatalogError::RevisionNotFound(file.revision_id.clone()));
        }
        Self::commit(&mut inner, vec![CatalogEvent::RevisionFileUpserted { file }])
    }

    pub fn clear_revision_files(&self, id: &RevisionId) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::RevisionFilesCleared { id: id.clone() }],
        )
    }

    // -- working copies --

    /// Insert a working copy with its initial files in one transaction.
    /// The active-uniqueness index on `(owner, base revision)` surfaces the
    /// existing copy on conflict.
    pub fn insert_working_copy(
        &self,
        copy: WorkingCopy,
        files: Vec<WorkingCopyFile>,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .catalog
            .active_copy_for(&copy.owner, &copy.base_revision_id)
        {
            return Err(CatalogError::ActiveWorkingCopyConflict {
                existing: existing.id.clone(),
            });
        }
        let mut events = vec![CatalogEvent::WorkingCopyCreated { copy }];
        events.extend(
            files
                .into_iter()
                .map(|file| CatalogEvent::WorkingCopyFileSaved { file }),
        );
        Self::commit(&mut inner, events)
    }

    pub fn save_working_copy_file(&self, file: WorkingCopyFile) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.working_copies.contains_key(&file.working_copy_id) {
            return Err(CatalogError::WorkingCopyNotFound(file.working_copy_id.clone()));
        }
        Self::commit(&mut inner, vec![CatalogEvent::WorkingCopyFileSaved { file }])
    }

    pub fn archive_working_copy(&self, id: &WorkingCopyId) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.working_copies.contains_key(id) {
            return Err(CatalogError::WorkingCopyNotFound(id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::WorkingCopyArchived { id: id.clone() }],
        )
    }

    // -- audit runs --

    /// Insert a queued run, enforcing at most one active run per project.
    pub fn insert_audit_run(&self, run: AuditRun) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::check_no_active_run(&inner.catalog, &run.project_id)?;
        Self::commit(&mut inner, vec![CatalogEvent::AuditRunCreated { run }])
    }

    /// Create a working-copy revision, its files, and a queued audit run
    /// in one transaction (the `snapshot` operation).
    pub fn commit_snapshot(
        &self,
        revision: Revision,
        files: Vec<RevisionFile>,
        run: AuditRun,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.projects.contains_key(&revision.project_id) {
            return Err(CatalogError::ProjectNotFound(revision.project_id.clone()));
        }
        Self::check_no_active_run(&inner.catalog, &run.project_id)?;

        let mut events = vec![CatalogEvent::RevisionCreated { revision }];
        events.extend(
            files
                .into_iter()
                .map(|file| CatalogEvent::RevisionFileUpserted { file }),
        );
        events.push(CatalogEvent::AuditRunCreated { run });
        Self::commit(&mut inner, events)
    }

    fn check_no_active_run(catalog: &Catalog, project: &ProjectId) -> Result<(), CatalogError> {
        if let Some(existing) = catalog.active_runs.get(project) {
            return Err(CatalogError::ActiveAuditRunConflict {
                project_id: project.clone(),
                existing: existing.clone(),
            });
        }
        Ok(())
    }

    /// `queued → running`. A run already running is a no-op (stage retry);
    /// a terminal run is an invalid transition.
    pub fn mark_audit_run_running(
        &self,
        id: &AuditRunId,
        now_ms: u64,
    ) -> Result<AuditRun, CatalogError> {
        let mut inner = self.inner.lock();
        let run = inner
            .catalog
            .audit_runs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::AuditRunNotFound(id.clone()))?;
        match run.status {
            AuditStatus::Running => Ok(run),
            AuditStatus::Queued => {
                Self::commit(
                    &mut inner,
                    vec![CatalogEvent::AuditRunStarted {
                        id: id.clone(),
                        at_ms: now_ms,
                    }],
                )?;
                Ok(inner.catalog.audit_runs[id].clone())
            }
            status => Err(CatalogError::InvalidTransition {
                id: id.clone(),
                status,
                wanted: AuditStatus::Running,
            }),
        }
    }

    pub fn store_audit_report(
        &self,
        id: &AuditRunId,
        report: serde_json::Value,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.catalog.audit_runs.contains_key(id) {
            return Err(CatalogError::AuditRunNotFound(id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::AuditRunReportStored {
                id: id.clone(),
                report,
            }],
        )
    }

    pub fn complete_audit_run(
        &self,
        id: &AuditRunId,
        now_ms: u64,
    ) -> Result<AuditRun, CatalogError> {
        let mut inner = self.inner.lock();
        let run = inner
            .catalog
            .audit_runs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::AuditRunNotFound(id.clone()))?;
        if !run.status.can_transition(AuditStatus::Completed) {
            return Err(CatalogError::InvalidTransition {
                id: id.clone(),
                status: run.status,
                wanted: AuditStatus::Completed,
            });
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::AuditRunCompleted {
                id: id.clone(),
                at_ms: now_ms,
            }],
        )?;
        Ok(inner.catalog.audit_runs[id].clone())
    }

    /// Stamp a run failed. Already-terminal runs are left untouched, which
    /// makes failure paths safe to replay.
    pub fn fail_audit_run(
        &self,
        id: &AuditRunId,
        error: &str,
        now_ms: u64,
    ) -> Result<AuditRun, CatalogError> {
        let mut inner = self.inner.lock();
        let run = inner
            .catalog
            .audit_runs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::AuditRunNotFound(id.clone()))?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::AuditRunFailed {
                id: id.clone(),
                error: error.to_string(),
                at_ms: now_ms,
            }],
        )?;
        Ok(inner.catalog.audit_runs[id].clone())
    }

    /// Cancel a run. Only reachable from the admin surface; the pipeline
    /// itself never writes this state.
    pub fn cancel_audit_run(
        &self,
        id: &AuditRunId,
        now_ms: u64,
    ) -> Result<AuditRun, CatalogError> {
        let mut inner = self.inner.lock();
        let run = inner
            .catalog
            .audit_runs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::AuditRunNotFound(id.clone()))?;
        if !run.status.can_transition(AuditStatus::Cancelled) {
            return Err(CatalogError::InvalidTransition {
                id: id.clone(),
                status: run.status,
                wanted: AuditStatus::Cancelled,
            });
        }
        Self::commit(
            &mut inner,
            vec![CatalogEvent::AuditRunCancelled {
                id: id.clone(),
                at_ms: now_ms,
            }],
        )?;
        Ok(inner.catalog.audit_runs[id].clone())
    }

    // -- findings --

    /// Record a reported finding inside a run: insert the Finding row when
    /// the `(project, fingerprint)` pair is new, refresh `last_seen`, and
    /// upsert the `(finding, run)` instance.
    ///
    /// `candidate_id` is used only when a new row is inserted.
    pub fn record_finding(
        &self,
        project_id: &ProjectId,
        revision_id: &RevisionId,
        audit_run_id: &AuditRunId,
        payload: &ReportFinding,
        candidate_id: FindingId,
        now_ms: u64,
    ) -> Result<FindingId, CatalogError> {
        let mut inner = self.inner.lock();

        let fp = fingerprint(
            &payload.title,
            &payload.file_path,
            payload.start_line,
            payload.end_line,
            payload.severity,
        );

        let mut events = Vec::new();
        let finding_id = match inner.catalog.finding_by_fingerprint(project_id, &fp) {
            Some(existing) => {
                let id = existing.id.clone();
                events.push(CatalogEvent::FindingStatusChanged {
                    id: id.clone(),
                    status: existing.current_status,
                    last_seen: Some(revision_id.clone()),
                });
                id
            }
            None => {
                let finding = Finding {
                    id: candidate_id.clone(),
                    project_id: project_id.clone(),
                    fingerprint: fp,
                    title: payload.title.clone(),
                    current_status: FindingStatus::Opened,
                    first_seen_revision: revision_id.clone(),
                    last_seen_revision: revision_id.clone(),
                    created_at_ms: now_ms,
                };
                events.push(CatalogEvent::FindingInserted { finding });
                candidate_id
            }
        };

        events.push(CatalogEvent::FindingInstanceUpserted {
            instance: FindingInstance {
                finding_id: finding_id.clone(),
                audit_run_id: audit_run_id.clone(),
                severity: payload.severity,
                payload: payload.clone(),
                created_at_ms: now_ms,
            },
        });

        Self::commit(&mut inner, events)?;
        Ok(finding_id)
    }

    pub fn set_finding_status(
        &self,
        id: &FindingId,
        status: FindingStatus,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::FindingStatusChanged {
                id: id.clone(),
                status,
                last_seen: None,
            }],
        )
    }

    pub fn record_transition(&self, transition: FindingTransition) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::FindingTransitionRecorded { transition }],
        )
    }

    // -- verification / pdf --

    pub fn record_verification_step(&self, step: VerificationStep) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::VerificationStepRecorded { step }],
        )
    }

    pub fn upsert_pdf_export(&self, export: PdfExport) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![CatalogEvent::PdfExportUpserted { export }])
    }

    pub fn delete_pdf_export(&self, id: &AuditRunId, variant: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            vec![CatalogEvent::PdfExportDeleted {
                id: id.clone(),
                variant: variant.to_string(),
            }],
        )
    }

    // -- job events --

    /// Append to the durable job event log, assigning the next sequence.
    pub fn append_job_event(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: EventPayload,
        now_ms: u64,
    ) -> Result<JobEvent, CatalogError> {
        let mut inner = self.inner.lock();
        let event = JobEvent {
            seq: inner.catalog.next_event_seq,
            queue,
            job_id: job_id.to_string(),
            created_at_ms: now_ms,
            payload,
        };
        Self::commit(
            &mut inner,
            vec![CatalogEvent::JobEventAppended {
                event: event.clone(),
            }],
        )?;
        Ok(event)
    }

    /// Trim job events older than the cutoff. Returns the number removed.
    pub fn trim_job_events(&self, before_ms: u64) -> Result<usize, CatalogError> {
        let mut inner = self.inner.lock();
        let before = inner.catalog.job_events.len();
        Self::commit(&mut inner, vec![CatalogEvent::JobEventsTrimmed { before_ms }])?;
        Ok(before - inner.catalog.job_events.len())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
