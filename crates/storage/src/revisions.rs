// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Revision and working-copy operations over the catalog and content store

use crate::content::{mime_for_path, BlobKeyHint, ContentError, ContentStore};
use crate::store::{CatalogError, CatalogStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use warden_core::{
    normalize_path, AuditProfile, AuditRun, AuditRunConfig, AuditRunId, Clock, IdSource, Language,
    PathError, ProjectId, Revision, RevisionFile, RevisionId, RevisionSource, UserId,
    WorkingCopy, WorkingCopyFile, WorkingCopyId, WorkingCopyStatus,
};

/// Errors from revision operations
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("an audit run is already active for this project: {existing}")]
    ActiveAuditRunConflict { existing: AuditRunId },
    #[error("working copy not found: {0}")]
    WorkingCopyNotFound(WorkingCopyId),
}

/// Models and parameters for a working-copy snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub profile: AuditProfile,
    pub requested_by: UserId,
    pub primary_model_id: String,
    pub fallback_model_id: String,
}

/// Revision model operations: sealing snapshots, materializing working
/// copies, writing revision files through the content store.
#[derive(Clone)]
pub struct RevisionStore {
    catalog: Arc<CatalogStore>,
    content: ContentStore,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl RevisionStore {
    pub fn new(
        catalog: Arc<CatalogStore>,
        content: ContentStore,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            catalog,
            content,
            clock,
            ids,
        }
    }

    /// Ensure a blob for `content`, then insert-or-update the
    /// `(revision, path)` row. The raw path is normalized first; unsafe
    /// paths are rejected.
    pub async fn upsert_revision_file(
        &self,
        revision_id: &RevisionId,
        raw_path: &str,
        language: Language,
        is_test_file: bool,
        content: &str,
    ) -> Result<RevisionFile, RevisionError> {
        let path = normalize_path(raw_path)?;
        let blob = self
            .content
            .put_blob(
                content.as_bytes(),
                mime_for_path(&path),
                BlobKeyHint::RevisionFile(revision_id),
            )
            .await?;

        let file = RevisionFile {
            revision_id: revision_id.clone(),
            path,
            digest: blob.digest,
            language,
            is_test_file,
        };
        self.catalog.upsert_revision_file(file.clone())?;
        Ok(file)
    }

    /// Delete all revision-file rows. Blobs stay: they may be shared with
    /// other revisions.
    pub fn clear_revision_files(&self, revision_id: &RevisionId) -> Result<(), RevisionError> {
        self.catalog.clear_revision_files(revision_id)?;
        Ok(())
    }

    /// Snapshot a working copy into a new revision and a queued audit run,
    /// atomically. Blobs are content-addressed and ensured before the
    /// transaction; the row writes and the single-active check happen in
    /// one commit.
    pub async fn snapshot_working_copy(
        &self,
        project_id: &ProjectId,
        working_copy_id: &WorkingCopyId,
        params: SnapshotParams,
    ) -> Result<(Revision, AuditRun), RevisionError> {
        let (copy, files) = self
            .catalog
            .read(|c| {
                c.working_copy(working_copy_id)
                    .cloned()
                    .map(|copy| (copy, c.working_copy_files_of(working_copy_id)))
            })
            .ok_or_else(|| RevisionError::WorkingCopyNotFound(working_copy_id.clone()))?;

        let now = self.clock.epoch_ms();
        let revision = Revision::new(
            RevisionId::new(self.ids.fresh()),
            project_id.clone(),
            RevisionSource::WorkingCopy,
            format!("snapshot of working copy {}", copy.id),
            now,
        )
        .with_parent(copy.base_revision_id.clone());

        let mut revision_files = Vec::with_capacity(files.len());
        for file in &files {
            let blob = self
                .content
                .put_blob(
                    file.content.as_bytes(),
                    mime_for_path(&file.path),
                    BlobKeyHint::RevisionFile(&revision.id),
                )
                .await?;
            revision_files.push(RevisionFile {
                revision_id: revision.id.clone(),
                path: file.path.clone(),
                digest: blob.digest,
                language: file.language,
                is_test_file: file.is_test_file,
            });
        }

        let run = AuditRun::new(
            AuditRunConfig {
                id: AuditRunId::new(self.ids.fresh()),
                project_id: project_id.clone(),
                revision_id: revision.id.clone(),
                profile: params.profile,
                requested_by: params.requested_by,
                primary_model_id: params.primary_model_id,
                fallback_model_id: params.fallback_model_id,
            },
            now,
        );

        match self
            .catalog
            .commit_snapshot(revision.clone(), revision_files, run.clone())
        {
            Ok(()) => {
                info!(
                    revision = %revision.id,
                    audit_run = %run.id,
                    "working copy snapshotted",
                );
                Ok((revision, run))
            }
            Err(CatalogError::ActiveAuditRunConflict { existing, .. }) => {
                Err(RevisionError::ActiveAuditRunConflict { existing })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create (or return) the active working copy for `(user, revision)`.
    /// File contents are materialized inline by reading blobs back through
    /// the content store.
    pub async fn create_working_copy(
        &self,
        project_id: &ProjectId,
        revision_id: &RevisionId,
        user: &UserId,
    ) -> Result<WorkingCopy, RevisionError> {
        if let Some(existing) = self
            .catalog
            .read(|c| c.active_copy_for(user, revision_id).cloned())
        {
            return Ok(existing);
        }

        let revision_files = self.catalog.read(|c| c.files_of(revision_id));
        let now = self.clock.epoch_ms();
        let copy = WorkingCopy {
            id: WorkingCopyId::new(self.ids.fresh()),
            project_id: project_id.clone(),
            base_revision_id: revision_id.clone(),
            owner: user.clone(),
            status: WorkingCopyStatus::Active,
            created_at_ms: now,
        };

        let mut files = Vec::with_capacity(revision_files.len());
        for rf in &revision_files {
            let storage_key = self
                .catalog
                .read(|c| c.blob(&rf.digest).map(|b| b.storage_key.clone()));
            let Some(storage_key) = storage_key else {
                continue;
            };
            let bytes = self.content.get_blob_bytes(&storage_key).await?;
            files.push(WorkingCopyFile {
                working_copy_id: copy.id.clone(),
                path: rf.path.clone(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
                language: rf.language,
                is_test_file: rf.is_test_file,
            });
        }

        match self.catalog.insert_working_copy(copy.clone(), files) {
            Ok(()) => Ok(copy),
            // Lost the race: re-read the winning row.
            Err(CatalogError::ActiveWorkingCopyConflict { existing }) => self
                .catalog
                .read(|c| c.working_copy(&existing).cloned())
                .ok_or(CatalogError::WorkingCopyNotFound(existing).into()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "revisions_tests.rs"]
mod tests;
