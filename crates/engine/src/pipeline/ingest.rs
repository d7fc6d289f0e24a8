// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingest stage: validate the uploaded payload, write revision files, and
//! hand the revision to verification.

use super::{StageDeps, StageWork};
use crate::queue::{JobContext, StageError};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;
use tar::Archive;
use tracing::{info, warn};
use warden_core::{
    normalize_path, validate_entries, ArchiveEntry, AuditRun, Language, ProjectLifecycle, Stage,
    StagePayload, Upload, UploadKind, UploadStatus,
};

/// What happens to an `initializing` project when its ingest fails.
///
/// The observed behavior of the platform is to return the project to
/// `ready` rather than delete it; a future `Delete` variant would hook in
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestFailurePolicy {
    RestoreReady,
}

pub const INGEST_FAILURE_POLICY: IngestFailurePolicy = IngestFailurePolicy::RestoreReady;

pub(crate) struct IngestWork;

#[async_trait]
impl StageWork for IngestWork {
    fn stage(&self) -> Stage {
        Stage::Ingest
    }

    async fn work(
        &self,
        deps: &StageDeps,
        payload: &StagePayload,
        run: &AuditRun,
        _job: &JobContext,
    ) -> Result<(), StageError> {
        let result = ingest(deps, payload, run).await;
        if result.is_err() {
            apply_failure_policy(deps, payload).await;
        }
        result
    }
}

async fn ingest(
    deps: &StageDeps,
    payload: &StagePayload,
    run: &AuditRun,
) -> Result<(), StageError> {
    let project = deps
        .catalog
        .read(|c| c.project(&payload.project_id).cloned())
        .ok_or_else(|| StageError::Fatal(format!("project not found: {}", payload.project_id)))?;

    match &payload.upload_id {
        None => {
            // Working-copy snapshots sealed their revision files in the
            // snapshot transaction; only the file set needs checking.
            let files = deps.catalog.read(|c| c.files_of(&run.revision_id));
            if files.is_empty() {
                return Err(StageError::Fatal("empty file set".to_string()));
            }
        }
        Some(upload_id) => {
            let upload = deps
                .catalog
                .read(|c| c.upload(upload_id).cloned())
                .ok_or_else(|| StageError::Fatal(format!("upload not found: {upload_id}")))?;

            deps.catalog
                .set_upload_status(upload_id, UploadStatus::Processing)?;
            let count = ingest_upload(deps, run, &upload).await?;
            if count == 0 {
                return Err(StageError::Fatal("empty file set".to_string()));
            }
            deps.catalog
                .set_upload_status(upload_id, UploadStatus::Processed)?;
            info!(upload = %upload_id, files = count, "upload ingested");
        }
    }

    if project.lifecycle == ProjectLifecycle::Initializing {
        deps.catalog
            .set_project_lifecycle(&payload.project_id, ProjectLifecycle::Ready)?;
    }
    Ok(())
}

/// Write the upload's files into the run's revision. Returns how many
/// files landed.
async fn ingest_upload(
    deps: &StageDeps,
    run: &AuditRun,
    upload: &Upload,
) -> Result<usize, StageError> {
    match upload.kind {
        UploadKind::Single => {
            let bytes = deps.content.get_blob_bytes(&upload.storage_key).await?;
            let path = normalize_path(&upload.name)
                .map_err(|e| StageError::Validation(e.to_string()))?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            deps.revisions
                .upsert_revision_file(
                    &run.revision_id,
                    &path,
                    Language::detect(&path),
                    warden_core::language::is_test_path(&path),
                    &content,
                )
                .await?;
            Ok(1)
        }
        UploadKind::Archive => {
            let bytes = deps.content.get_blob_bytes(&upload.storage_key).await?;
            let files = extract_archive(deps, &bytes)?;
            write_files(deps, run, files).await
        }
        UploadKind::FileSet => {
            let manifest = upload
                .manifest
                .clone()
                .ok_or_else(|| StageError::Validation("file-set upload without manifest".into()))?;
            let entries: Vec<ArchiveEntry> =
                manifest.iter().map(|m| m.entry.clone()).collect();
            let validated = validate_entries(&entries, deps.config.archive)
                .map_err(|e| StageError::Validation(e.to_string()))?;

            let key_by_path: HashMap<String, &str> = manifest
                .iter()
                .filter_map(|m| {
                    normalize_path(&m.entry.path)
                        .ok()
                        .map(|p| (p, m.storage_key.as_str()))
                })
                .collect();

            let mut files = Vec::with_capacity(validated.len());
            for entry in validated {
                let Some(key) = key_by_path.get(&entry.path) else {
                    continue;
                };
                let bytes = deps.content.get_blob_bytes(key).await?;
                files.push((entry, String::from_utf8_lossy(&bytes).into_owned()));
            }
            write_files(deps, run, files).await
        }
    }
}

/// Validate archive entry headers, then extract only the accepted entries.
/// Header validation runs before any content is read.
fn extract_archive(
    deps: &StageDeps,
    bytes: &[u8],
) -> Result<Vec<(warden_core::ValidatedEntry, String)>, StageError> {
    // First pass: headers only.
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut headers = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| StageError::Validation(format!("unreadable archive: {e}")))?
    {
        let entry = entry.map_err(|e| StageError::Validation(format!("unreadable archive: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| StageError::Validation(format!("unreadable archive path: {e}")))?
            .to_string_lossy()
            .into_owned();
        headers.push(ArchiveEntry::new(path, entry.size()));
    }

    let validated = validate_entries(&headers, deps.config.archive)
        .map_err(|e| StageError::Validation(e.to_string()))?;
    let mut wanted: HashMap<String, warden_core::ValidatedEntry> = validated
        .into_iter()
        .map(|v| (v.path.clone(), v))
        .collect();

    // Second pass: contents of accepted entries, first occurrence wins.
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = Vec::with_capacity(wanted.len());
    for entry in archive
        .entries()
        .map_err(|e| StageError::Validation(format!("unreadable archive: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| StageError::Validation(format!("unreadable archive: {e}")))?;
        let Ok(raw_path) = entry.path() else {
            continue;
        };
        let Ok(path) = normalize_path(&raw_path.to_string_lossy()) else {
            continue;
        };
        let Some(validated) = wanted.remove(&path) else {
            continue;
        };
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| StageError::Validation(format!("unreadable archive entry {path}: {e}")))?;
        files.push((validated, content));
    }
    Ok(files)
}

async fn write_files(
    deps: &StageDeps,
    run: &AuditRun,
    files: Vec<(warden_core::ValidatedEntry, String)>,
) -> Result<usize, StageError> {
    let count = files.len();
    for (entry, content) in files {
        deps.revisions
            .upsert_revision_file(
                &run.revision_id,
                &entry.path,
                entry.language,
                entry.is_test_file,
                &content,
            )
            .await?;
    }
    Ok(count)
}

/// Failure epilogue: the upload is stamped failed, and the project comes
/// back to `ready` per [`INGEST_FAILURE_POLICY`].
async fn apply_failure_policy(deps: &StageDeps, payload: &StagePayload) {
    if let Some(upload_id) = &payload.upload_id {
        if let Err(e) = deps.catalog.set_upload_status(upload_id, UploadStatus::Failed) {
            warn!(upload = %upload_id, error = %e, "could not stamp upload failed");
        }
    }
    let project = deps
        .catalog
        .read(|c| c.project(&payload.project_id).cloned());
    if let Some(project) = project {
        if project.lifecycle == ProjectLifecycle::Initializing {
            match INGEST_FAILURE_POLICY {
                IngestFailurePolicy::RestoreReady => {
                    if let Err(e) = deps
                        .catalog
                        .set_project_lifecycle(&payload.project_id, ProjectLifecycle::Ready)
                    {
                        warn!(project = %payload.project_id, error = %e, "could not restore project");
                    }
                }
            }
        }
    }
}
