// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention sweeping: expired exports, stale uploads, old job events.
//!
//! Objects are deleted from the store before their rows; a failed object
//! delete leaves the row in place so the next sweep retries it.

use crate::object::ObjectStore;
use crate::store::{CatalogError, CatalogStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use warden_core::{UploadStatus, PdfExport, Upload};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Errors from a retention sweep
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub exports_deleted: usize,
    pub uploads_deleted: usize,
    pub events_trimmed: usize,
}

/// Delete everything older than `retention_days`.
pub async fn sweep(
    catalog: &Arc<CatalogStore>,
    objects: &Arc<dyn ObjectStore>,
    now_ms: u64,
    retention_days: u32,
) -> Result<SweepReport, RetentionError> {
    let cutoff_ms = now_ms.saturating_sub(u64::from(retention_days) * DAY_MS);
    let mut report = SweepReport::default();

    let expired_exports: Vec<PdfExport> = catalog.read(|c| {
        c.pdf_exports
            .values()
            .flat_map(|by_variant| by_variant.values())
            .filter(|e| e.created_at_ms < cutoff_ms)
            .cloned()
            .collect()
    });

    for export in expired_exports {
        if let Some(key) = &export.storage_key {
            if let Err(e) = objects.delete(key).await {
                warn!(key = %key, error = %e, "failed to delete expired export object, keeping row");
                continue;
            }
        }
        catalog.delete_pdf_export(&export.audit_run_id, &export.variant)?;
        report.exports_deleted += 1;
    }

    let stale_uploads: Vec<Upload> = catalog.read(|c| {
        c.uploads
            .values()
            .filter(|u| u.created_at_ms < cutoff_ms && u.status != UploadStatus::Processing)
            .cloned()
            .collect()
    });

    for upload in stale_uploads {
        if let Err(e) = objects.delete(&upload.storage_key).await {
            warn!(key = %upload.storage_key, error = %e, "failed to delete stale upload object, keeping row");
            continue;
        }
        catalog.delete_upload(&upload.id)?;
        report.uploads_deleted += 1;
    }

    report.events_trimmed = catalog.trim_job_events(cutoff_ms)?;

    info!(
        exports = report.exports_deleted,
        uploads = report.uploads_deleted,
        events = report.events_trimmed,
        "retention sweep finished",
    );
    Ok(report)
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
