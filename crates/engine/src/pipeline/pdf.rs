// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PDF export stage. Externally submitted, only valid for completed runs;
//! rendering is delegated and the result stored under the export key.

use super::{parse_payload, put_artifact, StageDeps};
use crate::queue::{JobContext, JobHandler, StageError};
use async_trait::async_trait;
use tracing::warn;
use warden_core::{
    AuditStatus, EventPayload, FailureKind, PdfExport, PdfExportStatus, StagePayload,
    PDF_VARIANT_FINAL,
};
use warden_storage::keys;

pub(crate) struct PdfStage {
    deps: StageDeps,
}

impl PdfStage {
    pub(crate) fn new(deps: StageDeps) -> Self {
        Self { deps }
    }

    fn upsert_export(&self, payload: &StagePayload, status: PdfExportStatus, storage_key: Option<String>) {
        let now = self.deps.clock.epoch_ms();
        let existing = self.deps.catalog.read(|c| {
            c.pdf_export(&payload.audit_run_id, PDF_VARIANT_FINAL).cloned()
        });
        let export = PdfExport {
            audit_run_id: payload.audit_run_id.clone(),
            variant: PDF_VARIANT_FINAL.to_string(),
            status,
            storage_key: storage_key.or_else(|| existing.as_ref().and_then(|e| e.storage_key.clone())),
            generated_at_ms: if status == PdfExportStatus::Completed {
                Some(now)
            } else {
                existing.as_ref().and_then(|e| e.generated_at_ms)
            },
            created_at_ms: existing.map(|e| e.created_at_ms).unwrap_or(now),
        };
        if let Err(e) = self.deps.catalog.upsert_pdf_export(export) {
            warn!(run = %payload.audit_run_id, error = %e, "could not record pdf export");
        }
    }

    fn publish_failed(&self, job: &JobContext, kind: FailureKind, message: &str) {
        let _ = self.deps.bus.publish(
            job.queue,
            &job.job_id,
            EventPayload::Failed {
                kind,
                message: message.to_string(),
            },
        );
    }
}

#[async_trait]
impl JobHandler for PdfStage {
    async fn run(&self, job: &JobContext) -> Result<(), StageError> {
        let deps = &self.deps;
        let payload = parse_payload(&job.payload)?;

        let Some(run) = deps
            .catalog
            .read(|c| c.audit_run(&payload.audit_run_id).cloned())
        else {
            return Err(StageError::Fatal(format!(
                "audit run not found: {}",
                payload.audit_run_id
            )));
        };
        if run.status != AuditStatus::Completed {
            // No state change on validation rejects; the final-failure hook
            // publishes the failed event.
            return Err(StageError::Validation(format!(
                "audit run {} is {}, not completed",
                run.id, run.status
            )));
        }
        let Some(report) = run.report_json.clone() else {
            return Err(StageError::Fatal(format!(
                "audit run {} has no report",
                run.id
            )));
        };

        let _ = deps
            .bus
            .publish(job.queue, &job.job_id, EventPayload::Started {});
        self.upsert_export(&payload, PdfExportStatus::Running, None);

        let bytes = match deps.pdf.render(&report, PDF_VARIANT_FINAL).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.upsert_export(&payload, PdfExportStatus::Failed, None);
                return Err(StageError::Fatal(e.to_string()));
            }
        };

        let key = keys::pdf_final(&run.id, deps.clock.epoch_ms());
        put_artifact(deps, &key, &bytes).await?;

        self.upsert_export(&payload, PdfExportStatus::Completed, Some(key));
        let _ = deps.bus.publish(
            job.queue,
            &job.job_id,
            EventPayload::Completed { elapsed_ms: None },
        );
        Ok(())
    }

    async fn on_final_failure(&self, job: &JobContext, reason: &str) {
        // Validation rejects never created an export row; only stamp one
        // that exists.
        if let Ok(payload) = parse_payload(&job.payload) {
            let started = self.deps.catalog.read(|c| {
                c.pdf_export(&payload.audit_run_id, PDF_VARIANT_FINAL).is_some()
            });
            if started {
                self.upsert_export(&payload, PdfExportStatus::Failed, None);
            }
        }
        self.publish_failed(job, FailureKind::Fatal, reason);
    }
}
