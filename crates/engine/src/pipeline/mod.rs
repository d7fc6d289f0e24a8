// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline orchestration.
//!
//! Each stage loads its audit run, short-circuits if the run is already
//! terminal, does its work while publishing progress, then enqueues the
//! next stage. Failures stamp the run and append a `failed` event; the
//! pipeline never skips past a failed stage.

pub(crate) mod audit;
pub(crate) mod cleanup;
pub(crate) mod ingest;
pub(crate) mod lifecycle;
pub(crate) mod pdf;
pub(crate) mod verify;

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::queue::{JobContext, JobHandler, QueueHandle, QueueRuntime, StageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use warden_adapters::{LlmClient, PdfRenderer, SandboxRunner};
use warden_core::{
    stage_job_id, AuditRun, AuditRunId, Clock, EventPayload, FailureKind, IdSource, Stage,
    StagePayload, UploadStatus,
};
use warden_storage::{
    CatalogError, CatalogStore, ContentError, ContentStore, ObjectStore, RevisionError,
    RevisionStore, StoreError,
};

/// Everything a stage handler needs, built once at bootstrap. Tests build
/// the same bundle from fakes.
#[derive(Clone)]
pub struct StageDeps {
    pub catalog: Arc<CatalogStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub content: ContentStore,
    pub revisions: RevisionStore,
    pub bus: Arc<EventBus>,
    pub queue: QueueHandle,
    pub sandbox: Arc<dyn SandboxRunner>,
    pub llm: Arc<dyn LlmClient>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdSource>,
    pub config: EngineConfig,
}

impl From<CatalogError> for StageError {
    fn from(e: CatalogError) -> Self {
        StageError::Fatal(e.to_string())
    }
}

impl From<ContentError> for StageError {
    fn from(e: ContentError) -> Self {
        match &e {
            ContentError::Store(store) if store.is_transient() => {
                StageError::Transient(e.to_string())
            }
            _ => StageError::Fatal(e.to_string()),
        }
    }
}

impl From<RevisionError> for StageError {
    fn from(e: RevisionError) -> Self {
        match &e {
            RevisionError::Path(_) => StageError::Validation(e.to_string()),
            RevisionError::Content(ContentError::Store(store)) if store.is_transient() => {
                StageError::Transient(e.to_string())
            }
            _ => StageError::Fatal(e.to_string()),
        }
    }
}

impl From<StoreError> for StageError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            StageError::Transient(e.to_string())
        } else {
            StageError::Fatal(e.to_string())
        }
    }
}

fn failure_kind(error: &StageError) -> FailureKind {
    match error {
        StageError::Validation(_) => FailureKind::Validation,
        StageError::Transient(_) => FailureKind::Transient,
        StageError::Fatal(_) => FailureKind::Fatal,
    }
}

/// The stage-specific body run inside the shared prologue/epilogue.
#[async_trait]
pub(crate) trait StageWork: Send + Sync {
    fn stage(&self) -> Stage;

    async fn work(
        &self,
        deps: &StageDeps,
        payload: &StagePayload,
        run: &AuditRun,
        job: &JobContext,
    ) -> Result<(), StageError>;
}

/// Generic chained-stage handler: prologue (load, short-circuit, mark
/// running, `started`), the work, epilogue (`completed` + next stage, or
/// run failure stamping).
pub(crate) struct PipelineStage<W> {
    deps: StageDeps,
    work: W,
}

impl<W> PipelineStage<W> {
    pub(crate) fn new(deps: StageDeps, work: W) -> Self {
        Self { deps, work }
    }
}

#[async_trait]
impl<W: StageWork> JobHandler for PipelineStage<W> {
    async fn run(&self, job: &JobContext) -> Result<(), StageError> {
        let deps = &self.deps;
        let stage = self.work.stage();
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
        if run.is_terminal() {
            info!(stage = %stage, run = %run.id, status = %run.status, "run already terminal, skipping");
            return Ok(());
        }

        let run = deps
            .catalog
            .mark_audit_run_running(&run.id, deps.clock.epoch_ms())?;
        let _ = deps
            .bus
            .publish(stage.queue(), &job.job_id, EventPayload::Started {});
        let started = Instant::now();

        match self.work.work(deps, &payload, &run, job).await {
            Ok(()) => {
                let _ = deps.bus.publish(
                    stage.queue(),
                    &job.job_id,
                    EventPayload::Completed {
                        elapsed_ms: Some(started.elapsed().as_millis() as u64),
                    },
                );
                if let Some(next) = stage.next() {
                    enqueue_stage(deps, next, &payload.project_id, &run.id)?;
                }
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                // Leave the run as-is: the queue retries this attempt and
                // the final-failure hook stamps the run if it never lands.
                warn!(stage = %stage, run = %run.id, error = %e, "stage attempt failed transiently");
                Err(e)
            }
            Err(e) => {
                error!(stage = %stage, run = %run.id, error = %e, "stage failed");
                fail_run(deps, stage, &job.job_id, &run.id, failure_kind(&e), &e.to_string());
                Err(e)
            }
        }
    }

    async fn on_final_failure(&self, job: &JobContext, reason: &str) {
        let deps = &self.deps;
        let stage = self.work.stage();
        let Ok(payload) = parse_payload(&job.payload) else {
            return;
        };
        let run = deps
            .catalog
            .read(|c| c.audit_run(&payload.audit_run_id).cloned());
        let Some(run) = run else {
            return;
        };
        if run.is_terminal() {
            // The failing attempt already stamped the run.
            return;
        }
        let kind = if reason.contains("deadline") {
            FailureKind::Deadline
        } else {
            FailureKind::Fatal
        };
        fail_run(deps, stage, &job.job_id, &run.id, kind, reason);
    }
}

pub(crate) fn parse_payload(payload: &serde_json::Value) -> Result<StagePayload, StageError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| StageError::Validation(format!("malformed stage payload: {e}")))
}

/// Stamp the run failed and append the `failed` event. Safe to call more
/// than once: terminal runs absorb.
pub(crate) fn fail_run(
    deps: &StageDeps,
    stage: Stage,
    job_id: &str,
    run_id: &AuditRunId,
    kind: FailureKind,
    message: &str,
) {
    if let Err(e) = deps
        .catalog
        .fail_audit_run(run_id, message, deps.clock.epoch_ms())
    {
        error!(run = %run_id, error = %e, "could not stamp run failed");
    }
    let _ = deps.bus.publish(
        stage.queue(),
        job_id,
        EventPayload::Failed {
            kind,
            message: message.to_string(),
        },
    );
}

/// Enqueue a chained stage with its canonical job id.
pub(crate) fn enqueue_stage(
    deps: &StageDeps,
    stage: Stage,
    project_id: &warden_core::ProjectId,
    run_id: &AuditRunId,
) -> Result<(), StageError> {
    let job_id = stage_job_id(stage, project_id, run_id);
    let payload = StagePayload::new(project_id.clone(), run_id.clone());
    let value = serde_json::to_value(&payload)
        .map_err(|e| StageError::Fatal(format!("payload serialization: {e}")))?;
    deps.queue
        .submit(stage.queue(), &job_id, value)
        .map_err(|e| StageError::Fatal(format!("enqueue {stage}: {e}")))?;
    Ok(())
}

/// Write an artifact with the storage retry policy.
pub(crate) async fn put_artifact(
    deps: &StageDeps,
    key: &str,
    bytes: &[u8],
) -> Result<(), StageError> {
    let policy = warden_core::RetryPolicy::storage();
    let mut attempt = 1;
    loop {
        match deps.objects.put(key, bytes).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                warn!(key, attempt, error = %e, "retrying artifact write");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Register every pipeline handler on the queue runtime.
pub fn register_stages(runtime: &QueueRuntime, deps: &StageDeps) {
    runtime.register(
        Stage::Ingest.queue(),
        Arc::new(PipelineStage::new(deps.clone(), ingest::IngestWork)),
    );
    runtime.register(
        Stage::Verify.queue(),
        Arc::new(PipelineStage::new(deps.clone(), verify::VerifyWork)),
    );
    runtime.register(
        Stage::Audit.queue(),
        Arc::new(PipelineStage::new(deps.clone(), audit::AuditWork)),
    );
    runtime.register(
        Stage::FindingLifecycle.queue(),
        Arc::new(PipelineStage::new(deps.clone(), lifecycle::LifecycleWork)),
    );
    runtime.register(
        Stage::Pdf.queue(),
        Arc::new(pdf::PdfStage::new(deps.clone())),
    );
    runtime.register(
        warden_core::QueueName::Cleanup,
        Arc::new(cleanup::CleanupStage::new(deps.clone())),
    );
}

/// Re-enqueue every non-terminal run at the stage its durable state proves
/// it reached. Called once at boot, after the catalog has been recovered.
pub fn recover(deps: &StageDeps) -> Vec<(AuditRunId, Stage)> {
    let active: Vec<AuditRun> = deps.catalog.read(|c| {
        c.audit_runs
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect()
    });

    let mut resumed = Vec::new();
    for run in active {
        let stage = if run.report_json.is_some() {
            Stage::FindingLifecycle
        } else if !deps
            .catalog
            .read(|c| c.verification_steps_of(&run.id).is_empty())
        {
            Stage::Audit
        } else if !deps.catalog.read(|c| c.files_of(&run.revision_id).is_empty()) {
            Stage::Verify
        } else {
            Stage::Ingest
        };

        let job_id = stage_job_id(stage, &run.project_id, &run.id);
        let mut payload = StagePayload::new(run.project_id.clone(), run.id.clone());
        if stage == Stage::Ingest {
            // The upload path needs its upload back; take the most recent
            // one still waiting on this project.
            let upload = deps.catalog.read(|c| {
                c.uploads
                    .values()
                    .filter(|u| {
                        u.project_id == run.project_id
                            && matches!(
                                u.status,
                                UploadStatus::Uploaded | UploadStatus::Processing
                            )
                    })
                    .max_by_key(|u| u.created_at_ms)
                    .map(|u| u.id.clone())
            });
            match upload {
                Some(id) => payload = payload.with_upload(id),
                None => {
                    warn!(run = %run.id, "no upload to recover ingest from, failing run");
                    fail_run(
                        deps,
                        Stage::Ingest,
                        &job_id,
                        &run.id,
                        FailureKind::Fatal,
                        "crash recovery found no upload for this run",
                    );
                    continue;
                }
            }
        }

        let value = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                error!(run = %run.id, error = %e, "recovery payload serialization failed");
                continue;
            }
        };
        match deps.queue.submit(stage.queue(), &job_id, value) {
            Ok(_) => {
                info!(run = %run.id, stage = %stage, "resumed after restart");
                resumed.push((run.id.clone(), stage));
            }
            Err(e) => error!(run = %run.id, error = %e, "could not resume run"),
        }
    }
    resumed
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
