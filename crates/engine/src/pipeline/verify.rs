// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verify stage: plan sandbox steps, drive the runner, persist artifacts.
//!
//! A sandbox outage degrades the run instead of failing it: verification
//! finishes as failed and the audit stage still gets its turn.

use super::{put_artifact, StageDeps, StageWork};
use crate::queue::{JobContext, StageError};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::warn;
use warden_adapters::{run_plan, SandboxError, SandboxEvent, SandboxFile, StepResult};
use warden_core::{
    build_plan, AuditRun, EventPayload, ProgressBody, SandboxPlan, SourceFile, Stage,
    StagePayload, StepAction, StepState, VerificationStep, VerificationStepStatus, VerifyPhase,
    VerifyProgress,
};
use warden_storage::keys;

pub(crate) struct VerifyWork;

#[async_trait]
impl StageWork for VerifyWork {
    fn stage(&self) -> Stage {
        Stage::Verify
    }

    async fn work(
        &self,
        deps: &StageDeps,
        payload: &StagePayload,
        run: &AuditRun,
        job: &JobContext,
    ) -> Result<(), StageError> {
        let sources = load_sources(deps, run).await?;
        if sources.is_empty() {
            return Err(StageError::Fatal("empty file set".to_string()));
        }

        let plan = build_plan(&sources, run.profile);
        let progress = ProgressState::new(&plan);
        publish_progress(deps, job, progress.snapshot(VerifyPhase::PlanReady, None));

        if plan.steps.is_empty() {
            publish_progress(deps, job, progress.snapshot(VerifyPhase::SandboxSkipped, None));
            record_sandbox_step(
                deps,
                run,
                VerificationStepStatus::Skipped,
                plan.unsupported_reasons.join("; "),
                0,
            )?;
            return Ok(());
        }

        let files: Vec<SandboxFile> = sources
            .iter()
            .map(|s| SandboxFile {
                path: s.path.clone(),
                content: s.content.clone(),
            })
            .collect();

        let sink = {
            let deps = deps.clone();
            let job = job.clone();
            let progress = progress.clone();
            move |event: &SandboxEvent| {
                on_sandbox_event(&deps, &job, &progress, event);
            }
        };

        let outcome = run_plan(
            deps.sandbox.as_ref(),
            &plan,
            files,
            payload.project_id.as_str(),
            run.revision_id.as_str(),
            job.deadline,
            &sink,
        )
        .await;

        match outcome {
            Ok(result) => {
                persist_results(deps, run, &plan, &result.results, &result.unsupported_actions)
                    .await?;
                publish_progress(deps, job, progress.snapshot(VerifyPhase::SandboxCompleted, None));
                Ok(())
            }
            Err(SandboxError::Unavailable(message)) => {
                // Degraded, not fatal: record the failure and move on.
                warn!(run = %run.id, error = %message, "sandbox unavailable, verification degraded");
                record_sandbox_step(deps, run, VerificationStepStatus::Failed, message, 0)?;
                publish_progress(deps, job, progress.snapshot(VerifyPhase::SandboxFailed, None));
                Ok(())
            }
            Err(e) => {
                record_sandbox_step(deps, run, VerificationStepStatus::Failed, e.to_string(), 0)?;
                publish_progress(deps, job, progress.snapshot(VerifyPhase::SandboxFailed, None));
                Err(StageError::Fatal(e.to_string()))
            }
        }
    }
}

/// Revision files with their blob contents.
pub(crate) async fn load_sources(
    deps: &StageDeps,
    run: &AuditRun,
) -> Result<Vec<SourceFile>, StageError> {
    let files = deps.catalog.read(|c| c.files_of(&run.revision_id));
    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        let Some(storage_key) =
            deps.catalog
                .read(|c| c.blob(&file.digest).map(|b| b.storage_key.clone()))
        else {
            return Err(StageError::Fatal(format!(
                "blob missing for {} ({})",
                file.path, file.digest
            )));
        };
        let bytes = deps.content.get_blob_bytes(&storage_key).await?;
        sources.push(SourceFile {
            path: file.path,
            content: String::from_utf8_lossy(&bytes).into_owned(),
            language: file.language,
            is_test_file: file.is_test_file,
        });
    }
    Ok(sources)
}

/// Step-status snapshot shared between the event callback and the stage.
#[derive(Clone)]
struct ProgressState {
    adapter: warden_core::Adapter,
    statuses: std::sync::Arc<Mutex<IndexMap<String, StepState>>>,
    scan_ids: Vec<String>,
}

impl ProgressState {
    fn new(plan: &SandboxPlan) -> Self {
        let statuses = plan
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepState::Pending))
            .collect();
        let scan_ids = plan
            .steps
            .iter()
            .filter(|s| {
                matches!(
                    s.action,
                    StepAction::SecuritySurfaceScan | StepAction::SecurityRulesScan
                )
            })
            .map(|s| s.id.clone())
            .collect();
        Self {
            adapter: plan.adapter,
            statuses: std::sync::Arc::new(Mutex::new(statuses)),
            scan_ids,
        }
    }

    fn set(&self, step_id: &str, state: StepState) {
        let mut statuses = self.statuses.lock();
        if let Some(slot) = statuses.get_mut(step_id) {
            *slot = state;
        }
    }

    fn is_scan(&self, step_id: &str) -> bool {
        self.scan_ids.iter().any(|id| id == step_id)
    }

    fn snapshot(&self, phase: VerifyPhase, current_step_id: Option<String>) -> VerifyProgress {
        let statuses = self.statuses.lock();
        VerifyProgress {
            phase,
            total_steps: statuses.len() as u32,
            current_step_id,
            adapter: self.adapter,
            step_statuses: statuses.clone(),
        }
    }
}

fn publish_progress(deps: &StageDeps, job: &JobContext, progress: VerifyProgress) {
    let _ = deps.bus.publish(
        job.queue,
        &job.job_id,
        EventPayload::Progress(ProgressBody::Verify(progress)),
    );
}

fn on_sandbox_event(
    deps: &StageDeps,
    job: &JobContext,
    progress: &ProgressState,
    event: &SandboxEvent,
) {
    match event {
        SandboxEvent::Started {} => {
            publish_progress(deps, job, progress.snapshot(VerifyPhase::SandboxRunning, None));
        }
        SandboxEvent::StepStarted { step_id } => {
            progress.set(step_id, StepState::Running);
            let phase = if progress.is_scan(step_id) {
                VerifyPhase::SecurityScan
            } else {
                VerifyPhase::SandboxRunning
            };
            publish_progress(deps, job, progress.snapshot(phase, Some(step_id.clone())));
        }
        SandboxEvent::StepFinished { step_id, result } => {
            let state = if result.success {
                StepState::Completed
            } else {
                StepState::Failed
            };
            progress.set(step_id, state);
            let _ = deps.bus.publish(
                job.queue,
                &job.job_id,
                EventPayload::SandboxStep {
                    step_id: step_id.clone(),
                    action: result.action.clone(),
                    status: state,
                    elapsed_ms: Some(result.duration_ms),
                },
            );
            if progress.is_scan(step_id) {
                let _ = deps.bus.publish(
                    job.queue,
                    &job.job_id,
                    EventPayload::SecurityScan {
                        step_id: step_id.clone(),
                        summary: result.summary.clone(),
                    },
                );
            }
        }
        SandboxEvent::Completed { .. } | SandboxEvent::Error { .. } => {}
    }
}

/// Store stdout/stderr artifacts and the per-step rows, plus the aggregate
/// sandbox-results and security-scans documents.
async fn persist_results(
    deps: &StageDeps,
    run: &AuditRun,
    plan: &SandboxPlan,
    results: &[StepResult],
    unsupported: &[String],
) -> Result<(), StageError> {
    let now = deps.clock.epoch_ms();
    for result in results {
        let stdout_key = keys::verification_stdout(&run.id, &result.step_id);
        let stderr_key = keys::verification_stderr(&run.id, &result.step_id);
        put_artifact(deps, &stdout_key, result.stdout.as_bytes()).await?;
        put_artifact(deps, &stderr_key, result.stderr.as_bytes()).await?;

        deps.catalog.record_verification_step(VerificationStep {
            audit_run_id: run.id.clone(),
            step_type: result.step_id.clone(),
            status: if result.success {
                VerificationStepStatus::Completed
            } else {
                VerificationStepStatus::Failed
            },
            stdout_key: Some(stdout_key),
            stderr_key: Some(stderr_key),
            summary: result.summary.clone(),
            duration_ms: result.duration_ms,
            created_at_ms: now,
        })?;
    }

    let aggregate = serde_json::json!({
        "adapter": plan.adapter,
        "results": results,
        "unsupported_actions": unsupported,
    });
    put_artifact(
        deps,
        &keys::verification_sandbox_results(&run.id),
        aggregate.to_string().as_bytes(),
    )
    .await?;

    let scans: Vec<&StepResult> = results
        .iter()
        .filter(|r| r.action.contains("security"))
        .collect();
    if !scans.is_empty() {
        let document = serde_json::json!({ "scans": scans });
        put_artifact(
            deps,
            &keys::verification_security_scans(&run.id),
            document.to_string().as_bytes(),
        )
        .await?;
    }
    Ok(())
}

/// One synthetic row for plan-level outcomes (skipped or unavailable).
fn record_sandbox_step(
    deps: &StageDeps,
    run: &AuditRun,
    status: VerificationStepStatus,
    summary: String,
    duration_ms: u64,
) -> Result<(), StageError> {
    deps.catalog.record_verification_step(VerificationStep {
        audit_run_id: run.id.clone(),
        step_type: "sandbox".to_string(),
        status,
        stdout_key: None,
        stderr_key: None,
        summary: if summary.is_empty() {
            None
        } else {
            Some(summary)
        },
        duration_ms,
        created_at_ms: deps.clock.epoch_ms(),
    })?;
    Ok(())
}
