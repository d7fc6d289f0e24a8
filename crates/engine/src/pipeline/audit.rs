// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit stage: prompt the model, gate the report, record findings.

use super::verify::load_sources;
use super::{put_artifact, StageDeps, StageWork};
use crate::queue::{JobContext, StageError};
use async_trait::async_trait;
use warden_adapters::complete_with_fallback;
use warden_core::{
    quality_gate, AuditPhase, AuditProgress, AuditReport, AuditRun, EventPayload, FindingId,
    ProgressBody, RetryPolicy, SourceFile, Stage, StagePayload, REPORT_SCHEMA_VERSION,
};
use warden_storage::keys;

pub(crate) struct AuditWork;

#[async_trait]
impl StageWork for AuditWork {
    fn stage(&self) -> Stage {
        Stage::Audit
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

        publish_phase(deps, job, AuditPhase::AgentDiscovery);
        let prompt = build_prompt(run, &sources);
        put_artifact(deps, &keys::audit_prompt(&run.id), prompt.as_bytes()).await?;

        publish_phase(deps, job, AuditPhase::AgentValidation);
        let outcome = complete_with_fallback(
            deps.llm.as_ref(),
            &run.primary_model_id,
            &run.fallback_model_id,
            &prompt,
            RetryPolicy::llm(),
        )
        .await
        .map_err(|e| StageError::Fatal(format!("audit model failed: {e}")))?;

        // A primary failure that the fallback papered over is an artifact,
        // not a stage failure.
        if let Some(primary_error) = &outcome.primary_error {
            let document = serde_json::json!({
                "model_id": run.primary_model_id,
                "error": primary_error,
            });
            put_artifact(
                deps,
                &keys::audit_primary_error(&run.id),
                document.to_string().as_bytes(),
            )
            .await?;
        }
        put_artifact(
            deps,
            &keys::audit_model_result(&run.id),
            outcome.value.to_string().as_bytes(),
        )
        .await?;

        publish_phase(deps, job, AuditPhase::AgentSynthesis);
        let report: AuditReport = serde_json::from_value(outcome.value.clone())
            .map_err(|e| StageError::Fatal(format!("report does not match schema: {e}")))?;

        publish_phase(deps, job, AuditPhase::ReportQualityGate);
        let all_paths = sources.iter().map(|s| s.path.clone()).collect();
        let contract_paths = sources
            .iter()
            .filter(|s| s.language.is_contract_language() && !s.is_test_file)
            .map(|s| s.path.clone())
            .collect();
        let violations = quality_gate(&report, REPORT_SCHEMA_VERSION, &all_paths, &contract_paths);
        if !violations.is_empty() {
            let summary = violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StageError::Fatal(format!("report quality gate: {summary}")));
        }

        deps.catalog
            .store_audit_report(&run.id, outcome.value.clone())?;

        let now = deps.clock.epoch_ms();
        for finding in &report.findings {
            deps.catalog.record_finding(
                &payload.project_id,
                &run.revision_id,
                &run.id,
                finding,
                FindingId::new(deps.ids.fresh()),
                now,
            )?;
        }
        Ok(())
    }
}

fn publish_phase(deps: &StageDeps, job: &JobContext, phase: AuditPhase) {
    let _ = deps.bus.publish(
        job.queue,
        &job.job_id,
        EventPayload::Progress(ProgressBody::Audit(AuditProgress { phase })),
    );
}

/// The prompt embeds the file set and the report schema contract.
fn build_prompt(run: &AuditRun, sources: &[SourceFile]) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "You are auditing a TON smart-contract project. Analyze every contract \
         for security issues and answer with a single JSON object matching the \
         report schema: {schema_version, summary, findings[{title, severity, \
         category, file_path, start_line, end_line, description, recommendation}], \
         files_considered}.\n",
    );
    prompt.push_str(&format!(
        "schema_version must be {REPORT_SCHEMA_VERSION}. Severities: informational, low, \
         medium, high, critical.\n\nProfile: {}\n\n",
        run.profile
    ));
    for source in sources {
        prompt.push_str(&format!(
            "==== {} ({}) ====\n{}\n\n",
            source.path, source.language, source.content
        ));
    }
    prompt
}
