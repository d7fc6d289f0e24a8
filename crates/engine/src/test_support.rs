// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: an engine wired entirely from fakes, plus seeding and
//! waiting helpers shared by unit tests and the workspace specs.

// Harness code may panic loudly on broken fixtures.
#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use crate::bootstrap::{Engine, EngineAdapters};
use crate::config::{EngineConfig, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use warden_adapters::{FakeLlmClient, FakePdfRenderer, FakeSandboxRunner};
use warden_core::{
    AuditProfile, AuditRunId, AuditStatus, Clock, CountingSource, FakeClock, Language, Project,
    ProjectId, UserId,
};
use warden_storage::{CatalogStore, InMemoryObjectStore, ObjectStore, SnapshotParams};

/// An engine over fakes, with handles to every seam.
pub struct TestEngine {
    pub engine: Engine,
    pub catalog: Arc<CatalogStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub sandbox: Arc<FakeSandboxRunner>,
    pub llm: Arc<FakeLlmClient>,
    pub pdf: Arc<FakePdfRenderer>,
    pub clock: Arc<FakeClock>,
}

/// Fast-retry configuration so failure paths finish in milliseconds.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
    };
    config
}

pub fn test_engine() -> TestEngine {
    test_engine_with(test_config())
}

pub fn test_engine_with(config: EngineConfig) -> TestEngine {
    let catalog = Arc::new(CatalogStore::in_memory());
    let objects = Arc::new(InMemoryObjectStore::new());
    let sandbox = Arc::new(FakeSandboxRunner::new());
    let llm = Arc::new(FakeLlmClient::new());
    let pdf = Arc::new(FakePdfRenderer::new());
    let clock = Arc::new(FakeClock::new());

    let engine = Engine::start(
        catalog.clone(),
        objects.clone() as Arc<dyn ObjectStore>,
        EngineAdapters {
            sandbox: sandbox.clone(),
            llm: llm.clone(),
            pdf: pdf.clone(),
        },
        clock.clone(),
        Arc::new(CountingSource::labeled("id")),
        config,
    );

    TestEngine {
        engine,
        catalog,
        objects,
        sandbox,
        llm,
        pdf,
        clock,
    }
}

impl TestEngine {
    pub fn seed_project(&self, id: &str) -> ProjectId {
        let project_id = ProjectId::new(id);
        self.catalog
            .create_project(Project::new(
                project_id.clone(),
                format!("project {id}"),
                UserId::new("user-1"),
                self.clock.epoch_ms(),
            ))
            .unwrap_or_else(|e| panic!("seed project {id}: {e}"));
        project_id
    }

    /// Seed a sealed revision with files and an active working copy over
    /// it, returning the working copy id ready for `snapshot`.
    pub async fn seed_working_copy(
        &self,
        project_id: &ProjectId,
        files: &[(&str, &str)],
    ) -> warden_core::WorkingCopyId {
        let revisions = &self.engine.deps.revisions;
        let revision_id = warden_core::RevisionId::new(format!("{project_id}-base"));
        self.catalog
            .create_revision(warden_core::Revision::new(
                revision_id.clone(),
                project_id.clone(),
                warden_core::RevisionSource::Upload,
                "seed",
                self.clock.epoch_ms(),
            ))
            .unwrap_or_else(|e| panic!("seed revision: {e}"));

        for (path, content) in files {
            revisions
                .upsert_revision_file(
                    &revision_id,
                    path,
                    Language::detect(path),
                    warden_core::language::is_test_path(path),
                    content,
                )
                .await
                .unwrap_or_else(|e| panic!("seed file {path}: {e}"));
        }

        revisions
            .create_working_copy(project_id, &revision_id, &UserId::new("user-1"))
            .await
            .unwrap_or_else(|e| panic!("seed working copy: {e}"))
            .id
    }

    pub fn snapshot_params(&self) -> SnapshotParams {
        SnapshotParams {
            profile: AuditProfile::Deep,
            requested_by: UserId::new("user-1"),
            primary_model_id: "model-primary".to_string(),
            fallback_model_id: "model-fallback".to_string(),
        }
    }

    /// A model answer that passes the quality gate for the given contract
    /// files and findings.
    pub fn passing_report(
        &self,
        contract_files: &[&str],
        findings: &[(&str, &str, &str)], // (title, file, severity)
    ) -> serde_json::Value {
        let findings: Vec<serde_json::Value> = findings
            .iter()
            .map(|(title, file, severity)| {
                serde_json::json!({
                    "title": title,
                    "severity": severity,
                    "category": "access-control",
                    "file_path": file,
                    "start_line": 10,
                    "end_line": 20,
                    "description": "sender is never checked",
                })
            })
            .collect();
        serde_json::json!({
            "schema_version": 2,
            "summary": "automated audit",
            "findings": findings,
            "files_considered": contract_files,
        })
    }

    /// Poll until the run reaches a terminal status.
    pub async fn wait_terminal(&self, run_id: &AuditRunId) -> AuditStatus {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let status = self
                .catalog
                .read(|c| c.audit_run(run_id).map(|r| r.status));
            if let Some(status) = status {
                if status.is_terminal() {
                    return status;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("run {run_id} never reached a terminal status");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the predicate over the catalog holds.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&warden_storage::Catalog) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if self.catalog.read(&mut predicate) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("condition never held");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
