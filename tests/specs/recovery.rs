//! Crash-recovery specifications: durable catalog + pipeline resumption

use std::sync::Arc;
use std::time::Duration;
use warden_adapters::{FakeLlmClient, FakePdfRenderer, FakeSandboxRunner};
use warden_core::{
    AuditRunId, AuditStatus, CountingSource, FakeClock, Project, ProjectId, UserId,
};
use warden_engine::test_support::test_config;
use warden_engine::{Engine, EngineAdapters};
use warden_storage::{CatalogStore, FsObjectStore, ObjectStore, SnapshotParams};

const CONTRACT: &str = "contracts/main.tact";

struct Harness {
    engine: Engine,
    catalog: Arc<CatalogStore>,
    llm: Arc<FakeLlmClient>,
}

fn boot(state_dir: &std::path::Path, objects_dir: &std::path::Path, id_prefix: &str) -> Harness {
    let catalog = Arc::new(CatalogStore::open(state_dir).unwrap());
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(objects_dir));
    let llm = Arc::new(FakeLlmClient::new());
    let engine = Engine::start(
        catalog.clone(),
        objects,
        EngineAdapters {
            sandbox: Arc::new(FakeSandboxRunner::new()),
            llm: llm.clone(),
            pdf: Arc::new(FakePdfRenderer::new()),
        },
        Arc::new(FakeClock::new()),
        Arc::new(CountingSource::labeled(id_prefix)),
        test_config(),
    );
    Harness {
        engine,
        catalog,
        llm,
    }
}

fn params() -> SnapshotParams {
    SnapshotParams {
        profile: warden_core::AuditProfile::Deep,
        requested_by: UserId::new("user-1"),
        primary_model_id: "model-primary".into(),
        fallback_model_id: "model-fallback".into(),
    }
}

async fn wait_completed(catalog: &Arc<CatalogStore>, run_id: &AuditRunId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = catalog.read(|c| c.audit_run(run_id).map(|r| r.status));
        if status == Some(AuditStatus::Completed) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run {run_id} never completed (status {status:?})"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
#[serial_test::serial]
async fn a_queued_run_survives_a_restart_and_completes() {
    let state = tempfile::tempdir().unwrap();
    let objects = tempfile::tempdir().unwrap();
    let run_id;
    let project_id = ProjectId::new("p-1");

    // First process: seed everything, snapshot a run, then "crash" before
    // any stage executes.
    {
        let harness = boot(state.path(), objects.path(), "boot1");
        harness
            .catalog
            .create_project(Project::new(
                project_id.clone(),
                "demo",
                UserId::new("user-1"),
                0,
            ))
            .unwrap();

        let revisions = &harness.engine.deps.revisions;
        let base = warden_core::RevisionId::new("base");
        harness
            .catalog
            .create_revision(warden_core::Revision::new(
                base.clone(),
                project_id.clone(),
                warden_core::RevisionSource::Upload,
                "seed",
                0,
            ))
            .unwrap();
        revisions
            .upsert_revision_file(&base, CONTRACT, warden_core::Language::Tact, false, "contract Main {}")
            .await
            .unwrap();
        let copy = revisions
            .create_working_copy(&project_id, &base, &UserId::new("user-1"))
            .await
            .unwrap();
        let (_, run) = revisions
            .snapshot_working_copy(&project_id, &copy.id, params())
            .await
            .unwrap();
        run_id = run.id;
        // No ingest job was submitted: the crash happened first.
    }

    // Second process: recover from the journal and resume the pipeline.
    let harness = boot(state.path(), objects.path(), "boot2");
    let recovered = harness
        .catalog
        .read(|c| c.audit_run(&run_id).map(|r| r.status));
    assert_eq!(recovered, Some(AuditStatus::Queued));

    harness.llm.set_default_response(serde_json::json!({
        "schema_version": 2,
        "summary": "clean",
        "findings": [],
        "files_considered": [CONTRACT],
    }));

    let resumed = harness.engine.recover();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].0, run_id);

    wait_completed(&harness.catalog, &run_id).await;

    // The single-active index is consistent after recovery too
    assert!(harness
        .catalog
        .read(|c| c.active_run_for(&project_id).is_none()));
}
