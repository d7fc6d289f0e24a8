//! End-to-end pipeline specifications over the upload path

use flate2::write::GzEncoder;
use flate2::Compression;
use warden_core::{
    AuditStatus, Clock, ProjectLifecycle, Upload, UploadId, UploadKind, UploadStatus,
};
use warden_engine::test_support::{test_engine, TestEngine};

const CONTRACT: &str = "contracts/main.tact";

/// Build a gzipped tarball from (path, content) pairs.
fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

async fn seed_upload(engine: &TestEngine, project: &warden_core::ProjectId, files: &[(&str, &str)]) -> UploadId {
    let bytes = tarball(files);
    let key = "uploads/archive-1";
    use warden_storage::ObjectStore;
    engine.objects.put(key, &bytes).await.unwrap();

    let upload_id = UploadId::new("upload-1");
    engine
        .catalog
        .create_upload(Upload {
            id: upload_id.clone(),
            project_id: project.clone(),
            name: "archive-1.tar.gz".into(),
            kind: UploadKind::Archive,
            status: UploadStatus::Uploaded,
            storage_key: key.into(),
            manifest: None,
            created_at_ms: engine.clock.epoch_ms(),
        })
        .unwrap();
    upload_id
}

#[tokio::test]
async fn an_uploaded_archive_flows_to_a_completed_audit() {
    let engine = test_engine();
    let project_id = engine.seed_project("p-1");
    let upload_id = seed_upload(
        &engine,
        &project_id,
        &[
            (CONTRACT, "contract Main {}"),
            ("wrappers/Main.ts", "export {};"),
            ("build/output.bin", "\u{1}\u{2}"),
        ],
    )
    .await;

    engine.llm.set_default_response(engine.passing_report(
        &[CONTRACT],
        &[("missing auth", CONTRACT, "high")],
    ));

    let (revision, run) = engine
        .engine
        .control
        .start_upload_audit(&project_id, &upload_id, engine.snapshot_params())
        .unwrap();
    assert_eq!(run.status, AuditStatus::Queued);

    assert_eq!(engine.wait_terminal(&run.id).await, AuditStatus::Completed);

    // The binary was dropped by the extension allow-list; sources landed
    let files = engine.catalog.read(|c| c.files_of(&revision.id));
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec![CONTRACT, "wrappers/Main.ts"]);

    // Upload consumed, project promoted on first successful ingest
    assert_eq!(
        engine.catalog.read(|c| c.upload(&upload_id).map(|u| u.status)),
        Some(UploadStatus::Processed)
    );
    assert_eq!(
        engine.catalog.read(|c| c.project(&project_id).map(|p| p.lifecycle)),
        Some(ProjectLifecycle::Ready)
    );

    // Findings recorded once
    assert_eq!(engine.catalog.read(|c| c.instances_of_run(&run.id)).len(), 1);
}

#[tokio::test]
async fn at_most_one_active_audit_per_project() {
    let engine = test_engine();
    let project_id = engine.seed_project("p-1");
    let copy_id = engine
        .seed_working_copy(&project_id, &[(CONTRACT, "contract Main {}")])
        .await;

    // A queued run that never starts holds the project's slot
    let (_, first) = engine
        .engine
        .deps
        .revisions
        .snapshot_working_copy(&project_id, &copy_id, engine.snapshot_params())
        .await
        .unwrap();

    let upload_id = seed_upload(&engine, &project_id, &[(CONTRACT, "contract Main {}")]).await;
    let err = engine
        .engine
        .control
        .start_upload_audit(&project_id, &upload_id, engine.snapshot_params())
        .unwrap_err();
    match err {
        warden_engine::ControlError::ActiveAuditRunConflict { existing } => {
            assert_eq!(existing, first.id);
        }
        other => panic!("unexpected error: {other}"),
    }

    // A different project is free to start
    let other_project = engine.seed_project("p-2");
    let other_upload = {
        let bytes = tarball(&[(CONTRACT, "contract Other {}")]);
        use warden_storage::ObjectStore;
        engine.objects.put("uploads/other", &bytes).await.unwrap();
        let id = UploadId::new("upload-other");
        engine
            .catalog
            .create_upload(Upload {
                id: id.clone(),
                project_id: other_project.clone(),
                name: "other.tar.gz".into(),
                kind: UploadKind::Archive,
                status: UploadStatus::Uploaded,
                storage_key: "uploads/other".into(),
                manifest: None,
                created_at_ms: 0,
            })
            .unwrap();
        id
    };
    engine
        .llm
        .set_default_response(engine.passing_report(&[CONTRACT], &[]));
    engine
        .engine
        .control
        .start_upload_audit(&other_project, &other_upload, engine.snapshot_params())
        .unwrap();
}

#[tokio::test]
async fn job_events_tell_the_whole_story_in_order() {
    let engine = test_engine();
    let project_id = engine.seed_project("p-1");
    let upload_id = seed_upload(&engine, &project_id, &[(CONTRACT, "contract Main {}")]).await;
    engine
        .llm
        .set_default_response(engine.passing_report(&[CONTRACT], &[]));

    let (_, run) = engine
        .engine
        .control
        .start_upload_audit(&project_id, &upload_id, engine.snapshot_params())
        .unwrap();
    assert_eq!(engine.wait_terminal(&run.id).await, AuditStatus::Completed);

    let verify_job = warden_core::stage_job_id(warden_core::Stage::Verify, &project_id, &run.id);
    let history = engine.engine.control.history(&verify_job);
    let names: Vec<&str> = history.iter().map(|e| e.payload.name()).collect();

    // Runtime twins wrap the stage's own events
    assert_eq!(names.first(), Some(&"worker-started"));
    assert_eq!(names.last(), Some(&"worker-completed"));
    assert!(names.contains(&"started"));
    assert!(names.contains(&"progress"));
    assert!(names.contains(&"sandbox-step"));
    assert!(names.contains(&"completed"));

    // Insertion order is monotonic per job id
    let seqs: Vec<u64> = history.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}
