// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::content::ContentStore;
use crate::object::InMemoryObjectStore;
use warden_core::{CountingSource, FakeClock, Project, WorkingCopyFile};

struct Fixture {
    revisions: RevisionStore,
    catalog: Arc<CatalogStore>,
}

fn fixture() -> Fixture {
    let catalog = Arc::new(CatalogStore::in_memory());
    let objects: Arc<InMemoryObjectStore> = Arc::new(InMemoryObjectStore::new());
    let clock = Arc::new(FakeClock::new());
    let ids = Arc::new(CountingSource::labeled("id"));
    let content = ContentStore::new(catalog.clone(), objects, clock.clone(), ids.clone());
    let revisions = RevisionStore::new(catalog.clone(), content, clock, ids);

    catalog
        .create_project(Project::new(
            ProjectId::new("p-1"),
            "demo",
            UserId::new("u-1"),
            0,
        ))
        .unwrap();
    Fixture { revisions, catalog }
}

fn seed_revision(f: &Fixture, id: &str) {
    f.catalog
        .create_revision(warden_core::Revision::new(
            RevisionId::new(id),
            ProjectId::new("p-1"),
            warden_core::RevisionSource::Upload,
            "seed",
            0,
        ))
        .unwrap();
}

fn params() -> SnapshotParams {
    SnapshotParams {
        profile: AuditProfile::Deep,
        requested_by: UserId::new("u-1"),
        primary_model_id: "primary".into(),
        fallback_model_id: "fallback".into(),
    }
}

#[tokio::test]
async fn upsert_revision_file_normalizes_and_stores() {
    let f = fixture();
    seed_revision(&f, "rev-1");

    let file = f
        .revisions
        .upsert_revision_file(
            &RevisionId::new("rev-1"),
            "./contracts//main.tact",
            Language::Tact,
            false,
            "contract Main {}",
        )
        .await
        .unwrap();

    assert_eq!(file.path, "contracts/main.tact");
    let files = f.catalog.read(|c| c.files_of(&RevisionId::new("rev-1")));
    assert_eq!(files.len(), 1);
    let blob = f.catalog.read(|c| c.blob(&file.digest).cloned()).unwrap();
    assert_eq!(blob.size, 16);
}

#[tokio::test]
async fn upsert_rejects_unsafe_paths() {
    let f = fixture();
    seed_revision(&f, "rev-1");

    let err = f
        .revisions
        .upsert_revision_file(
            &RevisionId::new("rev-1"),
            "../escape.tact",
            Language::Tact,
            false,
            "x",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RevisionError::Path(_)));
}

#[tokio::test]
async fn clear_revision_files_keeps_blobs() {
    let f = fixture();
    seed_revision(&f, "rev-1");
    f.revisions
        .upsert_revision_file(&RevisionId::new("rev-1"), "a.tact", Language::Tact, false, "x")
        .await
        .unwrap();

    f.revisions.clear_revision_files(&RevisionId::new("rev-1")).unwrap();
    assert!(f.catalog.read(|c| c.files_of(&RevisionId::new("rev-1")).is_empty()));
    assert_eq!(f.catalog.read(|c| c.blobs.len()), 1);
}

async fn working_copy_with_file(f: &Fixture) -> WorkingCopy {
    seed_revision(f, "rev-1");
    f.revisions
        .upsert_revision_file(
            &RevisionId::new("rev-1"),
            "contracts/main.tact",
            Language::Tact,
            false,
            "contract Main {}",
        )
        .await
        .unwrap();
    f.revisions
        .create_working_copy(&ProjectId::new("p-1"), &RevisionId::new("rev-1"), &UserId::new("u-1"))
        .await
        .unwrap()
}

#[tokio::test]
async fn create_working_copy_materializes_files_inline() {
    let f = fixture();
    let copy = working_copy_with_file(&f).await;

    let files = f.catalog.read(|c| c.working_copy_files_of(&copy.id));
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].content, "contract Main {}");
}

#[tokio::test]
async fn create_working_copy_returns_existing_active() {
    let f = fixture();
    let first = working_copy_with_file(&f).await;
    let second = f
        .revisions
        .create_working_copy(&ProjectId::new("p-1"), &RevisionId::new("rev-1"), &UserId::new("u-1"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(f.catalog.read(|c| c.working_copies.len()), 1);
}

#[tokio::test]
async fn snapshot_creates_revision_files_and_queued_run() {
    let f = fixture();
    let copy = working_copy_with_file(&f).await;

    // Edit a file in the working copy before snapshotting
    f.catalog
        .save_working_copy_file(WorkingCopyFile {
            working_copy_id: copy.id.clone(),
            path: "contracts/main.tact".into(),
            content: "contract Main { init() {} }".into(),
            language: Language::Tact,
            is_test_file: false,
        })
        .unwrap();

    let (revision, run) = f
        .revisions
        .snapshot_working_copy(&ProjectId::new("p-1"), &copy.id, params())
        .await
        .unwrap();

    assert_eq!(revision.source, warden_core::RevisionSource::WorkingCopy);
    assert_eq!(revision.parent_id, Some(RevisionId::new("rev-1")));
    assert_eq!(run.status, warden_core::AuditStatus::Queued);
    assert_eq!(run.revision_id, revision.id);

    let files = f.catalog.read(|c| c.files_of(&revision.id));
    assert_eq!(files.len(), 1);
    // The edited content got its own blob
    let blob = f.catalog.read(|c| c.blob(&files[0].digest).cloned()).unwrap();
    assert_eq!(blob.size, "contract Main { init() {} }".len() as u64);
}

#[tokio::test]
async fn snapshot_conflicts_while_a_run_is_active() {
    let f = fixture();
    let copy = working_copy_with_file(&f).await;

    let (_, first_run) = f
        .revisions
        .snapshot_working_copy(&ProjectId::new("p-1"), &copy.id, params())
        .await
        .unwrap();

    let err = f
        .revisions
        .snapshot_working_copy(&ProjectId::new("p-1"), &copy.id, params())
        .await
        .unwrap_err();
    match err {
        RevisionError::ActiveAuditRunConflict { existing } => {
            assert_eq!(existing, first_run.id);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn snapshot_of_missing_copy_fails() {
    let f = fixture();
    let err = f
        .revisions
        .snapshot_working_copy(&ProjectId::new("p-1"), &WorkingCopyId::new("ghost"), params())
        .await
        .unwrap_err();
    assert!(matches!(err, RevisionError::WorkingCopyNotFound(_)));
}
