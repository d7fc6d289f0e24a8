// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use warden_core::{
    AuditProfile, AuditRunConfig, AuditStatus, EventPayload, QueueName, RevisionSource,
};

fn project(id: &str) -> Project {
    Project::new(ProjectId::new(id), "demo", UserId::new("u-1"), 100)
}

fn run(id: &str, project: &str) -> AuditRun {
    AuditRun::new(
        AuditRunConfig {
            id: AuditRunId::new(id),
            project_id: ProjectId::new(project),
            revision_id: RevisionId::new("rev-1"),
            profile: AuditProfile::Deep,
            requested_by: UserId::new("u-1"),
            primary_model_id: "primary".into(),
            fallback_model_id: "fallback".into(),
        },
        100,
    )
}

fn job_event(seq: u64, job_id: &str, created_at_ms: u64) -> JobEvent {
    JobEvent {
        seq,
        queue: QueueName::Verify,
        job_id: job_id.to_string(),
        created_at_ms,
        payload: EventPayload::Started {},
    }
}

#[test]
fn project_lifecycle_apply() {
    let mut catalog = Catalog::default();
    catalog.apply(&CatalogEvent::ProjectCreated {
        project: project("p-1"),
    });
    assert_eq!(
        catalog.project(&ProjectId::new("p-1")).unwrap().lifecycle,
        ProjectLifecycle::Initializing
    );

    catalog.apply(&CatalogEvent::ProjectLifecycleChanged {
        id: ProjectId::new("p-1"),
        lifecycle: ProjectLifecycle::Ready,
    });
    assert_eq!(
        catalog.project(&ProjectId::new("p-1")).unwrap().lifecycle,
        ProjectLifecycle::Ready
    );
}

#[test]
fn active_run_index_tracks_creation_and_completion() {
    let mut catalog = Catalog::default();
    catalog.apply(&CatalogEvent::ProjectCreated {
        project: project("p-1"),
    });
    catalog.apply(&CatalogEvent::AuditRunCreated { run: run("a-1", "p-1") });

    assert_eq!(
        catalog.active_run_for(&ProjectId::new("p-1")).unwrap().id,
        AuditRunId::new("a-1")
    );

    catalog.apply(&CatalogEvent::AuditRunStarted {
        id: AuditRunId::new("a-1"),
        at_ms: 200,
    });
    let stored = catalog.audit_run(&AuditRunId::new("a-1")).unwrap();
    assert_eq!(stored.status, AuditStatus::Running);
    assert_eq!(stored.started_at_ms, Some(200));

    catalog.apply(&CatalogEvent::AuditRunCompleted {
        id: AuditRunId::new("a-1"),
        at_ms: 300,
    });
    assert!(catalog.active_run_for(&ProjectId::new("p-1")).is_none());
    let stored = catalog.audit_run(&AuditRunId::new("a-1")).unwrap();
    assert_eq!(stored.status, AuditStatus::Completed);
    assert_eq!(stored.finished_at_ms, Some(300));
}

#[test]
fn failed_run_records_error_and_frees_the_project() {
    let mut catalog = Catalog::default();
    catalog.apply(&CatalogEvent::AuditRunCreated { run: run("a-1", "p-1") });
    catalog.apply(&CatalogEvent::AuditRunFailed {
        id: AuditRunId::new("a-1"),
        error: "sandbox exploded".into(),
        at_ms: 300,
    });

    let stored = catalog.audit_run(&AuditRunId::new("a-1")).unwrap();
    assert_eq!(stored.status, AuditStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("sandbox exploded"));
    assert!(catalog.active_run_for(&ProjectId::new("p-1")).is_none());
}

#[test]
fn revision_files_are_keyed_by_path() {
    let mut catalog = Catalog::default();
    let rev = RevisionId::new("rev-1");
    catalog.apply(&CatalogEvent::RevisionCreated {
        revision: Revision::new(
            rev.clone(),
            ProjectId::new("p-1"),
            RevisionSource::Upload,
            "initial",
            100,
        ),
    });
    for (path, digest) in [("b.tact", "d2"), ("a.tact", "d1"), ("b.tact", "d3")] {
        catalog.apply(&CatalogEvent::RevisionFileUpserted {
            file: RevisionFile {
                revision_id: rev.clone(),
                path: path.into(),
                digest: digest.into(),
                language: warden_core::Language::Tact,
                is_test_file: false,
            },
        });
    }

    let files = catalog.files_of(&rev);
    // Sorted by path, and the second upsert of b.tact won
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "a.tact");
    assert_eq!(files[1].digest, "d3");

    catalog.apply(&CatalogEvent::RevisionFilesCleared { id: rev.clone() });
    assert!(catalog.files_of(&rev).is_empty());
}

#[test]
fn finding_instance_upsert_is_unique_per_run() {
    let mut catalog = Catalog::default();
    let payload = warden_core::ReportFinding {
        title: "t".into(),
        severity: warden_core::Severity::Low,
        category: "other".into(),
        file_path: "a.tact".into(),
        start_line: 1,
        end_line: 1,
        description: String::new(),
        recommendation: None,
    };
    for severity in [warden_core::Severity::Low, warden_core::Severity::High] {
        catalog.apply(&CatalogEvent::FindingInstanceUpserted {
            instance: FindingInstance {
                finding_id: FindingId::new("f-1"),
                audit_run_id: AuditRunId::new("a-1"),
                severity,
                payload: payload.clone(),
                created_at_ms: 0,
            },
        });
    }

    let instances = catalog.instances_of_run(&AuditRunId::new("a-1"));
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].severity, warden_core::Severity::High);
}

#[test]
fn job_events_filter_by_job_id_in_order() {
    let mut catalog = Catalog::default();
    for (seq, job) in [(0, "a"), (1, "b"), (2, "a")] {
        catalog.apply(&CatalogEvent::JobEventAppended {
            event: job_event(seq, job, seq * 10),
        });
    }

    let events = catalog.job_events_for("a");
    assert_eq!(events.len(), 2);
    assert!(events[0].seq < events[1].seq);
    assert_eq!(catalog.next_event_seq, 3);
}

#[test]
fn job_event_trim_removes_old_rows() {
    let mut catalog = Catalog::default();
    for seq in 0..4u64 {
        catalog.apply(&CatalogEvent::JobEventAppended {
            event: job_event(seq, "a", seq * 100),
        });
    }
    catalog.apply(&CatalogEvent::JobEventsTrimmed { before_ms: 200 });
    assert_eq!(catalog.job_events.len(), 2);
    assert!(catalog.job_events.iter().all(|e| e.created_at_ms >= 200));
}

#[test]
fn completed_runs_sort_by_created_at_then_id() {
    let mut catalog = Catalog::default();
    for (id, created) in [("a-2", 100), ("a-1", 100), ("a-3", 50)] {
        let mut r = run(id, "p-1");
        r.created_at_ms = created;
        catalog.apply(&CatalogEvent::AuditRunCreated { run: r });
        catalog.apply(&CatalogEvent::AuditRunStarted {
            id: AuditRunId::new(id),
            at_ms: created,
        });
        catalog.apply(&CatalogEvent::AuditRunCompleted {
            id: AuditRunId::new(id),
            at_ms: created + 10,
        });
    }

    let runs = catalog.completed_runs_for(&ProjectId::new("p-1"));
    let ids: Vec<&str> = runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a-3", "a-1", "a-2"]);
}

#[test]
fn catalog_round_trips_through_json() {
    let mut catalog = Catalog::default();
    catalog.apply(&CatalogEvent::ProjectCreated {
        project: project("p-1"),
    });
    catalog.apply(&CatalogEvent::AuditRunCreated { run: run("a-1", "p-1") });
    catalog.apply(&CatalogEvent::JobEventAppended {
        event: job_event(0, "j", 5),
    });

    let json = serde_json::to_string(&catalog).unwrap();
    let back: Catalog = serde_json::from_str(&json).unwrap();
    assert_eq!(back.projects.len(), 1);
    assert_eq!(back.audit_runs.len(), 1);
    assert_eq!(back.job_events.len(), 1);
    assert_eq!(back.next_event_seq, 1);
}
