// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use warden_core::{build_plan, AuditProfile, Language, SourceFile, StepAction};

fn scan_only_plan() -> SandboxPlan {
    // A plan whose steps are exactly the two security scans
    let files = vec![SourceFile {
        path: "contracts/main.tact".into(),
        content: String::new(),
        language: Language::Tact,
        is_test_file: false,
    }];
    let mut plan = build_plan(&files, AuditProfile::Deep);
    plan.steps.retain(|s| {
        matches!(
            s.action,
            StepAction::SecuritySurfaceScan | StepAction::SecurityRulesScan
        )
    });
    plan
}

fn collect_sink() -> (Arc<Mutex<Vec<SandboxEvent>>>, impl Fn(&SandboxEvent) + Send + Sync) {
    let events: Arc<Mutex<Vec<SandboxEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink = move |event: &SandboxEvent| {
        sink_events.lock().push(event.clone());
    };
    (events, sink)
}

use std::sync::Arc;

const DEADLINE: Duration = Duration::from_secs(30 * 60);

#[tokio::test]
async fn degradation_strips_action_and_resubmits() {
    let runner = FakeSandboxRunner::new();
    runner.push_unsupported("security-surface-scan");
    // Second attempt succeeds with one result
    runner.push_response(Ok(vec![StepResult {
        step_id: "security-rules-scan".into(),
        action: "security-rules-scan".into(),
        success: true,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 5,
        summary: None,
    }]));

    let plan = scan_only_plan();
    let result = run_plan(
        &runner,
        &plan,
        Vec::new(),
        "project-1",
        "rev-1",
        DEADLINE,
        &NullProgressSink,
    )
    .await
    .unwrap();

    let requests = runner.requests();
    assert_eq!(requests.len(), 2);
    let second_actions: Vec<&str> = requests[1]
        .steps
        .iter()
        .map(|s| s.action.as_str())
        .collect();
    assert_eq!(second_actions, vec!["security-rules-scan"]);

    assert_eq!(result.unsupported_actions, vec!["security-surface-scan"]);
    assert_eq!(result.results.len(), 1);
}

#[tokio::test]
async fn all_actions_unsupported_yields_empty_result() {
    let runner = FakeSandboxRunner::new();
    runner.push_unsupported("security-surface-scan");
    runner.push_unsupported("security-rules-scan");

    let plan = scan_only_plan();
    let result = run_plan(
        &runner,
        &plan,
        Vec::new(),
        "project-1",
        "rev-1",
        DEADLINE,
        &NullProgressSink,
    )
    .await
    .unwrap();

    assert!(result.results.is_empty());
    assert_eq!(
        result.unsupported_actions,
        vec!["security-surface-scan", "security-rules-scan"]
    );
    assert_eq!(runner.requests().len(), 2);
}

#[tokio::test]
async fn rejecting_an_unsubmitted_action_is_an_error() {
    let runner = FakeSandboxRunner::new();
    runner.push_unsupported("blueprint-build");

    let plan = scan_only_plan();
    let err = run_plan(
        &runner,
        &plan,
        Vec::new(),
        "project-1",
        "rev-1",
        DEADLINE,
        &NullProgressSink,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SandboxError::Runner(_)));
}

#[tokio::test]
async fn unavailable_runner_is_surfaced_as_is() {
    let runner = FakeSandboxRunner::new();
    runner.push_response(Err(SandboxError::Unavailable("connection refused".into())));

    let plan = scan_only_plan();
    let err = run_plan(
        &runner,
        &plan,
        Vec::new(),
        "project-1",
        "rev-1",
        DEADLINE,
        &NullProgressSink,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SandboxError::Unavailable(_)));
}

#[tokio::test]
async fn progress_events_flow_through_the_sink() {
    let runner = FakeSandboxRunner::new();
    let (events, sink) = collect_sink();

    let plan = scan_only_plan();
    run_plan(
        &runner,
        &plan,
        Vec::new(),
        "project-1",
        "rev-1",
        DEADLINE,
        &sink,
    )
    .await
    .unwrap();

    let events = events.lock();
    assert!(matches!(events.first(), Some(SandboxEvent::Started {})));
    assert!(matches!(events.last(), Some(SandboxEvent::Completed { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SandboxEvent::StepFinished { .. })));
}

#[test]
fn request_timeout_shaping() {
    let plan = scan_only_plan(); // two scans at 2 min each

    // sum (4 min) + 15 s
    let timeout = request_timeout(&plan, Duration::from_secs(30 * 60));
    assert_eq!(timeout, Duration::from_millis(4 * 60 * 1000 + 15_000));

    // Floored at 120 s for tiny plans
    let mut tiny = plan.clone();
    tiny.steps.truncate(0);
    let timeout = request_timeout(&tiny, Duration::from_secs(30 * 60));
    assert_eq!(timeout, Duration::from_secs(120));

    // Capped 10 s below the job deadline
    let timeout = request_timeout(&plan, Duration::from_secs(60));
    assert_eq!(timeout, Duration::from_secs(50));
}

#[yare::parameterized(
    degradable = { r#"{"error": "invalid step action: security-surface-scan"}"#, true },
    plain_error = { r#"{"error": "workspace limit reached"}"#, false },
    unparseable_body = { "not json", false },
)]
fn bad_request_classification(body: &str, degradable: bool) {
    match parse_bad_request(body) {
        SandboxError::UnsupportedAction(action) => {
            assert!(degradable);
            assert_eq!(action, "security-surface-scan");
        }
        SandboxError::Runner(_) => assert!(!degradable),
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn sandbox_events_deserialize_from_wire_format() {
    let line = r#"{"event":"step-finished","step_id":"tact-check","result":{"step_id":"tact-check","action":"tact-check","success":true}}"#;
    let event: SandboxEvent = serde_json::from_str(line).unwrap();
    match event {
        SandboxEvent::StepFinished { step_id, result } => {
            assert_eq!(step_id, "tact-check");
            assert!(result.success);
            assert_eq!(result.duration_ms, 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let completed: SandboxEvent =
        serde_json::from_str(r#"{"event":"completed","results":[]}"#).unwrap();
    assert!(matches!(completed, SandboxEvent::Completed { results } if results.is_empty()));
}
