//! Sandbox degradation specifications (spec scenario 3)

use std::time::Duration;
use warden_adapters::{run_plan, FakeSandboxRunner, NullProgressSink, StepResult};
use warden_core::{AuditProfile, PlanStep, SandboxPlan, StepAction};

fn scan_plan() -> SandboxPlan {
    let mut plan = warden_core::build_plan(
        &[warden_core::SourceFile {
            path: "contracts/main.tact".into(),
            content: String::new(),
            language: warden_core::Language::Tact,
            is_test_file: false,
        }],
        AuditProfile::Deep,
    );
    plan.steps = plan
        .steps
        .into_iter()
        .filter(|s: &PlanStep| {
            matches!(
                s.action,
                StepAction::SecuritySurfaceScan | StepAction::SecurityRulesScan
            )
        })
        .collect();
    plan
}

#[tokio::test]
async fn unsupported_action_is_stripped_and_the_request_resubmitted() {
    let runner = FakeSandboxRunner::new();
    runner.push_unsupported("security-surface-scan");
    runner.push_response(Ok(vec![StepResult {
        step_id: "security-rules-scan".into(),
        action: "security-rules-scan".into(),
        success: true,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 3,
        summary: None,
    }]));

    let result = run_plan(
        &runner,
        &scan_plan(),
        Vec::new(),
        "project-1",
        "rev-1",
        Duration::from_secs(1800),
        &NullProgressSink,
    )
    .await
    .unwrap();

    // Two fetch attempts; the second carries only the surviving scan
    let requests = runner.requests();
    assert_eq!(requests.len(), 2);
    let second: Vec<&str> = requests[1].steps.iter().map(|s| s.action.as_str()).collect();
    assert_eq!(second, vec!["security-rules-scan"]);

    assert_eq!(result.unsupported_actions, vec!["security-surface-scan"]);
    assert_eq!(result.results.len(), 1);
}
