//! Finding transition specifications (spec scenario 4)

use similar_asserts::assert_eq;
use warden_core::{
    compare_instances, AuditRunId, FindingId, FindingInstance, ReportFinding, Severity,
};

fn instance(id: &str, run: &str, severity: Severity) -> FindingInstance {
    FindingInstance {
        finding_id: FindingId::new(id),
        audit_run_id: AuditRunId::new(run),
        severity,
        payload: ReportFinding {
            title: id.to_string(),
            severity,
            category: "other".into(),
            file_path: "contracts/main.tact".into(),
            start_line: 1,
            end_line: 1,
            description: String::new(),
            recommendation: None,
        },
        created_at_ms: 0,
    }
}

#[test]
fn buckets_follow_the_transition_table() {
    // previous: {A (medium), B (high)}, current: {B (critical), C (low)}
    let previous = vec![
        instance("A", "audit-1", Severity::Medium),
        instance("B", "audit-1", Severity::High),
    ];
    let current = vec![
        instance("B", "audit-2", Severity::Critical),
        instance("C", "audit-2", Severity::Low),
    ];

    let comparison = compare_instances(&previous, &current);

    assert_eq!(comparison.newly_detected, vec![FindingId::new("C")]);
    assert_eq!(comparison.resolved, vec![FindingId::new("A")]);
    assert_eq!(comparison.persisting.len(), 1);
    assert_eq!(comparison.persisting[0].finding_id, FindingId::new("B"));
    assert_eq!(comparison.persisting[0].from_severity, Severity::High);
    assert_eq!(comparison.persisting[0].to_severity, Severity::Critical);
    assert_eq!(comparison.severity_changed_count, 1);
}
