//! Sandbox planner specifications (spec scenario 2)

use warden_core::{build_plan, Adapter, AuditProfile, BootstrapMode, Language, SourceFile};

fn file(path: &str, content: &str) -> SourceFile {
    SourceFile {
        language: Language::detect(path),
        is_test_file: warden_core::language::is_test_path(path),
        path: path.to_string(),
        content: content.to_string(),
    }
}

#[test]
fn blueprint_config_plus_tact_contract_selects_the_blueprint_adapter() {
    let files = vec![
        file("blueprint.config.ts", "export default {};"),
        file("contracts/main.tact", "contract Main {}"),
    ];
    let plan = build_plan(&files, AuditProfile::Deep);

    assert_eq!(plan.adapter, Adapter::Blueprint);
    assert_eq!(plan.bootstrap_mode, BootstrapMode::None);

    let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&"blueprint-build"));
    assert!(ids.contains(&"blueprint-test"));
}

#[test]
fn plans_are_deterministic_across_calls() {
    let files = vec![
        file("contracts/a.tact", ""),
        file("contracts/b.fc", ""),
        file("package.json", "{}"),
    ];
    assert_eq!(
        build_plan(&files, AuditProfile::Fast),
        build_plan(&files, AuditProfile::Fast)
    );
}

#[test]
fn unknown_projects_get_no_steps_and_a_reason() {
    let files = vec![file("README.md", "# docs only")];
    let plan = build_plan(&files, AuditProfile::Deep);
    assert_eq!(plan.adapter, Adapter::None);
    assert!(plan.steps.is_empty());
    assert!(!plan.unsupported_reasons.is_empty());
}
