// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic sandbox step planning.
//!
//! Planning is pure: the same file set and profile always yield the same
//! plan. The executor may later strip actions the runner rejects; the plan
//! itself never changes shape.

use crate::audit::AuditProfile;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Strategy family selected for a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Adapter {
    Blueprint,
    Tact,
    Func,
    Tolk,
    Mixed,
    None,
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Adapter::Blueprint => "blueprint",
            Adapter::Tact => "tact",
            Adapter::Func => "func",
            Adapter::Tolk => "tolk",
            Adapter::Mixed => "mixed",
            Adapter::None => "none",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMode {
    None,
    CreateTon,
}

/// Actions the sandbox runner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    BootstrapCreateTon,
    BlueprintBuild,
    BlueprintTest,
    TactCheck,
    FuncCheck,
    TolkCheck,
    SecuritySurfaceScan,
    SecurityRulesScan,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::BootstrapCreateTon => "bootstrap-create-ton",
            StepAction::BlueprintBuild => "blueprint-build",
            StepAction::BlueprintTest => "blueprint-test",
            StepAction::TactCheck => "tact-check",
            StepAction::FuncCheck => "func-check",
            StepAction::TolkCheck => "tolk-check",
            StepAction::SecuritySurfaceScan => "security-surface-scan",
            StepAction::SecurityRulesScan => "security-rules-scan",
        }
    }

    fn is_blueprint(self) -> bool {
        matches!(self, StepAction::BlueprintBuild | StepAction::BlueprintTest)
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap-create-ton" => Ok(StepAction::BootstrapCreateTon),
            "blueprint-build" => Ok(StepAction::BlueprintBuild),
            "blueprint-test" => Ok(StepAction::BlueprintTest),
            "tact-check" => Ok(StepAction::TactCheck),
            "func-check" => Ok(StepAction::FuncCheck),
            "tolk-check" => Ok(StepAction::TolkCheck),
            "security-surface-scan" => Ok(StepAction::SecuritySurfaceScan),
            "security-rules-scan" => Ok(StepAction::SecurityRulesScan),
            other => Err(format!("unknown step action: {other}")),
        }
    }
}

pub const BUILD_TIMEOUT_MS: u64 = 8 * 60 * 1000;
pub const BOOTSTRAP_TIMEOUT_MS: u64 = 3 * 60 * 1000;
pub const SCAN_TIMEOUT_MS: u64 = 2 * 60 * 1000;
pub const OPTIONAL_BLUEPRINT_TIMEOUT_MS: u64 = 90 * 1000;

/// One ordered sandbox step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub action: StepAction,
    pub optional: bool,
    pub timeout_ms: u64,
}

impl PlanStep {
    fn new(action: StepAction, optional: bool) -> Self {
        let timeout_ms = if optional && action.is_blueprint() {
            OPTIONAL_BLUEPRINT_TIMEOUT_MS
        } else {
            match action {
                StepAction::BootstrapCreateTon => BOOTSTRAP_TIMEOUT_MS,
                StepAction::SecuritySurfaceScan | StepAction::SecurityRulesScan => SCAN_TIMEOUT_MS,
                _ => BUILD_TIMEOUT_MS,
            }
        };
        Self {
            id: action.as_str().to_string(),
            action,
            optional,
            timeout_ms,
        }
    }
}

/// The plan handed to the sandbox client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPlan {
    pub adapter: Adapter,
    pub languages: Vec<Language>,
    pub bootstrap_mode: BootstrapMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_template: Option<String>,
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_reasons: Vec<String>,
}

impl SandboxPlan {
    pub fn total_timeout_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.timeout_ms).sum()
    }

    pub fn has_action(&self, action: StepAction) -> bool {
        self.steps.iter().any(|s| s.action == action)
    }

    /// Plan with the given action removed. Used by the sandbox client when
    /// the runner rejects an action.
    pub fn without_action(&self, action: StepAction) -> SandboxPlan {
        let mut plan = self.clone();
        plan.steps.retain(|s| s.action != action);
        plan
    }
}

/// A source file as seen by the planner and the sandbox request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub language: Language,
    pub is_test_file: bool,
}

/// Build the sandbox plan for a file set. First matching rule wins:
/// Blueprint project, single contract language, mixed languages, or none.
pub fn build_plan(files: &[SourceFile], profile: AuditProfile) -> SandboxPlan {
    let fast = profile == AuditProfile::Fast;

    let mut language_counts: BTreeMap<Language, usize> = BTreeMap::new();
    for file in files {
        if file.language.is_contract_language() && !file.is_test_file {
            *language_counts.entry(file.language).or_insert(0) += 1;
        }
    }
    let languages: Vec<Language> = language_counts.keys().copied().collect();

    if is_blueprint_project(files) {
        return SandboxPlan {
            adapter: Adapter::Blueprint,
            languages,
            bootstrap_mode: BootstrapMode::None,
            seed_template: None,
            steps: vec![
                PlanStep::new(StepAction::BlueprintBuild, false),
                PlanStep::new(StepAction::BlueprintTest, fast),
                PlanStep::new(StepAction::SecuritySurfaceScan, false),
                PlanStep::new(StepAction::SecurityRulesScan, fast),
            ],
            unsupported_reasons: Vec::new(),
        };
    }

    let dominant = language_counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(lang, _)| *lang);

    match languages.as_slice() {
        [] => SandboxPlan {
            adapter: Adapter::None,
            languages,
            bootstrap_mode: BootstrapMode::None,
            seed_template: None,
            steps: Vec::new(),
            unsupported_reasons: vec!["no supported contract language detected".to_string()],
        },
        [single] => {
            let single = *single;
            let (adapter, check) = language_adapter(single);
            SandboxPlan {
                adapter,
                languages,
                bootstrap_mode: BootstrapMode::CreateTon,
                seed_template: dominant.map(seed_template),
                steps: vec![
                    PlanStep::new(StepAction::BootstrapCreateTon, false),
                    PlanStep::new(check, false),
                    PlanStep::new(StepAction::BlueprintBuild, single != Language::Tact),
                    PlanStep::new(StepAction::SecuritySurfaceScan, false),
                    PlanStep::new(StepAction::SecurityRulesScan, false),
                ],
                unsupported_reasons: Vec::new(),
            }
        }
        many => {
            let mut steps = vec![PlanStep::new(StepAction::BootstrapCreateTon, false)];
            for lang in many {
                let (_, check) = language_adapter(*lang);
                steps.push(PlanStep::new(check, false));
            }
            steps.push(PlanStep::new(StepAction::BlueprintBuild, true));
            steps.push(PlanStep::new(StepAction::SecuritySurfaceScan, false));
            steps.push(PlanStep::new(StepAction::SecurityRulesScan, false));
            SandboxPlan {
                adapter: Adapter::Mixed,
                languages,
                bootstrap_mode: BootstrapMode::CreateTon,
                seed_template: dominant.map(seed_template),
                steps,
                unsupported_reasons: Vec::new(),
            }
        }
    }
}

fn language_adapter(language: Language) -> (Adapter, StepAction) {
    match language {
        Language::Tact => (Adapter::Tact, StepAction::TactCheck),
        Language::Func => (Adapter::Func, StepAction::FuncCheck),
        // Only contract languages reach here; Tolk is the remaining one.
        _ => (Adapter::Tolk, StepAction::TolkCheck),
    }
}

fn seed_template(language: Language) -> String {
    format!("counter-{}", language.as_str())
}

/// Blueprint markers: a config file at the project root, or a package.json
/// that depends on Blueprint or scripts it.
fn is_blueprint_project(files: &[SourceFile]) -> bool {
    for file in files {
        if file.path == "blueprint.config.ts" || file.path == "blueprint.config.js" {
            return true;
        }
    }
    files
        .iter()
        .filter(|f| f.path == "package.json" || f.path.ends_with("/package.json"))
        .any(|f| package_json_uses_blueprint(&f.content))
}

fn package_json_uses_blueprint(content: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return false;
    };
    for table in ["dependencies", "devDependencies"] {
        if let Some(deps) = value.get(table).and_then(|v| v.as_object()) {
            if deps.keys().any(|k| k.contains("blueprint")) {
                return true;
            }
        }
    }
    if let Some(scripts) = value.get("scripts").and_then(|v| v.as_object()) {
        if scripts
            .values()
            .filter_map(|v| v.as_str())
            .any(|script| script.contains("blueprint"))
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
