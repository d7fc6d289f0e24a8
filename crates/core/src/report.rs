// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed audit report and the post-audit quality gate

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Finding severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Finding categories the report taxonomy accepts.
pub const CATEGORIES: &[&str] = &[
    "access-control",
    "arithmetic",
    "storage",
    "gas",
    "message-flow",
    "randomness",
    "upgradeability",
    "standards",
    "data-validation",
    "other",
];

/// One finding as reported by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFinding {
    pub title: String,
    pub severity: Severity,
    pub category: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// The report the audit stage persists. Parsing this type *is* the schema
/// conformance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub schema_version: u32,
    pub summary: String,
    pub findings: Vec<ReportFinding>,
    /// Files the model claims to have analyzed
    #[serde(default)]
    pub files_considered: Vec<String>,
}

/// A reason the quality gate rejected a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateViolation {
    SchemaVersionMismatch { got: u32, want: u32 },
    UnknownCategory { title: String, category: String },
    UnknownFile { title: String, file_path: String },
    InvertedRange { title: String },
    CoverageGap { missing: Vec<String> },
}

impl fmt::Display for GateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateViolation::SchemaVersionMismatch { got, want } => {
                write!(f, "report schema version {got}, expected {want}")
            }
            GateViolation::UnknownCategory { title, category } => {
                write!(f, "finding '{title}' has unknown category '{category}'")
            }
            GateViolation::UnknownFile { title, file_path } => {
                write!(f, "finding '{title}' references unknown file '{file_path}'")
            }
            GateViolation::InvertedRange { title } => {
                write!(f, "finding '{title}' has end line before start line")
            }
            GateViolation::CoverageGap { missing } => {
                write!(f, "report did not consider: {}", missing.join(", "))
            }
        }
    }
}

/// Check a parsed report against the taxonomy and the revision's file set.
///
/// `contract_paths` is the set of non-test contract files in the revision:
/// each must appear in `files_considered`, and every finding must point at
/// a file that exists in the revision (`all_paths`).
pub fn quality_gate(
    report: &AuditReport,
    schema_version: u32,
    all_paths: &HashSet<String>,
    contract_paths: &HashSet<String>,
) -> Vec<GateViolation> {
    let mut violations = Vec::new();

    if report.schema_version != schema_version {
        violations.push(GateViolation::SchemaVersionMismatch {
            got: report.schema_version,
            want: schema_version,
        });
    }

    for finding in &report.findings {
        if !CATEGORIES.contains(&finding.category.as_str()) {
            violations.push(GateViolation::UnknownCategory {
                title: finding.title.clone(),
                category: finding.category.clone(),
            });
        }
        if !all_paths.contains(&finding.file_path) {
            violations.push(GateViolation::UnknownFile {
                title: finding.title.clone(),
                file_path: finding.file_path.clone(),
            });
        }
        if finding.end_line < finding.start_line {
            violations.push(GateViolation::InvertedRange {
                title: finding.title.clone(),
            });
        }
    }

    let considered: HashSet<&str> = report
        .files_considered
        .iter()
        .map(String::as_str)
        .collect();
    let mut missing: Vec<String> = contract_paths
        .iter()
        .filter(|p| !considered.contains(p.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        missing.sort();
        violations.push(GateViolation::CoverageGap { missing });
    }

    violations
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
