// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finding identity, instances, and inter-audit transitions

use crate::id::{AuditRunId, FindingId, ProjectId, RevisionId};
use crate::report::{ReportFinding, Severity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Opened,
    Resolved,
}

/// Stable per-project finding identity.
///
/// The fingerprint, not the row id, is what makes a finding "the same"
/// across audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub project_id: ProjectId,
    pub fingerprint: String,
    pub title: String,
    pub current_status: FindingStatus,
    pub first_seen_revision: RevisionId,
    pub last_seen_revision: RevisionId,
    pub created_at_ms: u64,
}

/// The recording of a finding inside one audit run.
/// Unique on `(finding, audit_run)`; immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingInstance {
    pub finding_id: FindingId,
    pub audit_run_id: AuditRunId,
    pub severity: Severity,
    pub payload: ReportFinding,
    pub created_at_ms: u64,
}

/// The labeled change of a finding between two audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Opened,
    Resolved,
    Regressed,
    Unchanged,
}

impl TransitionKind {
    /// Status the finding lands on after this transition.
    pub fn resulting_status(self) -> FindingStatus {
        match self {
            TransitionKind::Opened | TransitionKind::Regressed | TransitionKind::Unchanged => {
                FindingStatus::Opened
            }
            TransitionKind::Resolved => FindingStatus::Resolved,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Opened => write!(f, "opened"),
            TransitionKind::Resolved => write!(f, "resolved"),
            TransitionKind::Regressed => write!(f, "regressed"),
            TransitionKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A recorded transition row between two audit runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingTransition {
    pub finding_id: FindingId,
    pub from_audit_run_id: AuditRunId,
    pub to_audit_run_id: AuditRunId,
    pub transition: TransitionKind,
    pub created_at_ms: u64,
}

/// Stable fingerprint of a finding: SHA-256 over title, location, and
/// severity.
pub fn fingerprint(
    title: &str,
    file_path: &str,
    start_line: u32,
    end_line: u32,
    severity: Severity,
) -> String {
    let canonical = format!(
        "{title}\n{file_path}\n{start_line}\n{end_line}\n{}",
        severity.as_str()
    );
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

/// Compute the transition for every finding present in either audit.
///
/// `previous` and `current` are the finding ids with an instance in the
/// respective run; `previous_statuses` is the stored `current_status` of
/// every finding known to the project before this audit.
pub fn compute_transitions(
    previous: &HashSet<FindingId>,
    current: &HashSet<FindingId>,
    previous_statuses: &HashMap<FindingId, FindingStatus>,
) -> Vec<(FindingId, TransitionKind)> {
    let mut transitions = Vec::new();

    let mut current_sorted: Vec<&FindingId> = current.iter().collect();
    current_sorted.sort();
    for id in current_sorted {
        let kind = if previous.contains(id) {
            TransitionKind::Unchanged
        } else if previous_statuses.get(id) == Some(&FindingStatus::Resolved) {
            TransitionKind::Regressed
        } else {
            TransitionKind::Opened
        };
        transitions.push((id.clone(), kind));
    }

    let mut previous_sorted: Vec<&FindingId> = previous.iter().collect();
    previous_sorted.sort();
    for id in previous_sorted {
        if !current.contains(id) {
            transitions.push((id.clone(), TransitionKind::Resolved));
        }
    }

    transitions
}

/// A finding present in both audits of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistingFinding {
    pub finding_id: FindingId,
    pub from_severity: Severity,
    pub to_severity: Severity,
}

/// Finding bucketization between two completed audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingComparison {
    pub newly_detected: Vec<FindingId>,
    pub resolved: Vec<FindingId>,
    pub persisting: Vec<PersistingFinding>,
    pub severity_changed_count: usize,
}

/// Bucketize the instances of two audits: new, resolved, and persisting
/// findings, with severity drift counted across the persisting set.
pub fn compare_instances(
    previous: &[FindingInstance],
    current: &[FindingInstance],
) -> FindingComparison {
    let prev_by_id: HashMap<FindingId, &FindingInstance> = previous
        .iter()
        .map(|i| (i.finding_id.clone(), i))
        .collect();
    let curr_by_id: HashMap<FindingId, &FindingInstance> = current
        .iter()
        .map(|i| (i.finding_id.clone(), i))
        .collect();

    let mut newly_detected = Vec::new();
    let mut persisting = Vec::new();
    let mut severity_changed_count = 0;

    let mut current_ids: Vec<FindingId> = curr_by_id.keys().cloned().collect();
    current_ids.sort();
    for id in &current_ids {
        match prev_by_id.get(id) {
            None => newly_detected.push(id.clone()),
            Some(prev) => {
                let curr = &curr_by_id[id];
                if prev.severity != curr.severity {
                    severity_changed_count += 1;
                }
                persisting.push(PersistingFinding {
                    finding_id: id.clone(),
                    from_severity: prev.severity,
                    to_severity: curr.severity,
                });
            }
        }
    }

    let mut resolved: Vec<FindingId> = prev_by_id
        .keys()
        .filter(|id| !curr_by_id.contains_key(*id))
        .cloned()
        .collect();
    resolved.sort();

    FindingComparison {
        newly_detected,
        resolved,
        persisting,
        severity_changed_count,
    }
}

#[cfg(test)]
#[path = "finding_tests.rs"]
mod tests;
