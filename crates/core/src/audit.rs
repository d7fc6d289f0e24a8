// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit run entity and its lifecycle state machine

use crate::id::{AuditRunId, ProjectId, RevisionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit depth profile. `Fast` makes test and rules-scan steps optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditProfile {
    Fast,
    Deep,
}

impl fmt::Display for AuditProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditProfile::Fast => write!(f, "fast"),
            AuditProfile::Deep => write!(f, "deep"),
        }
    }
}

/// Audit run status.
///
/// `Queued → Running → Completed`, with `Failed` and `Cancelled` reachable
/// from either non-terminal state. Terminal states absorb: no transition
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuditStatus::Completed | AuditStatus::Failed | AuditStatus::Cancelled
        )
    }

    /// True when the run counts against the single-active-per-project limit.
    pub fn is_active(self) -> bool {
        matches!(self, AuditStatus::Queued | AuditStatus::Running)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(self, next: AuditStatus) -> bool {
        match (self, next) {
            (AuditStatus::Queued, AuditStatus::Running) => true,
            (AuditStatus::Running, AuditStatus::Completed) => true,
            (
                AuditStatus::Queued | AuditStatus::Running,
                AuditStatus::Failed | AuditStatus::Cancelled,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Queued => write!(f, "queued"),
            AuditStatus::Running => write!(f, "running"),
            AuditStatus::Completed => write!(f, "completed"),
            AuditStatus::Failed => write!(f, "failed"),
            AuditStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single invocation of the pipeline for a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRun {
    pub id: AuditRunId,
    pub project_id: ProjectId,
    pub revision_id: RevisionId,
    pub status: AuditStatus,
    pub profile: AuditProfile,
    pub engine_version: String,
    pub report_schema_version: u32,
    pub requested_by: UserId,
    pub primary_model_id: String,
    pub fallback_model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

/// Engine version stamped on every new run.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Report schema version the audit stage produces and the quality gate checks.
pub const REPORT_SCHEMA_VERSION: u32 = 2;

/// Parameters for creating a new run.
#[derive(Debug, Clone)]
pub struct AuditRunConfig {
    pub id: AuditRunId,
    pub project_id: ProjectId,
    pub revision_id: RevisionId,
    pub profile: AuditProfile,
    pub requested_by: UserId,
    pub primary_model_id: String,
    pub fallback_model_id: String,
}

impl AuditRun {
    pub fn new(config: AuditRunConfig, now_ms: u64) -> Self {
        Self {
            id: config.id,
            project_id: config.project_id,
            revision_id: config.revision_id,
            status: AuditStatus::Queued,
            profile: config.profile,
            engine_version: ENGINE_VERSION.to_string(),
            report_schema_version: REPORT_SCHEMA_VERSION,
            requested_by: config.requested_by,
            primary_model_id: config.primary_model_id,
            fallback_model_id: config.fallback_model_id,
            report_json: None,
            error: None,
            created_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
