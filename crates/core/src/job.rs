// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue names, pipeline stages, and job-id construction

use crate::id::{AuditRunId, ProjectId, UploadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed queue set. Concurrency per queue is deployment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    Ingest,
    Verify,
    Audit,
    FindingLifecycle,
    Pdf,
    DocsCrawl,
    DocsIndex,
    Cleanup,
}

impl QueueName {
    pub const ALL: &'static [QueueName] = &[
        QueueName::Ingest,
        QueueName::Verify,
        QueueName::Audit,
        QueueName::FindingLifecycle,
        QueueName::Pdf,
        QueueName::DocsCrawl,
        QueueName::DocsIndex,
        QueueName::Cleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Ingest => "ingest",
            QueueName::Verify => "verify",
            QueueName::Audit => "audit",
            QueueName::FindingLifecycle => "finding-lifecycle",
            QueueName::Pdf => "pdf",
            QueueName::DocsCrawl => "docs-crawl",
            QueueName::DocsIndex => "docs-index",
            QueueName::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stages, in execution order. `Pdf` hangs off the end and is
/// only ever submitted externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Ingest,
    Verify,
    Audit,
    FindingLifecycle,
    Pdf,
}

impl Stage {
    pub fn queue(self) -> QueueName {
        match self {
            Stage::Ingest => QueueName::Ingest,
            Stage::Verify => QueueName::Verify,
            Stage::Audit => QueueName::Audit,
            Stage::FindingLifecycle => QueueName::FindingLifecycle,
            Stage::Pdf => QueueName::Pdf,
        }
    }

    /// The stage enqueued after this one completes, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Ingest => Some(Stage::Verify),
            Stage::Verify => Some(Stage::Audit),
            Stage::Audit => Some(Stage::FindingLifecycle),
            Stage::FindingLifecycle => None,
            Stage::Pdf => None,
        }
    }

    /// Stages an external caller may submit directly.
    pub fn is_externally_submittable(self) -> bool {
        matches!(self, Stage::Ingest | Stage::Pdf)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Verify => "verify",
            Stage::Audit => "audit",
            Stage::FindingLifecycle => "finding-lifecycle",
            Stage::Pdf => "pdf",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Separator substituted for `:` in job ids. Colons are reserved by the
/// queue implementation.
const SAFE_SEPARATOR: &str = "__";

/// Replace reserved colons in a job id with the safe separator.
///
/// Idempotent: the output contains no colons, so re-applying is identity.
pub fn to_safe_job_id(raw: &str) -> String {
    raw.replace(':', SAFE_SEPARATOR)
}

/// Canonical job id for a pipeline stage of an audit run.
pub fn stage_job_id(stage: Stage, project_id: &ProjectId, audit_run_id: &AuditRunId) -> String {
    to_safe_job_id(&format!("{}:{}:{}", stage, project_id, audit_run_id))
}

/// Payload carried by every pipeline stage job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePayload {
    pub project_id: ProjectId,
    pub audit_run_id: AuditRunId,
    /// Set on the upload ingest path only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<UploadId>,
}

impl StagePayload {
    pub fn new(project_id: ProjectId, audit_run_id: AuditRunId) -> Self {
        Self {
            project_id,
            audit_run_id,
            upload_id: None,
        }
    }

    pub fn with_upload(mut self, upload_id: UploadId) -> Self {
        self.upload_id = Some(upload_id);
        self
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
