// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verification step records and PDF export state

use crate::id::AuditRunId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStepStatus {
    Completed,
    Failed,
    Skipped,
}

/// Per-run, per-step-type verification record.
///
/// Append-only: retries may write duplicates, consumers order by
/// `created_at_ms` and take the latest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStep {
    pub audit_run_id: AuditRunId,
    pub step_type: String,
    pub status: VerificationStepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub duration_ms: u64,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfExportStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Per `(audit_run, variant)` export record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfExport {
    pub audit_run_id: AuditRunId,
    pub variant: String,
    pub status: PdfExportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at_ms: Option<u64>,
    pub created_at_ms: u64,
}

/// The only variant the core generates today.
pub const PDF_VARIANT_FINAL: &str = "final";
