// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job event types: the durable progress log and its live-stream payloads.
//!
//! Payloads are tagged variants per event name; freeform JSON exists only
//! at the serialization boundary.

use crate::job::QueueName;
use crate::plan::Adapter;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Progress phase of the `verify` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyPhase {
    PlanReady,
    SecurityScan,
    SandboxRunning,
    SandboxCompleted,
    SandboxFailed,
    SandboxSkipped,
}

/// Progress phase of the `audit` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditPhase {
    AgentDiscovery,
    AgentValidation,
    AgentSynthesis,
    ReportQualityGate,
}

/// Status of a single plan step as seen in a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// `progress` payload for the `verify` queue: phase plus a snapshot of
/// every step's status, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyProgress {
    pub phase: VerifyPhase,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    pub adapter: Adapter,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub step_statuses: IndexMap<String, StepState>,
}

/// `progress` payload for the `audit` queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProgress {
    pub phase: AuditPhase,
}

/// The two shapes a `progress` event can carry, distinguished by their
/// fields (verify snapshots are strictly richer than audit phases).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressBody {
    Verify(VerifyProgress),
    Audit(AuditProgress),
}

/// Error classification carried on `failed` events, mirroring §7 of the
/// error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Validation,
    Conflict,
    Transient,
    Fatal,
    Degraded,
    Deadline,
}

/// Tagged event payloads. Serializes as `{"event": "<name>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventPayload {
    #[serde(rename = "started")]
    Started {},

    #[serde(rename = "progress")]
    Progress(ProgressBody),

    #[serde(rename = "sandbox-step")]
    SandboxStep {
        step_id: String,
        action: String,
        status: StepState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },

    #[serde(rename = "security-scan")]
    SecurityScan {
        step_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    #[serde(rename = "completed")]
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },

    #[serde(rename = "failed")]
    Failed { kind: FailureKind, message: String },

    // -- queue runtime twins --
    #[serde(rename = "worker-started")]
    WorkerStarted { attempt: u32 },

    #[serde(rename = "worker-completed")]
    WorkerCompleted { attempt: u32, elapsed_ms: u64 },

    #[serde(rename = "worker-failed")]
    WorkerFailed { attempt: u32, message: String },

    #[serde(rename = "timeout")]
    Timeout { deadline_ms: u64 },
}

impl EventPayload {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Started {} => "started",
            EventPayload::Progress(_) => "progress",
            EventPayload::SandboxStep { .. } => "sandbox-step",
            EventPayload::SecurityScan { .. } => "security-scan",
            EventPayload::Completed { .. } => "completed",
            EventPayload::Failed { .. } => "failed",
            EventPayload::WorkerStarted { .. } => "worker-started",
            EventPayload::WorkerCompleted { .. } => "worker-completed",
            EventPayload::WorkerFailed { .. } => "worker-failed",
            EventPayload::Timeout { .. } => "timeout",
        }
    }
}

/// One row of the append-only job event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Log-global sequence; insertion order within a `job_id`
    pub seq: u64,
    pub queue: QueueName,
    pub job_id: String,
    pub created_at_ms: u64,
    pub payload: EventPayload,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
