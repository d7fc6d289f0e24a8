// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox runner client.
//!
//! The runner executes plan steps in an isolated container and streams
//! NDJSON events back. The client degrades gracefully: an action the
//! runner rejects is stripped from the plan and the request resubmitted,
//! with the unsupported actions reported in the final result.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use warden_core::{Adapter, BootstrapMode, PlanStep, SandboxPlan};

/// Errors from the sandbox client
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The runner rejected a step action it does not implement.
    #[error("invalid step action: {0}")]
    UnsupportedAction(String),
    /// Network failure or timeout. Not retryable; the verify stage records
    /// the failure and finishes without crashing the audit.
    #[error("sandbox runner unavailable: {0}")]
    Unavailable(String),
    /// The runner answered with an application-level error.
    #[error("sandbox runner error: {0}")]
    Runner(String),
    #[error("malformed sandbox response: {0}")]
    Protocol(String),
}

/// One file shipped to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFile {
    pub path: String,
    pub content: String,
}

/// Request metadata. The workspace id the runner derives from
/// `project_id:revision_id` is for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteMetadata {
    pub project_id: String,
    pub revision_id: String,
    pub adapter: Adapter,
    pub bootstrap_mode: BootstrapMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_template: Option<String>,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub files: Vec<SandboxFile>,
    pub steps: Vec<PlanStep>,
    pub metadata: ExecuteMetadata,
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub action: String,
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Events on the NDJSON stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SandboxEvent {
    Started {},
    StepStarted { step_id: String },
    StepFinished { step_id: String, result: StepResult },
    Completed { results: Vec<StepResult> },
    Error { message: String },
}

/// Single-JSON response shape when streaming is not negotiated.
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    results: Vec<StepResult>,
}

#[derive(Debug, Deserialize)]
struct RunnerErrorBody {
    error: String,
}

/// Callback invoked for every streamed event. The caller decides how to
/// broadcast; the client only delivers.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &SandboxEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&SandboxEvent) + Send + Sync,
{
    fn on_event(&self, event: &SandboxEvent) {
        self(event)
    }
}

/// A sink that drops everything.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: &SandboxEvent) {}
}

/// One attempt against the runner. Implementations do not degrade; the
/// [`run_plan`] wrapper owns that loop.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn execute(
        &self,
        request: &ExecuteRequest,
        timeout: Duration,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<StepResult>, SandboxError>;
}

/// Outcome of a plan run, including actions the runner refused.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SandboxRunResult {
    pub results: Vec<StepResult>,
    pub unsupported_actions: Vec<String>,
}

const REQUEST_TIMEOUT_PADDING_MS: u64 = 15_000;
const REQUEST_TIMEOUT_FLOOR_MS: u64 = 120_000;
const DEADLINE_HEADROOM_MS: u64 = 10_000;

/// Request timeout: step budgets plus padding, floored at 120 s, capped
/// 10 s below the job deadline.
pub fn request_timeout(plan: &SandboxPlan, job_deadline: Duration) -> Duration {
    let base = plan.total_timeout_ms() + REQUEST_TIMEOUT_PADDING_MS;
    let floored = base.max(REQUEST_TIMEOUT_FLOOR_MS);
    let cap = (job_deadline.as_millis() as u64).saturating_sub(DEADLINE_HEADROOM_MS);
    Duration::from_millis(floored.min(cap))
}

/// Run a plan with graceful degradation: unsupported actions are stripped
/// and the request resubmitted. If every action is unsupported the result
/// is empty rather than an error.
pub async fn run_plan(
    runner: &dyn SandboxRunner,
    plan: &SandboxPlan,
    files: Vec<SandboxFile>,
    project_id: &str,
    revision_id: &str,
    job_deadline: Duration,
    progress: &dyn ProgressSink,
) -> Result<SandboxRunResult, SandboxError> {
    let mut plan = plan.clone();
    let mut unsupported_actions = Vec::new();

    loop {
        if plan.steps.is_empty() {
            return Ok(SandboxRunResult {
                results: Vec::new(),
                unsupported_actions,
            });
        }

        let request = ExecuteRequest {
            files: files.clone(),
            steps: plan.steps.clone(),
            metadata: ExecuteMetadata {
                project_id: project_id.to_string(),
                revision_id: revision_id.to_string(),
                adapter: plan.adapter,
                bootstrap_mode: plan.bootstrap_mode,
                seed_template: plan.seed_template.clone(),
            },
        };
        let timeout = request_timeout(&plan, job_deadline);

        match runner.execute(&request, timeout, progress).await {
            Ok(results) => {
                return Ok(SandboxRunResult {
                    results,
                    unsupported_actions,
                });
            }
            Err(SandboxError::UnsupportedAction(name)) => {
                let Ok(action) = name.parse() else {
                    return Err(SandboxError::Protocol(format!(
                        "runner rejected unknown action '{name}'"
                    )));
                };
                if !plan.has_action(action) {
                    return Err(SandboxError::Runner(format!(
                        "runner rejected action '{name}' that was not submitted"
                    )));
                }
                warn!(action = %name, "runner does not support action, stripping and resubmitting");
                plan = plan.without_action(action);
                unsupported_actions.push(name);
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP client for the external runner service.
pub struct HttpSandboxRunner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSandboxRunner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SandboxRunner for HttpSandboxRunner {
    async fn execute(
        &self,
        request: &ExecuteRequest,
        timeout: Duration,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<StepResult>, SandboxError> {
        let url = format!("{}/execute", self.base_url.trim_end_matches('/'));
        debug!(url = %url, steps = request.steps.len(), ?timeout, "submitting sandbox request");

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::ACCEPT,
                "application/x-ndjson, application/json",
            )
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = response
                .text()
                .await
                .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
            return Err(parse_bad_request(&body));
        }
        if !status.is_success() {
            return Err(SandboxError::Unavailable(format!(
                "runner answered {status}"
            )));
        }

        let streaming = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/x-ndjson"));

        if streaming {
            consume_stream(response, progress).await
        } else {
            let body: ExecuteResponse = response
                .json()
                .await
                .map_err(|e| SandboxError::Protocol(e.to_string()))?;
            Ok(body.results)
        }
    }
}

/// Drain the NDJSON stream, forwarding each event, until `completed` or
/// `error` closes it.
async fn consume_stream(
    response: reqwest::Response,
    progress: &dyn ProgressSink,
) -> Result<Vec<StepResult>, SandboxError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut finished: Vec<StepResult> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        buffer.extend_from_slice(&chunk);

        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            match parse_event(&line)? {
                None => continue,
                Some(event) => {
                    progress.on_event(&event);
                    match event {
                        SandboxEvent::Completed { results } => return Ok(results),
                        SandboxEvent::Error { message } => {
                            return Err(SandboxError::Runner(message))
                        }
                        SandboxEvent::StepFinished { result, .. } => finished.push(result),
                        SandboxEvent::Started {} | SandboxEvent::StepStarted { .. } => {}
                    }
                }
            }
        }
    }

    // Stream ended without a terminal event; fall back to what finished.
    if finished.is_empty() {
        Err(SandboxError::Protocol(
            "stream ended without a completed event".to_string(),
        ))
    } else {
        warn!("sandbox stream ended without a completed event, using step results");
        Ok(finished)
    }
}

fn parse_event(line: &[u8]) -> Result<Option<SandboxEvent>, SandboxError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| SandboxError::Protocol(e.to_string()))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| SandboxError::Protocol(format!("{e}: {text}")))
}

const INVALID_ACTION_PREFIX: &str = "invalid step action: ";

/// Classify an HTTP 400 body: a degradable unsupported-action rejection or
/// a plain runner error.
fn parse_bad_request(body: &str) -> SandboxError {
    let message = serde_json::from_str::<RunnerErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());
    match message.strip_prefix(INVALID_ACTION_PREFIX) {
        Some(action) => SandboxError::UnsupportedAction(action.trim().to_string()),
        None => SandboxError::Runner(message),
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSandboxRunner;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted runner for tests. Records every request; pops queued
    /// responses, defaulting to success-per-step.
    pub struct FakeSandboxRunner {
        requests: Mutex<Vec<ExecuteRequest>>,
        responses: Mutex<VecDeque<Result<Vec<StepResult>, SandboxError>>>,
    }

    impl FakeSandboxRunner {
        pub fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(VecDeque::new()),
            }
        }

        pub fn push_response(&self, response: Result<Vec<StepResult>, SandboxError>) {
            self.responses.lock().push_back(response);
        }

        pub fn push_unsupported(&self, action: &str) {
            self.push_response(Err(SandboxError::UnsupportedAction(action.to_string())));
        }

        pub fn requests(&self) -> Vec<ExecuteRequest> {
            self.requests.lock().clone()
        }

        fn default_results(request: &ExecuteRequest) -> Vec<StepResult> {
            request
                .steps
                .iter()
                .map(|step| StepResult {
                    step_id: step.id.clone(),
                    action: step.action.as_str().to_string(),
                    success: true,
                    stdout: format!("{} ok", step.id),
                    stderr: String::new(),
                    duration_ms: 10,
                    summary: None,
                })
                .collect()
        }
    }

    impl Default for FakeSandboxRunner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SandboxRunner for FakeSandboxRunner {
        async fn execute(
            &self,
            request: &ExecuteRequest,
            _timeout: Duration,
            progress: &dyn ProgressSink,
        ) -> Result<Vec<StepResult>, SandboxError> {
            self.requests.lock().push(request.clone());

            let scripted = self.responses.lock().pop_front();
            let results = match scripted {
                Some(Ok(results)) => results,
                Some(Err(e)) => return Err(e),
                None => Self::default_results(request),
            };

            progress.on_event(&SandboxEvent::Started {});
            for result in &results {
                progress.on_event(&SandboxEvent::StepStarted {
                    step_id: result.step_id.clone(),
                });
                progress.on_event(&SandboxEvent::StepFinished {
                    step_id: result.step_id.clone(),
                    result: result.clone(),
                });
            }
            progress.on_event(&SandboxEvent::Completed {
                results: results.clone(),
            });
            Ok(results)
        }
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
