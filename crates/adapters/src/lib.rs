// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-adapters: clients for the external sandbox runner, LLM, and PDF renderer

pub mod llm;
pub mod pdf;
pub mod sandbox;

pub use llm::{complete_with_fallback, CompletionRequest, LlmClient, LlmError, ModelOutcome};
pub use pdf::{PdfError, PdfRenderer};
pub use sandbox::{
    request_timeout, run_plan, ExecuteMetadata, ExecuteRequest, HttpSandboxRunner,
    NullProgressSink, ProgressSink, SandboxError, SandboxEvent, SandboxFile, SandboxRunResult,
    SandboxRunner, StepResult,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use llm::FakeLlmClient;
#[cfg(any(test, feature = "test-support"))]
pub use pdf::FakePdfRenderer;
#[cfg(any(test, feature = "test-support"))]
pub use sandbox::FakeSandboxRunner;
