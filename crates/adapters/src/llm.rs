// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM completion client abstraction.
//!
//! The provider SDK lives outside the core; the pipeline consumes this
//! trait only. The audit stage retries the primary model on retryable
//! errors, then falls back to the fallback model, preserving the primary
//! failure as an artifact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use warden_core::RetryPolicy;

/// Errors from the completion API
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Rate limits, overload, transport hiccups. Worth another attempt.
    #[error("retryable llm error: {0}")]
    Retryable(String),
    #[error("llm error: {0}")]
    Fatal(String),
    #[error("malformed llm response: {0}")]
    Malformed(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Retryable(_))
    }
}

/// A completion request. The prompt already embeds the report schema the
/// model must conform to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model_id: String,
    pub prompt: String,
}

/// Completion API returning a JSON-schema-conformant object.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest)
        -> Result<serde_json::Value, LlmError>;
}

/// What a primary-plus-fallback completion produced.
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub value: serde_json::Value,
    /// The model that actually answered
    pub model_id: String,
    /// The primary model's final error when the fallback answered
    pub primary_error: Option<String>,
}

/// Complete with the primary model under the retry policy; on exhaustion,
/// fall back to the fallback model with the same policy.
pub async fn complete_with_fallback(
    client: &dyn LlmClient,
    primary_model: &str,
    fallback_model: &str,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<ModelOutcome, LlmError> {
    match complete_with_retry(client, primary_model, prompt, policy).await {
        Ok(value) => Ok(ModelOutcome {
            value,
            model_id: primary_model.to_string(),
            primary_error: None,
        }),
        Err(primary_error) => {
            warn!(
                model = primary_model,
                error = %primary_error,
                "primary model failed, falling back",
            );
            let value = complete_with_retry(client, fallback_model, prompt, policy).await?;
            Ok(ModelOutcome {
                value,
                model_id: fallback_model.to_string(),
                primary_error: Some(primary_error.to_string()),
            })
        }
    }
}

async fn complete_with_retry(
    client: &dyn LlmClient,
    model_id: &str,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<serde_json::Value, LlmError> {
    let request = CompletionRequest {
        model_id: model_id.to_string(),
        prompt: prompt.to_string(),
    };
    let mut attempt = 1;
    loop {
        match client.complete(&request).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                warn!(model = model_id, attempt, error = %e, "retrying completion");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLlmClient;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted completion client. Responses are popped per call; when the
    /// queue is empty every call answers with the default report.
    pub struct FakeLlmClient {
        requests: Mutex<Vec<CompletionRequest>>,
        responses: Mutex<VecDeque<Result<serde_json::Value, LlmError>>>,
        default_response: Mutex<serde_json::Value>,
    }

    impl FakeLlmClient {
        pub fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(VecDeque::new()),
                default_response: Mutex::new(serde_json::json!({
                    "schema_version": 2,
                    "summary": "no issues found",
                    "findings": [],
                    "files_considered": [],
                })),
            }
        }

        pub fn push_response(&self, response: Result<serde_json::Value, LlmError>) {
            self.responses.lock().push_back(response);
        }

        pub fn set_default_response(&self, value: serde_json::Value) {
            *self.default_response.lock() = value;
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().clone()
        }
    }

    impl Default for FakeLlmClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LlmClient for FakeLlmClient {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<serde_json::Value, LlmError> {
            self.requests.lock().push(request.clone());
            match self.responses.lock().pop_front() {
                Some(response) => response,
                None => Ok(self.default_response.lock().clone()),
            }
        }
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
