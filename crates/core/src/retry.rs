// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reusable retry policy applied to all external calls

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt-1)`
    Exponential,
}

/// Bounded retry with back-off. Attempts are 1-based; `delay_for(n)` is the
/// pause *after* attempt `n` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Object-store policy: linear back-off, 3 attempts (spec §4.1).
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff: Backoff::Linear,
        }
    }

    /// Queue-job policy: exponential back-off from 5 s, 3 attempts (spec §4.4).
    pub fn queue() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            backoff: Backoff::Exponential,
        }
    }

    /// LLM policy: two retries after the initial call (spec §6).
    pub fn llm() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            backoff: Backoff::Exponential,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let ms = match self.backoff {
            Backoff::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
            Backoff::Exponential => self
                .base_delay_ms
                .saturating_mul(1u64 << (attempt - 1).min(16)),
        };
        Duration::from_millis(ms)
    }

    /// True when another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
