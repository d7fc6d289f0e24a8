// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Loading the file is the deployment's job; the engine consumes the
//! typed value. Everything has a default so an empty document is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use warden_core::{ArchiveLimits, Backoff, QueueName, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Per-queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub deadline_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            deadline_secs: 30 * 60,
        }
    }
}

impl QueueConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Job retry tuning; becomes a [`RetryPolicy`] with exponential back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            backoff: Backoff::Exponential,
        }
    }
}

/// Sliding-window rate limit over the external surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub limit: u64,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 60,
        }
    }
}

/// The whole engine configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides keyed by queue name; unlisted queues get defaults.
    pub queues: HashMap<String, QueueConfig>,
    pub retry: RetryConfig,
    pub archive: ArchiveLimits,
    pub retention_days: u32,
    pub sandbox_url: String,
    pub rate_limit: RateLimitConfig,
}

const DEFAULT_RETENTION_DAYS: u32 = 30;

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: EngineConfig = toml::from_str(raw)?;
        config.fill_defaults();
        Ok(config)
    }

    fn fill_defaults(&mut self) {
        if self.retention_days == 0 {
            self.retention_days = DEFAULT_RETENTION_DAYS;
        }
        if self.sandbox_url.is_empty() {
            self.sandbox_url = "http://127.0.0.1:8811".to_string();
        }
    }

    /// Effective settings for a queue.
    pub fn queue(&self, name: QueueName) -> QueueConfig {
        self.queues
            .get(name.as_str())
            .copied()
            .unwrap_or_else(|| default_queue_config(name))
    }

    pub fn retention_days(&self) -> u32 {
        if self.retention_days == 0 {
            DEFAULT_RETENTION_DAYS
        } else {
            self.retention_days
        }
    }
}

fn default_queue_config(name: QueueName) -> QueueConfig {
    let concurrency = match name {
        QueueName::Ingest | QueueName::FindingLifecycle => 4,
        QueueName::Verify | QueueName::Audit | QueueName::Pdf => 2,
        QueueName::DocsCrawl | QueueName::DocsIndex | QueueName::Cleanup => 1,
    };
    QueueConfig {
        concurrency,
        ..QueueConfig::default()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
