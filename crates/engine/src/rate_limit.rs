// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-identity sliding-window rate limiting.
//!
//! The window is a sorted set of hit timestamps per key; the store
//! abstraction matches what a key-value store with sorted sets provides
//! natively. The limiter fails closed: a store error surfaces as
//! unavailable (a 503-equivalent), never as an allow.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use warden_core::Clock;

/// Errors from the rate limiter
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// One atomic window update: prune entries older than the window, record
/// the hit, return the resulting count.
pub trait SlidingWindowStore: Send + Sync {
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> Result<u64, RateLimitError>;
}

/// In-process window store: a timestamp deque per key.
#[derive(Default)]
pub struct InMemorySlidingWindow {
    windows: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl InMemorySlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlidingWindowStore for InMemorySlidingWindow {
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> Result<u64, RateLimitError> {
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_default();
        let cutoff = now_ms.saturating_sub(window_ms);
        while window.front().is_some_and(|&t| t < cutoff) {
            window.pop_front();
        }
        window.push_back(now_ms);
        Ok(window.len() as u64)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u64 },
    Limited,
}

impl Decision {
    pub fn is_limited(self) -> bool {
        matches!(self, Decision::Limited)
    }
}

/// Sliding-window limiter over a window store.
pub struct RateLimiter {
    store: Arc<dyn SlidingWindowStore>,
    clock: Arc<dyn Clock>,
    limit: u64,
    window_ms: u64,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SlidingWindowStore>,
        clock: Arc<dyn Clock>,
        limit: u64,
        window_ms: u64,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            window_ms,
        }
    }

    /// Record a hit for the identity and decide. Store failures propagate:
    /// callers answer 503, not 200.
    pub fn check(&self, key: &str) -> Result<Decision, RateLimitError> {
        let count = self
            .store
            .hit(key, self.clock.epoch_ms(), self.window_ms)?;
        if count > self.limit {
            Ok(Decision::Limited)
        } else {
            Ok(Decision::Allowed {
                remaining: self.limit - count,
            })
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
