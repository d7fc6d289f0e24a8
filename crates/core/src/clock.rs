// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable timestamps

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Deterministic clock for tests. Starts at a fixed epoch and only moves
/// when advanced explicitly.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now_ms: Arc<AtomicU64>,
}

impl FakeClock {
    /// 2026-01-01T00:00:00Z
    pub const DEFAULT_EPOCH_MS: u64 = 1_767_225_600_000;

    pub fn new() -> Self {
        Self::at(Self::DEFAULT_EPOCH_MS)
    }

    pub fn at(epoch_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(epoch_ms)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, epoch_ms: u64) {
        self.now_ms.store(epoch_ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
