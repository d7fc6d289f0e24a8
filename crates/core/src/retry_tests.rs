// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn linear_backoff_scales_with_attempt() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 100,
        backoff: Backoff::Linear,
    };
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(300));
}

#[test]
fn exponential_backoff_doubles() {
    let policy = RetryPolicy::queue();
    assert_eq!(policy.delay_for(1), Duration::from_millis(5_000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(10_000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(20_000));
}

#[test]
fn should_retry_respects_max_attempts() {
    let policy = RetryPolicy::queue();
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
}

#[test]
fn attempt_zero_is_clamped() {
    let policy = RetryPolicy::storage();
    assert_eq!(policy.delay_for(0), policy.delay_for(1));
}

#[test]
fn huge_attempt_does_not_overflow() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: u64::MAX / 2,
        backoff: Backoff::Exponential,
    };
    // Saturates rather than panicking
    let _ = policy.delay_for(64);
}
