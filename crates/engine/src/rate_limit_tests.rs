// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use warden_core::FakeClock;

fn limiter(limit: u64, window_secs: u64) -> (RateLimiter, Arc<FakeClock>) {
    let clock = Arc::new(FakeClock::new());
    let limiter = RateLimiter::new(
        Arc::new(InMemorySlidingWindow::new()),
        clock.clone(),
        limit,
        window_secs * 1000,
    );
    (limiter, clock)
}

#[test]
fn second_call_within_the_window_is_limited() {
    let (limiter, _) = limiter(1, 60);

    assert_eq!(
        limiter.check("user-1").unwrap(),
        Decision::Allowed { remaining: 0 }
    );
    assert!(limiter.check("user-1").unwrap().is_limited());
}

#[test]
fn window_expiry_frees_the_identity() {
    let (limiter, clock) = limiter(1, 60);

    assert!(!limiter.check("user-1").unwrap().is_limited());
    assert!(limiter.check("user-1").unwrap().is_limited());

    clock.advance_ms(61_000);
    assert!(!limiter.check("user-1").unwrap().is_limited());
}

#[test]
fn identities_are_independent() {
    let (limiter, _) = limiter(1, 60);

    assert!(!limiter.check("user-1").unwrap().is_limited());
    assert!(!limiter.check("user-2").unwrap().is_limited());
}

#[test]
fn remaining_counts_down() {
    let (limiter, _) = limiter(3, 60);

    assert_eq!(
        limiter.check("u").unwrap(),
        Decision::Allowed { remaining: 2 }
    );
    assert_eq!(
        limiter.check("u").unwrap(),
        Decision::Allowed { remaining: 1 }
    );
    assert_eq!(
        limiter.check("u").unwrap(),
        Decision::Allowed { remaining: 0 }
    );
    assert!(limiter.check("u").unwrap().is_limited());
}

#[test]
fn store_failure_fails_closed() {
    struct BrokenStore;
    impl SlidingWindowStore for BrokenStore {
        fn hit(&self, _key: &str, _now_ms: u64, _window_ms: u64) -> Result<u64, RateLimitError> {
            Err(RateLimitError::Unavailable("broker down".into()))
        }
    }

    let limiter = RateLimiter::new(
        Arc::new(BrokenStore),
        Arc::new(FakeClock::new()),
        10,
        60_000,
    );
    assert!(limiter.check("user-1").is_err());
}

#[test]
fn sliding_window_slides_rather_than_resets() {
    let (limiter, clock) = limiter(2, 60);

    limiter.check("u").unwrap(); // t=0
    clock.advance_ms(40_000);
    limiter.check("u").unwrap(); // t=40s
    clock.advance_ms(30_000); // t=70s: first hit expired, second still in window

    assert_eq!(
        limiter.check("u").unwrap(),
        Decision::Allowed { remaining: 0 }
    );
    assert!(limiter.check("u").unwrap().is_limited());
}
