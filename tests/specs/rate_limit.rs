//! Sliding-window rate limit specifications (spec scenario 5)

use std::sync::Arc;
use warden_core::FakeClock;
use warden_engine::{InMemorySlidingWindow, RateLimiter};

#[test]
fn limit_one_over_sixty_seconds_blocks_the_second_call() {
    let clock = Arc::new(FakeClock::new());
    let limiter = RateLimiter::new(
        Arc::new(InMemorySlidingWindow::new()),
        clock.clone(),
        1,
        60_000,
    );

    assert!(!limiter.check("api-key-1").unwrap().is_limited());
    assert!(limiter.check("api-key-1").unwrap().is_limited());

    // A different identity is unaffected
    assert!(!limiter.check("api-key-2").unwrap().is_limited());

    // After the window slides past the first hit, the key frees up
    clock.advance_ms(61_000);
    assert!(!limiter.check("api-key-1").unwrap().is_limited());
}
