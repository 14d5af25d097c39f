use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Single monotonic clock injected into every component (spec §9: consolidate
/// on one clock so cooldowns and rate limiters are pure functions of
/// `(last_ts, now, rate)` and can be driven deterministically in tests).
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for tests: starts at construction time and only moves
/// forward when `advance` is called.
pub struct TestClock {
    start: Instant,
    offset: RwLock<Duration>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: RwLock::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.write() += by;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_now_forward() {
        let clock = TestClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }
}
