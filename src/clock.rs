//! Time source for countdowns and simulated delays.
//!
//! Everything that reads "now" or waits goes through [`Clock`] so tests can
//! drive time by hand instead of sleeping.

use std::time::Duration;

pub trait Clock: Send + Sync {
    /// Current wall-clock time in epoch milliseconds
    fn now_ms(&self) -> i64;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Real wall clock backed by chrono and `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::Clock;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Test clock: `sleep` advances time instantly and records the call
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now: AtomicI64,
        sleeps: AtomicUsize,
    }

    impl ManualClock {
        pub fn at(now_ms: i64) -> Self {
            Self {
                now: AtomicI64::new(now_ms),
                sleeps: AtomicUsize::new(0),
            }
        }

        pub fn advance(&self, duration: Duration) {
            self.now
                .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
        }

        pub fn sleeps(&self) -> usize {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::at(1_000);
        clock.sleep(Duration::from_millis(1_500));
        assert_eq!(clock.now_ms(), 2_500);
        assert_eq!(clock.sleeps(), 1);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
