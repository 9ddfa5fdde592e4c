use chrono::Utc;

/// Source of request timestamps in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        let now = Utc::now().timestamp();
        assert!(now >= 0, "System clock is before the epoch");
        now
    }
}

#[cfg(test)]
pub use self::manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::Clock;

    #[derive(Debug)]
    pub struct ManualClock {
        now: AtomicI64,
    }

    impl ManualClock {
        pub fn starting_at(now: i64) -> Self {
            Self {
                now: AtomicI64::new(now),
            }
        }

        pub fn advance(&self, seconds: i64) {
            self.now.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
