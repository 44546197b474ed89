use chrono::Utc;

/// Source of "now" in unix seconds. Injected so token expiry and webhook
/// tolerance can be exercised without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::Clock;

    /// Test clock that only moves when told to.
    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn at(now: i64) -> Self {
            Self(AtomicI64::new(now))
        }

        pub fn set(&self, now: i64) {
            self.0.store(now, Ordering::SeqCst);
        }

        pub fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
