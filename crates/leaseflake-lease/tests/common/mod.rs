#![allow(dead_code)]

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use leaseflake::{SystemClock, TimeSource};
use leaseflake_lease::LeaseConfig;

/// Clock the test moves by hand, starting from the real time so the database
/// sees no skew.
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn now() -> Arc<Self> {
        Self::at(SystemClock.current_millis())
    }

    pub fn at(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(millis),
        })
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource<u64> for ManualClock {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Default timings with retries short enough for tests.
pub fn fast_config() -> LeaseConfig {
    LeaseConfig {
        retry_backoff: Duration::from_millis(5),
        ..LeaseConfig::default()
    }
}
