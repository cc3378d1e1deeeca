use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimeSource;

/// Wall-clock time source backed by [`SystemTime`].
///
/// Unlike a monotonic ticker this clock follows NTP steps and manual
/// adjustments, including backwards ones. Lease deadlines are wall-clock
/// times, and the sequence worker bounds regressions itself.
///
/// A clock reading before the Unix epoch is reported as `0`.
#[derive(Default, Clone, Copy, Debug)]
pub struct SystemClock;

impl TimeSource<u64> for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}
