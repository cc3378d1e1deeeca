use core::time::Duration;

use crate::{LeaseError, Result};

/// Table used when none is configured.
pub const DEFAULT_TABLE_NAME: &str = "slot_lease";

/// Timing knobs for the lease protocol.
///
/// The database-side lease lasts `lease_duration`. Locally a slot is trusted
/// only until `cycle start + lease_duration - max_clock_skew`, so a process
/// whose clock runs slow stops issuing IDs before the database considers the
/// slot free.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseConfig {
    /// How long a claim or renewal keeps the row, measured by the database.
    pub lease_duration: Duration,
    /// Period of the background refresh task.
    pub refresh_interval: Duration,
    /// Largest tolerated difference between database and local clocks.
    pub max_clock_skew: Duration,
    /// Rows within this margin of expiry are neither renewed as owned nor
    /// claimed as expired.
    pub expiry_guard: Duration,
    /// Acquisition attempts per refresh cycle.
    pub attempts: usize,
    /// Pause between failed attempts of one cycle.
    pub retry_backoff: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(60),
            max_clock_skew: Duration::from_secs(100),
            expiry_guard: Duration::from_secs(1),
            attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl LeaseConfig {
    /// How long after a cycle starts the local process keeps using its slot.
    pub fn local_validity(&self) -> Duration {
        self.lease_duration.saturating_sub(self.max_clock_skew)
    }

    /// Checks that a renewal can always land before the local deadline.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(LeaseError::InvalidConfig { reason });

        if self.attempts == 0 {
            return invalid("attempts must be at least 1".into());
        }
        if self.refresh_interval.is_zero() {
            return invalid("refresh interval must be positive".into());
        }
        if self.max_clock_skew >= self.lease_duration {
            return invalid(format!(
                "max clock skew ({:?}) must be shorter than the lease ({:?})",
                self.max_clock_skew, self.lease_duration
            ));
        }
        let worst_cycle = self.refresh_interval
            + self
                .retry_backoff
                .saturating_mul(u32::try_from(self.attempts - 1).unwrap_or(u32::MAX));
        if worst_cycle >= self.local_validity() {
            return invalid(format!(
                "refresh interval plus retries ({worst_cycle:?}) must fit inside the local \
                 validity window ({:?})",
                self.local_validity()
            ));
        }
        if self.expiry_guard >= self.local_validity() {
            return invalid(format!(
                "expiry guard ({:?}) must be shorter than the local validity window ({:?})",
                self.expiry_guard,
                self.local_validity()
            ));
        }
        Ok(())
    }
}

/// Saturating conversion for SQL parameters and clock arithmetic.
pub(crate) fn millis_i64(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

pub(crate) fn millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LeaseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.local_validity(), Duration::from_secs(200));
    }

    #[test]
    fn rejects_skew_as_long_as_the_lease() {
        let config = LeaseConfig {
            max_clock_skew: Duration::from_secs(300),
            ..LeaseConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeaseError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_refresh_slower_than_local_validity() {
        let config = LeaseConfig {
            refresh_interval: Duration::from_secs(199),
            ..LeaseConfig::default()
        };
        // 199s plus two 1s backoffs overshoots the 200s window
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempts_and_zero_interval() {
        let no_attempts = LeaseConfig {
            attempts: 0,
            ..LeaseConfig::default()
        };
        let no_interval = LeaseConfig {
            refresh_interval: Duration::ZERO,
            ..LeaseConfig::default()
        };
        assert!(no_attempts.validate().is_err());
        assert!(no_interval.validate().is_err());
    }

    #[test]
    fn millis_conversions_saturate() {
        assert_eq!(millis_i64(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis_i64(Duration::MAX), i64::MAX);
        assert_eq!(millis_u64(Duration::MAX), u64::MAX);
    }
}
