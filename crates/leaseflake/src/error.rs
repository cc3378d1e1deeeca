use core::fmt;

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// One of the three bit fields packed into a [`LeaseflakeId`].
///
/// [`LeaseflakeId`]: crate::LeaseflakeId
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Timestamp,
    Slot,
    Sequence,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timestamp => "timestamp",
            Self::Slot => "slot",
            Self::Sequence => "sequence",
        })
    }
}

/// All errors that identifier generation can surface to a caller.
///
/// Only [`Error::SlotUnavailable`] is worth retrying; everything else points
/// at a configuration bug or a misbehaving clock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A component did not fit its bit field.
    ///
    /// Raised for an out-of-range slot handed to a worker, a raw value with
    /// the sign bit set, or a clock reading beyond the 44-bit timestamp range.
    #[error("{field} value {value} exceeds the maximum of {max}")]
    EncodingOverflow { field: Field, value: u64, max: u64 },

    /// The clock moved backwards further than the worker tolerates.
    #[error("clock moved backwards by {behind_ms}ms (tolerance is {tolerance_ms}ms)")]
    ClockRegression { behind_ms: u64, tolerance_ms: u64 },

    /// No slot lease is currently valid for this process.
    ///
    /// Expected during startup and after a missed renewal. Callers should
    /// retry after the next refresh cycle.
    #[error("no slot is currently leased to this process")]
    SlotUnavailable,

    /// A worker mutex was poisoned by a panicking thread.
    ///
    /// `parking_lot` mutexes do not poison, so this variant only exists
    /// without the `parking-lot` feature.
    #[cfg(not(feature = "parking-lot"))]
    #[error("worker lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` when retrying later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SlotUnavailable)
    }
}

#[cfg(not(feature = "parking-lot"))]
use std::sync::PoisonError;

// Collapse every poisoned guard into `LockPoisoned`
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
