use core::cmp::Ordering;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Field, IdGenStatus, LeaseflakeId, RandSource, Result, SystemClock, ThreadRandom,
    TimeSource, generator::Mutex,
};

/// Largest backwards clock step, in milliseconds, that a worker waits out
/// instead of failing.
///
/// A regression of this size or more fails the call with
/// [`Error::ClockRegression`]. Waiting out a smaller one spins for less than
/// this many milliseconds.
pub const DEFAULT_REGRESSION_TOLERANCE_MS: u64 = 10;

#[derive(Clone, Copy, Debug)]
struct WorkerState {
    sequence: u16,
    /// Sequence value seeded when `last_timestamp` began. Reaching it again
    /// means every sequence value of the millisecond has been issued.
    anchor: u16,
    last_timestamp: u64,
}

/// A lock-based generator bound to a single slot.
///
/// All mutable state sits behind one mutex, so a worker can be shared across
/// threads (typically through an [`Arc`]) and concurrent callers serialize.
/// Within a millisecond the sequence counts up from a random seed, modulo
/// 4096; each new millisecond reseeds it, which spreads the low bits of the
/// issued IDs when they are later hashed or taken modulo a shard count.
///
/// ## Guarantees
/// - No two calls on the same worker return the same `(timestamp, sequence)`
/// - Timestamps never decrease across calls
/// - Regressions shorter than the tolerance are waited out, longer ones fail
///
/// ## See Also
/// - [`IdService`], which caches one worker per leased slot
///
/// [`Arc`]: std::sync::Arc
/// [`IdService`]: crate::IdService
pub struct SequenceWorker<T = SystemClock, R = ThreadRandom>
where
    T: TimeSource<u64>,
    R: RandSource<u16>,
{
    slot: u8,
    state: Mutex<WorkerState>,
    time: T,
    rng: R,
    regression_tolerance: u64,
}

impl<T, R> SequenceWorker<T, R>
where
    T: TimeSource<u64>,
    R: RandSource<u16>,
{
    /// Creates a worker for `slot` that has not issued anything yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] if `slot` exceeds
    /// [`LeaseflakeId::MAX_SLOT`].
    ///
    /// # Example
    /// ```
    /// use leaseflake::{SequenceWorker, SystemClock, ThreadRandom};
    ///
    /// let worker = SequenceWorker::new(3, SystemClock, ThreadRandom).unwrap();
    /// let id = worker.next_id().unwrap();
    /// assert_eq!(id.slot(), 3);
    /// ```
    pub fn new(slot: u8, time: T, rng: R) -> Result<Self> {
        Self::from_components(slot, 0, 0, time, rng)
    }

    /// Creates a worker preloaded with a previous timestamp and sequence.
    ///
    /// The given sequence also becomes the wrap anchor for `last_timestamp`.
    /// Mostly useful in tests and when resuming from a known point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] if any component is out of range.
    pub fn from_components(
        slot: u8,
        last_timestamp: u64,
        sequence: u16,
        time: T,
        rng: R,
    ) -> Result<Self> {
        // Validates every field in one place
        LeaseflakeId::encode(last_timestamp, slot, sequence)?;
        Ok(Self {
            slot,
            state: Mutex::new(WorkerState {
                sequence,
                anchor: sequence,
                last_timestamp,
            }),
            time,
            rng,
            regression_tolerance: DEFAULT_REGRESSION_TOLERANCE_MS,
        })
    }

    /// Overrides [`DEFAULT_REGRESSION_TOLERANCE_MS`].
    #[must_use]
    pub fn with_regression_tolerance(mut self, millis: u64) -> Self {
        self.regression_tolerance = millis;
        self
    }

    /// The slot embedded in every ID this worker issues.
    pub const fn slot(&self) -> u8 {
        self.slot
    }

    /// The configured regression tolerance in milliseconds.
    pub const fn regression_tolerance(&self) -> u64 {
        self.regression_tolerance
    }

    /// Generates the next ID, spinning through sequence exhaustion and small
    /// clock regressions.
    ///
    /// The spin re-reads the clock without sleeping. It lasts at most until
    /// the next millisecond on exhaustion, and under the regression
    /// tolerance when the clock stepped back.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockRegression`] if the clock moved back by the tolerance
    ///   or more.
    /// - [`Error::EncodingOverflow`] if the clock is past the 44-bit range.
    /// - [`Error::LockPoisoned`] if another thread panicked mid-call (std
    ///   mutexes only).
    pub fn next_id(&self) -> Result<LeaseflakeId> {
        loop {
            match self.try_poll_id()? {
                IdGenStatus::Ready { id } => break Ok(id),
                IdGenStatus::Pending { .. } => core::hint::spin_loop(),
            }
        }
    }

    /// Attempts to generate the next ID without waiting.
    ///
    /// # Returns
    /// - `Ok(IdGenStatus::Ready { id })`: a new ID is available
    /// - `Ok(IdGenStatus::Pending { yield_for })`: the millisecond is
    ///   exhausted or the clock is briefly behind; poll again later
    /// - `Err(e)`: the clock is unusable or the lock was poisoned
    ///
    /// # Errors
    ///
    /// Same as [`Self::next_id`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(slot = self.slot)))]
    pub fn try_poll_id(&self) -> Result<IdGenStatus> {
        let mut state = {
            #[cfg(feature = "parking-lot")]
            {
                self.state.lock()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.state.lock()?
            }
        };

        // Read under the lock: a reading taken while queued behind other
        // callers would look like a regression once they advanced the state
        let now = self.time.current_millis();
        if now > LeaseflakeId::MAX_TIMESTAMP {
            return Err(Self::cold_timestamp_overflow(now));
        }

        match now.cmp(&state.last_timestamp) {
            Ordering::Equal => {
                let next = (state.sequence + 1) & LeaseflakeId::MAX_SEQUENCE;
                if next == state.anchor {
                    return Ok(IdGenStatus::Pending { yield_for: 1 });
                }
                state.sequence = next;
                Ok(IdGenStatus::Ready {
                    id: LeaseflakeId::from_components(now, self.slot, next),
                })
            }
            Ordering::Greater => {
                let seed = self.rng.rand() & LeaseflakeId::MAX_SEQUENCE;
                *state = WorkerState {
                    sequence: seed,
                    anchor: seed,
                    last_timestamp: now,
                };
                Ok(IdGenStatus::Ready {
                    id: LeaseflakeId::from_components(now, self.slot, seed),
                })
            }
            Ordering::Less => self.cold_clock_behind(now, state.last_timestamp),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, now: u64, last_timestamp: u64) -> Result<IdGenStatus> {
        let behind_ms = last_timestamp - now;
        if behind_ms >= self.regression_tolerance {
            #[cfg(feature = "tracing")]
            tracing::error!(
                slot = self.slot,
                behind_ms,
                tolerance_ms = self.regression_tolerance,
                "clock moved backwards beyond tolerance"
            );
            return Err(Error::ClockRegression {
                behind_ms,
                tolerance_ms: self.regression_tolerance,
            });
        }
        Ok(IdGenStatus::Pending {
            yield_for: behind_ms,
        })
    }

    #[cold]
    #[inline(never)]
    const fn cold_timestamp_overflow(now: u64) -> Error {
        Error::EncodingOverflow {
            field: Field::Timestamp,
            value: now,
            max: LeaseflakeId::MAX_TIMESTAMP,
        }
    }
}
