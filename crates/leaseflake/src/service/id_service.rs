use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    DEFAULT_REGRESSION_TOLERANCE_MS, LeaseflakeId, RandSource, Result, SequenceWorker, SlotSource,
    SystemClock, ThreadRandom, TimeSource, generator::RwLock,
};

/// Issues IDs for whatever slot its [`SlotSource`] currently grants.
///
/// The service owns a cache of one [`SequenceWorker`] per slot it has been
/// handed. When the source switches to a different slot (only after a lease
/// was lost and another acquired) a fresh worker is created for it; the old
/// one stays cached but idle. Two services never share workers, even inside
/// one process.
///
/// # Example
/// ```
/// use leaseflake::{IdService, StaticSlot};
///
/// let service = IdService::new(StaticSlot::new(12).unwrap());
/// let id = service.next_id().unwrap();
/// assert_eq!(id.slot(), 12);
/// ```
pub struct IdService<S, T = SystemClock, R = ThreadRandom>
where
    S: SlotSource,
    T: TimeSource<u64> + Clone,
    R: RandSource<u16> + Clone,
{
    source: S,
    workers: RwLock<HashMap<u8, Arc<SequenceWorker<T, R>>>>,
    time: T,
    rng: R,
    regression_tolerance: u64,
}

impl<S> IdService<S>
where
    S: SlotSource,
{
    /// Creates a service reading the wall clock and the thread-local RNG.
    pub fn new(source: S) -> Self {
        Self::with_components(source, SystemClock, ThreadRandom)
    }
}

impl<S, T, R> IdService<S, T, R>
where
    S: SlotSource,
    T: TimeSource<u64> + Clone,
    R: RandSource<u16> + Clone,
{
    /// Creates a service whose workers share clones of `time` and `rng`.
    pub fn with_components(source: S, time: T, rng: R) -> Self {
        Self {
            source,
            workers: RwLock::new(HashMap::new()),
            time,
            rng,
            regression_tolerance: DEFAULT_REGRESSION_TOLERANCE_MS,
        }
    }

    /// Regression tolerance handed to every worker created from now on.
    #[must_use]
    pub fn with_regression_tolerance(mut self, millis: u64) -> Self {
        self.regression_tolerance = millis;
        self
    }

    /// Generates the next ID for the currently granted slot.
    ///
    /// # Errors
    ///
    /// - [`Error::SlotUnavailable`] straight from the source; retry later.
    /// - Any error of [`SequenceWorker::next_id`].
    ///
    /// [`Error::SlotUnavailable`]: crate::Error::SlotUnavailable
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> Result<LeaseflakeId> {
        let slot = self.source.current_slot()?;
        self.worker(slot)?.next_id()
    }

    /// Slots for which a worker has been created, in ascending order.
    ///
    /// # Errors
    ///
    /// Fails only if the cache lock was poisoned.
    pub fn cached_slots(&self) -> Result<Vec<u8>> {
        let workers = {
            #[cfg(feature = "parking-lot")]
            {
                self.workers.read()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.workers.read()?
            }
        };
        let mut slots: Vec<u8> = workers.keys().copied().collect();
        slots.sort_unstable();
        Ok(slots)
    }

    fn worker(&self, slot: u8) -> Result<Arc<SequenceWorker<T, R>>> {
        {
            #[cfg(feature = "parking-lot")]
            let workers = self.workers.read();
            #[cfg(not(feature = "parking-lot"))]
            let workers = self.workers.read()?;
            if let Some(worker) = workers.get(&slot) {
                return Ok(Arc::clone(worker));
            }
        }

        #[cfg(feature = "parking-lot")]
        let mut workers = self.workers.write();
        #[cfg(not(feature = "parking-lot"))]
        let mut workers = self.workers.write()?;

        // Another caller may have won the race for the write lock
        if let Some(worker) = workers.get(&slot) {
            return Ok(Arc::clone(worker));
        }

        let worker = Arc::new(
            SequenceWorker::new(slot, self.time.clone(), self.rng.clone())?
                .with_regression_tolerance(self.regression_tolerance),
        );
        workers.insert(slot, Arc::clone(&worker));

        #[cfg(feature = "tracing")]
        tracing::debug!(slot, cached = workers.len(), "created sequence worker");

        Ok(worker)
    }
}
