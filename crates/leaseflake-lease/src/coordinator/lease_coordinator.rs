use core::time::Duration;
use std::sync::Arc;

use leaseflake::{Error, SlotSource, SystemClock, TimeSource};
use portable_atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tracing::instrument;

use super::state::LocalLease;
use crate::{
    LeaseConfig, LeaseError, LeaseStatus, LeaseStore, OwnerToken, Result,
    config::millis_u64,
};

struct Inner<S, T> {
    store: Arc<S>,
    clock: T,
    config: LeaseConfig,
    owner: OwnerToken,
    lease: LocalLease,
    skew_ms: AtomicU64,
    /// Woken after every refresh cycle, successful or not.
    cycle_done: Notify,
}

/// Rents one slot at a time from a [`LeaseStore`] and hands it out through
/// [`SlotSource`].
///
/// Cloning is cheap and every clone shares the same lease. `current_slot` is
/// a single atomic load plus a clock read; the database is only touched by
/// [`refresh`](Self::refresh), usually driven by [`spawn`](Self::spawn).
pub struct LeaseCoordinator<S, T = SystemClock> {
    inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for LeaseCoordinator<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> LeaseCoordinator<S>
where
    S: LeaseStore,
{
    /// Creates a coordinator on the wall clock with a fresh owner token.
    ///
    /// No slot is held until the first refresh completes.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if `config` does not validate.
    pub fn new(store: S, config: LeaseConfig) -> Result<Self> {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S, T> LeaseCoordinator<S, T>
where
    S: LeaseStore,
    T: TimeSource<u64> + Send + Sync + 'static,
{
    /// Creates a coordinator whose local deadlines are measured on `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if `config` does not validate.
    pub fn with_clock(store: S, config: LeaseConfig, clock: T) -> Result<Self> {
        Self::with_owner(store, config, clock, OwnerToken::generate())
    }

    /// Creates a coordinator that claims rows as `owner`.
    ///
    /// Two coordinators must never share a token; they would renew each
    /// other's slot.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if `config` does not validate.
    pub fn with_owner(store: S, config: LeaseConfig, clock: T, owner: OwnerToken) -> Result<Self> {
        config.validate()?;
        tracing::debug!(%owner, ?config, "lease coordinator created");
        Ok(Self {
            inner: Arc::new(Inner {
                store: Arc::new(store),
                clock,
                config,
                owner,
                lease: LocalLease::new(),
                skew_ms: AtomicU64::new(0),
                cycle_done: Notify::new(),
            }),
        })
    }

    pub fn owner_token(&self) -> &OwnerToken {
        &self.inner.owner
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Distance between the database and local clocks seen by the last
    /// successful claim, in milliseconds.
    pub fn clock_skew_millis(&self) -> u64 {
        self.inner.skew_ms.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> LeaseStatus {
        let now = self.inner.clock.current_millis();
        self.inner.lease.status(now, self.inner.config.expiry_guard)
    }

    /// Runs one refresh cycle: renew the owned slot or claim an expired one.
    ///
    /// Up to [`LeaseConfig::attempts`] attempts are made, separated by
    /// [`LeaseConfig::retry_backoff`]. The local deadline is counted from the
    /// start of the cycle, not from the successful attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::AcquisitionFailed`] carrying the last attempt's
    /// error once every attempt failed. The coordinator then holds no slot
    /// until a later cycle succeeds.
    #[instrument(level = "debug", skip(self), fields(owner = %self.inner.owner))]
    pub async fn refresh(&self) -> Result<u8> {
        let result = self.run_cycle().await;
        self.inner.cycle_done.notify_waiters();
        result
    }

    async fn run_cycle(&self) -> Result<u8> {
        let config = &self.inner.config;
        let cycle_start = self.inner.clock.current_millis();
        let previous = self.inner.lease.get();

        let mut attempt = 1;
        let last = loop {
            match self.attempt(cycle_start).await {
                Ok(slot) => {
                    self.log_transition(previous, slot, cycle_start);
                    return Ok(slot);
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts = config.attempts, error = %err, "lease attempt failed");
                    if attempt >= config.attempts {
                        break err;
                    }
                }
            }
            attempt += 1;
            sleep(config.retry_backoff).await;
        };

        self.inner.lease.clear();
        let err = LeaseError::AcquisitionFailed {
            attempts: config.attempts,
            last: Box::new(last),
        };
        tracing::error!(
            error = %err,
            previous_slot = previous.map(|(slot, _)| slot),
            "refresh cycle failed, no slot held until the next cycle"
        );
        Err(err)
    }

    async fn attempt(&self, cycle_start: u64) -> Result<u8> {
        let config = &self.inner.config;
        let store = Arc::clone(&self.inner.store);
        let owner = self.inner.owner.clone();
        let guard = config.expiry_guard;
        let lease = config.lease_duration;

        let (candidate, won) = tokio::task::spawn_blocking(move || {
            let candidate = match store.find_owned(&owner, guard)? {
                Some(owned) => owned,
                None => store.find_expired(guard)?.ok_or(LeaseError::NoFreeSlot)?,
            };
            let won = store.claim(&candidate, &owner, lease)?;
            Ok::<_, LeaseError>((candidate, won))
        })
        .await??;

        if !won {
            return Err(LeaseError::LostRace {
                slot: candidate.slot,
            });
        }

        let local_now = i64::try_from(self.inner.clock.current_millis()).unwrap_or(i64::MAX);
        let skew_ms = candidate.db_now_millis.abs_diff(local_now);
        self.inner.skew_ms.store(skew_ms, Ordering::Relaxed);

        let max_skew_ms = millis_u64(config.max_clock_skew);
        if skew_ms > max_skew_ms {
            // the row is ours in the database, but our deadline would be wrong
            self.inner.lease.clear();
            return Err(LeaseError::ClockSkewExceeded {
                skew_ms,
                max_skew_ms,
            });
        }

        let expires_at = cycle_start.saturating_add(millis_u64(config.local_validity()));
        self.inner.lease.set(candidate.slot, expires_at);
        Ok(candidate.slot)
    }

    fn log_transition(&self, previous: Option<(u8, u64)>, slot: u8, cycle_start: u64) {
        let skew_ms = self.clock_skew_millis();
        match previous {
            Some((held, expires_at)) if held == slot && cycle_start <= expires_at => {
                tracing::debug!(slot, skew_ms, "lease renewed");
            }
            Some((held, expires_at)) if held == slot => {
                tracing::warn!(
                    slot,
                    skew_ms,
                    lapsed_ms = cycle_start - expires_at,
                    "lease lapsed locally before renewal, renewed the same slot"
                );
            }
            Some((held, _)) => {
                tracing::warn!(previous_slot = held, slot, skew_ms, "lease moved to a new slot");
            }
            None => tracing::info!(slot, skew_ms, "lease acquired"),
        }
    }

    /// Waits until a slot is usable, for at most `limit`.
    ///
    /// Returns immediately if one already is. Otherwise wakes after each
    /// refresh cycle, so something else (normally [`spawn`](Self::spawn))
    /// has to drive the refreshes.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Timeout`] if no slot became usable in time.
    pub async fn wait_for_slot(&self, limit: Duration) -> Result<u8> {
        let wait = async {
            loop {
                let notified = self.inner.cycle_done.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if let Ok(slot) = self.current_slot() {
                    return slot;
                }
                notified.await;
            }
        };
        timeout(limit, wait).await.map_err(|_| LeaseError::Timeout {
            waited_ms: millis_u64(limit),
        })
    }
}

impl<S, T> SlotSource for LeaseCoordinator<S, T>
where
    T: TimeSource<u64>,
{
    fn current_slot(&self) -> leaseflake::Result<u8> {
        let now = self.inner.clock.current_millis();
        self.inner.lease.usable_slot(now).ok_or(Error::SlotUnavailable)
    }
}
