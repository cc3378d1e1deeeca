use core::time::Duration;
use std::sync::Arc;

use crate::{OwnerToken, Result};

/// A row picked as the target of a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaseCandidate {
    pub slot: u8,
    /// Version read together with the row. The claim only succeeds if the
    /// row still carries it.
    pub version: i64,
    /// The database clock at the time of the read, in Unix milliseconds.
    pub db_now_millis: i64,
}

/// Snapshot of one lease row, for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotLeaseRecord {
    pub slot: u8,
    pub owner_token: String,
    pub version: i64,
    pub expires_at_millis: i64,
}

/// Storage backing the lease protocol.
///
/// Implementations must evaluate "now" with the database's clock so every
/// process agrees on when a lease runs out. All methods block; the
/// coordinator calls them from a blocking task.
pub trait LeaseStore: Send + Sync + 'static {
    /// A row owned by `owner` that stays valid for longer than `guard`.
    fn find_owned(&self, owner: &OwnerToken, guard: Duration) -> Result<Option<LeaseCandidate>>;

    /// A row whose lease ran out more than `guard` ago. Which one is up to
    /// the store; spreading picks across rows keeps racing processes apart.
    fn find_expired(&self, guard: Duration) -> Result<Option<LeaseCandidate>>;

    /// Compare-and-swap on `candidate.version`: hands the row to `owner` for
    /// `lease` and bumps the version. Returns `false` when another owner got
    /// there first.
    fn claim(&self, candidate: &LeaseCandidate, owner: &OwnerToken, lease: Duration)
    -> Result<bool>;
}

impl<S> LeaseStore for Arc<S>
where
    S: LeaseStore + ?Sized,
{
    fn find_owned(&self, owner: &OwnerToken, guard: Duration) -> Result<Option<LeaseCandidate>> {
        (**self).find_owned(owner, guard)
    }

    fn find_expired(&self, guard: Duration) -> Result<Option<LeaseCandidate>> {
        (**self).find_expired(guard)
    }

    fn claim(
        &self,
        candidate: &LeaseCandidate,
        owner: &OwnerToken,
        lease: Duration,
    ) -> Result<bool> {
        (**self).claim(candidate, owner, lease)
    }
}
