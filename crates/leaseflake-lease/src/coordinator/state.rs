use core::time::Duration;

use portable_atomic::{AtomicU64, Ordering};

/// What a coordinator believes about its slot right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseStatus {
    /// No slot held; the last cycle failed or none has run yet.
    Unassigned,
    /// A slot is held and usable for at least `remaining`.
    Leased { slot: u8, remaining: Duration },
    /// Still usable, but the local deadline is within the expiry guard.
    Expiring { slot: u8, remaining: Duration },
    /// The local deadline passed without a renewal. Another process may
    /// already own the row.
    Lapsed { slot: u8 },
}

impl LeaseStatus {
    pub const fn slot(&self) -> Option<u8> {
        match self {
            Self::Unassigned => None,
            Self::Leased { slot, .. } | Self::Expiring { slot, .. } | Self::Lapsed { slot } => {
                Some(*slot)
            }
        }
    }

    /// Whether IDs may be issued for the slot.
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Leased { .. } | Self::Expiring { .. })
    }
}

const SLOT_BITS: u32 = 8;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const EMPTY: u64 = 0;

/// Slot and local deadline packed into one word, so readers see both from
/// the same refresh without taking a lock.
///
/// ```text
///  | expires_at millis (56 bits) | slot (8 bits) |
/// ```
///
/// Zero means no slot is held; a real deadline is never zero.
#[derive(Debug)]
pub(crate) struct LocalLease {
    packed: AtomicU64,
}

impl LocalLease {
    pub(crate) const fn new() -> Self {
        Self {
            packed: AtomicU64::new(EMPTY),
        }
    }

    pub(crate) fn set(&self, slot: u8, expires_at: u64) {
        debug_assert!(expires_at > 0 && expires_at < 1 << (64 - SLOT_BITS));
        self.packed
            .store((expires_at << SLOT_BITS) | u64::from(slot), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.packed.store(EMPTY, Ordering::Release);
    }

    /// `(slot, expires_at)` if anything is held.
    pub(crate) fn get(&self) -> Option<(u8, u64)> {
        match self.packed.load(Ordering::Acquire) {
            EMPTY => None,
            packed => Some(((packed & SLOT_MASK) as u8, packed >> SLOT_BITS)),
        }
    }

    /// The held slot, if its deadline has not passed at `now`.
    pub(crate) fn usable_slot(&self, now: u64) -> Option<u8> {
        self.get()
            .and_then(|(slot, expires_at)| (now <= expires_at).then_some(slot))
    }

    pub(crate) fn status(&self, now: u64, guard: Duration) -> LeaseStatus {
        let Some((slot, expires_at)) = self.get() else {
            return LeaseStatus::Unassigned;
        };
        if now > expires_at {
            return LeaseStatus::Lapsed { slot };
        }
        let remaining = Duration::from_millis(expires_at - now);
        if remaining <= guard {
            LeaseStatus::Expiring { slot, remaining }
        } else {
            LeaseStatus::Leased { slot, remaining }
        }
    }
}
