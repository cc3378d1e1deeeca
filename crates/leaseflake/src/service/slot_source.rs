use std::sync::Arc;

use crate::{Error, Field, LeaseflakeId, Result};

/// Answers "which slot may this process use right now?".
///
/// Implementations sit on the identifier hot path and must not block: a
/// leased source reads cached state, it never talks to its backing store
/// here.
pub trait SlotSource {
    /// Returns the slot to embed in the next ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotUnavailable`] when no slot is currently held.
    fn current_slot(&self) -> Result<u8>;
}

impl<S> SlotSource for Arc<S>
where
    S: SlotSource + ?Sized,
{
    fn current_slot(&self) -> Result<u8> {
        (**self).current_slot()
    }
}

impl<S> SlotSource for &S
where
    S: SlotSource + ?Sized,
{
    fn current_slot(&self) -> Result<u8> {
        (**self).current_slot()
    }
}

/// A fixed slot assigned out of band, e.g. from deployment configuration.
///
/// The operator is responsible for never running two processes with the same
/// static slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticSlot(u8);

impl StaticSlot {
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] if `slot` exceeds
    /// [`LeaseflakeId::MAX_SLOT`].
    pub const fn new(slot: u8) -> Result<Self> {
        if slot > LeaseflakeId::MAX_SLOT {
            return Err(Error::EncodingOverflow {
                field: Field::Slot,
                value: slot as u64,
                max: LeaseflakeId::MAX_SLOT as u64,
            });
        }
        Ok(Self(slot))
    }

    pub const fn slot(&self) -> u8 {
        self.0
    }
}

impl SlotSource for StaticSlot {
    fn current_slot(&self) -> Result<u8> {
        Ok(self.0)
    }
}
