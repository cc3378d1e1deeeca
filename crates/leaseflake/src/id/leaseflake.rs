use core::fmt;

use crate::{Error, Field, Result};

/// A 63-bit identifier packing a millisecond timestamp, a leased slot and a
/// per-millisecond sequence.
///
/// - 1 bit reserved (always zero, so the value fits a non-negative `i64`)
/// - 44 bits timestamp (ms since the Unix epoch, good until roughly 2527)
/// - 7 bits slot (the leased instance number)
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            19 18         12 11             0
///              +--------------+----------------+-------------+---------------+
///  Field:      | reserved (1) | timestamp (44) |  slot (7)   | sequence (12) |
///              +--------------+----------------+-------------+---------------+
///              |<----------- MSB ---------- 64 bits ----------- LSB -------->|
/// ```
///
/// # Example
///
/// ```
/// use leaseflake::LeaseflakeId;
///
/// let id = LeaseflakeId::encode(1_700_000_000_000, 5, 42).unwrap();
/// assert_eq!(id.decode(), (1_700_000_000_000, 5, 42));
/// assert!(id.to_i64() > 0);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseflakeId {
    id: u64,
}

impl LeaseflakeId {
    /// Bitmask for the 44-bit timestamp field. Occupies bits 19 through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 44) - 1;

    /// Bitmask for the 7-bit slot field. Occupies bits 12 through 18.
    pub const SLOT_MASK: u64 = (1 << 7) - 1;

    /// Bitmask for the 12-bit sequence field. Occupies bits 0 through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its position (bit 19).
    pub const TIMESTAMP_SHIFT: u64 = 19;

    /// Number of bits to shift the slot to its position (bit 12).
    pub const SLOT_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Largest timestamp the layout can carry.
    pub const MAX_TIMESTAMP: u64 = Self::TIMESTAMP_MASK;

    /// Largest slot number. Slots are `0..=MAX_SLOT`.
    pub const MAX_SLOT: u8 = Self::SLOT_MASK as u8;

    /// Largest sequence value. Sequences wrap modulo `MAX_SEQUENCE + 1`.
    pub const MAX_SEQUENCE: u16 = Self::SEQUENCE_MASK as u16;

    const RESERVED_BIT: u64 = 1 << 63;

    /// Packs the three components, rejecting any that overflow its field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] naming the first offending field.
    pub const fn encode(timestamp: u64, slot: u8, sequence: u16) -> Result<Self> {
        if timestamp > Self::MAX_TIMESTAMP {
            return Err(Error::EncodingOverflow {
                field: Field::Timestamp,
                value: timestamp,
                max: Self::MAX_TIMESTAMP,
            });
        }
        if slot > Self::MAX_SLOT {
            return Err(Error::EncodingOverflow {
                field: Field::Slot,
                value: slot as u64,
                max: Self::MAX_SLOT as u64,
            });
        }
        if sequence > Self::MAX_SEQUENCE {
            return Err(Error::EncodingOverflow {
                field: Field::Sequence,
                value: sequence as u64,
                max: Self::MAX_SEQUENCE as u64,
            });
        }
        Ok(Self::from_components(timestamp, slot, sequence))
    }

    /// Packs the components without range checks.
    ///
    /// Out-of-range bits are masked off; callers are expected to have
    /// validated the inputs already.
    pub const fn from_components(timestamp: u64, slot: u8, sequence: u16) -> Self {
        debug_assert!(timestamp <= Self::TIMESTAMP_MASK, "timestamp overflow");
        debug_assert!((slot as u64) <= Self::SLOT_MASK, "slot overflow");
        debug_assert!((sequence as u64) <= Self::SEQUENCE_MASK, "sequence overflow");
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let slot = (slot as u64 & Self::SLOT_MASK) << Self::SLOT_SHIFT;
        let sequence = (sequence as u64 & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | slot | sequence,
        }
    }

    /// Splits the value back into `(timestamp, slot, sequence)`.
    pub const fn decode(&self) -> (u64, u8, u16) {
        (self.timestamp(), self.slot(), self.sequence())
    }

    /// Extracts the timestamp from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the slot from the packed ID.
    pub const fn slot(&self) -> u8 {
        ((self.id >> Self::SLOT_SHIFT) & Self::SLOT_MASK) as u8
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u16 {
        ((self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK) as u16
    }

    /// Returns the packed value.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Returns the packed value as the signed integer databases usually store.
    pub const fn to_i64(&self) -> i64 {
        // reserved bit is never set
        self.id as i64
    }

    /// Rebuilds an ID from its packed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] if the reserved top bit is set.
    pub const fn from_raw(raw: u64) -> Result<Self> {
        if raw & Self::RESERVED_BIT != 0 {
            return Err(Error::EncodingOverflow {
                field: Field::Timestamp,
                value: raw >> Self::TIMESTAMP_SHIFT,
                max: Self::MAX_TIMESTAMP,
            });
        }
        Ok(Self { id: raw })
    }

    /// Rebuilds an ID from a signed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingOverflow`] for negative input.
    pub const fn from_i64(raw: i64) -> Result<Self> {
        Self::from_raw(raw as u64)
    }

    /// Returns the ID as a zero-padded 19-digit string, which sorts the same
    /// way the numbers do.
    pub fn to_padded_string(&self) -> String {
        format!("{:019}", self.id)
    }
}

impl TryFrom<u64> for LeaseflakeId {
    type Error = Error;

    fn try_from(raw: u64) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl TryFrom<i64> for LeaseflakeId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_i64(raw)
    }
}

impl From<LeaseflakeId> for u64 {
    fn from(id: LeaseflakeId) -> Self {
        id.to_raw()
    }
}

impl From<LeaseflakeId> for i64 {
    fn from(id: LeaseflakeId) -> Self {
        id.to_i64()
    }
}

impl fmt::Display for LeaseflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for LeaseflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseflakeId")
            .field("raw", &format_args!("0x{:016x}", self.id))
            .field("timestamp", &self.timestamp())
            .field("slot", &self.slot())
            .field("sequence", &self.sequence())
            .finish()
    }
}
