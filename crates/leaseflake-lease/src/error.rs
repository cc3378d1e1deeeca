/// A convenience alias for results returned by lease operations.
pub type Result<T, E = LeaseError> = core::result::Result<T, E>;

/// Everything that can go wrong while renting a slot.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LeaseError {
    /// The lease table could not be read or written. Holds whatever error
    /// the backing database driver reported.
    #[error("lease store error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Table names are spliced into SQL, so only plain identifiers are
    /// accepted.
    #[error("invalid lease table name {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    #[error("invalid lease configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A row in the lease table names a slot the ID layout cannot carry.
    #[error("lease row holds slot {0}, outside 0..=127")]
    InvalidSlot(i64),

    /// Every slot is leased by someone else.
    #[error("no slot is free to lease")]
    NoFreeSlot,

    /// Another process updated the row between our read and our claim.
    #[error("slot {slot} was claimed by another owner first")]
    LostRace { slot: u8 },

    /// The database clock and the local clock disagree by more than the
    /// configured bound, so the locally computed expiry cannot be trusted.
    #[error("database and local clocks differ by {skew_ms}ms (allowed {max_skew_ms}ms)")]
    ClockSkewExceeded { skew_ms: u64, max_skew_ms: u64 },

    /// A whole refresh cycle ended without a slot.
    #[error("no slot leased after {attempts} attempts: {last}")]
    AcquisitionFailed {
        attempts: usize,
        #[source]
        last: Box<LeaseError>,
    },

    /// The blocking store call panicked or was cancelled.
    #[error("lease store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("timed out after {waited_ms}ms waiting for a slot")]
    Timeout { waited_ms: u64 },
}

impl LeaseError {
    /// Wraps a driver error from any [`LeaseStore`](crate::LeaseStore)
    /// backend.
    pub fn database(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Database(err.into())
    }

    /// Whether the next refresh cycle may plausibly succeed without any
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(_)
            | Self::NoFreeSlot
            | Self::LostRace { .. }
            | Self::ClockSkewExceeded { .. }
            | Self::Task(_)
            | Self::Timeout { .. } => true,
            Self::AcquisitionFailed { last, .. } => last.is_transient(),
            Self::InvalidTableName(_) | Self::InvalidConfig { .. } | Self::InvalidSlot(_) => {
                false
            }
        }
    }
}

impl From<rusqlite::Error> for LeaseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn foreign_driver_errors_are_kept_as_the_source() {
        let err = LeaseError::database(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "replica unreachable",
        ));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "lease store error: replica unreachable");
        let source = err.source().unwrap();
        let io_err = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn sqlite_errors_convert_with_question_mark() {
        fn fails() -> Result<()> {
            Err(rusqlite::Error::InvalidQuery)?
        }
        let err = fails().unwrap_err();
        let LeaseError::Database(inner) = &err else {
            panic!("expected a database error, got {err:?}");
        };
        assert!(inner.downcast_ref::<rusqlite::Error>().is_some());
    }
}
