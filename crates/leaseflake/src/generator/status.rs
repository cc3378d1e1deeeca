use crate::LeaseflakeId;

/// Represents the result of a single, non-blocking generation attempt.
///
/// This type models the outcome of [`SequenceWorker::try_poll_id`]:
///
/// - [`IdGenStatus::Ready`] indicates a new ID was successfully generated.
/// - [`IdGenStatus::Pending`] means the worker cannot issue an ID until the
///   clock advances by at least `yield_for` milliseconds, either because the
///   sequence wrapped within the current millisecond or because the clock is
///   slightly behind the last issued timestamp.
///
/// [`SequenceWorker::next_id`] spins on `Pending` for you; use the polling
/// form when you would rather yield or sleep yourself.
///
/// [`SequenceWorker::try_poll_id`]: crate::SequenceWorker::try_poll_id
/// [`SequenceWorker::next_id`]: crate::SequenceWorker::next_id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: LeaseflakeId,
    },
    /// No ID could be generated for the current clock reading.
    Pending {
        /// Minimum number of milliseconds to wait before polling again.
        yield_for: u64,
    },
}
