use crate::{
    Error, IdGenStatus, LeaseflakeId, RandSource, SequenceWorker, SystemClock, ThreadRandom,
    TimeSource,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::scope;

/// Clock the test moves by hand.
struct ManualTime {
    millis: AtomicU64,
}

impl ManualTime {
    fn at(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(millis),
        })
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource<u64> for ManualTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Clock that replays `values`, one per read, then sticks to the last one.
struct StepTime {
    values: Vec<u64>,
    index: AtomicUsize,
}

impl TimeSource<u64> for StepTime {
    fn current_millis(&self) -> u64 {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.values[i.min(self.values.len() - 1)]
    }
}

/// Clock that advances one millisecond every `reads_per_tick` reads.
struct TickingTime {
    start: u64,
    reads_per_tick: u64,
    reads: AtomicU64,
}

impl TimeSource<u64> for TickingTime {
    fn current_millis(&self) -> u64 {
        self.start + self.reads.fetch_add(1, Ordering::SeqCst) / self.reads_per_tick
    }
}

/// Clock that jumps `step` milliseconds forward on every read, so any two
/// reads taken out of order differ by more than the regression tolerance.
struct LeapingTime {
    next: AtomicU64,
    step: u64,
}

impl TimeSource<u64> for LeapingTime {
    fn current_millis(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
struct FixedRand(u16);

impl RandSource<u16> for FixedRand {
    fn rand(&self) -> u16 {
        self.0
    }
}

trait IdGenStatusExt {
    fn unwrap_ready(self) -> LeaseflakeId;
    fn unwrap_pending(self) -> u64;
}

impl IdGenStatusExt for IdGenStatus {
    fn unwrap_ready(self) -> LeaseflakeId {
        match self {
            Self::Ready { id } => id,
            Self::Pending { yield_for } => {
                panic!("unexpected pending (yield for: {yield_for})")
            }
        }
    }

    fn unwrap_pending(self) -> u64 {
        match self {
            Self::Ready { id } => panic!("unexpected ready ({id})"),
            Self::Pending { yield_for } => yield_for,
        }
    }
}

#[test]
fn sequence_increments_within_same_tick() {
    let worker = SequenceWorker::new(7, ManualTime::at(42), FixedRand(100)).unwrap();

    let id1 = worker.next_id().unwrap();
    let id2 = worker.next_id().unwrap();
    let id3 = worker.next_id().unwrap();

    assert_eq!(id1.decode(), (42, 7, 100));
    assert_eq!(id2.decode(), (42, 7, 101));
    assert_eq!(id3.decode(), (42, 7, 102));
}

#[test]
fn new_millisecond_reseeds_sequence() {
    let time = ManualTime::at(42);
    let worker = SequenceWorker::new(1, Arc::clone(&time), FixedRand(900)).unwrap();

    worker.next_id().unwrap();
    worker.next_id().unwrap();
    time.set(43);
    let id = worker.next_id().unwrap();

    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 900);
}

#[test]
fn seed_is_masked_to_sequence_width() {
    let worker = SequenceWorker::new(0, ManualTime::at(5), FixedRand(u16::MAX)).unwrap();

    let first = worker.next_id().unwrap();
    let second = worker.next_id().unwrap();

    assert_eq!(first.sequence(), LeaseflakeId::MAX_SEQUENCE);
    // counts modulo 4096 within the millisecond
    assert_eq!(second.sequence(), 0);
    assert_eq!(second.timestamp(), 5);
}

#[test]
fn pending_once_sequence_wraps_to_anchor() {
    let time = ManualTime::at(42);
    let worker = SequenceWorker::new(3, Arc::clone(&time), FixedRand(1234)).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..=LeaseflakeId::MAX_SEQUENCE {
        let id = worker.try_poll_id().unwrap().unwrap_ready();
        assert_eq!(id.timestamp(), 42);
        assert!(seen.insert(id.sequence()));
    }
    assert_eq!(seen.len(), 4096);

    assert_eq!(worker.try_poll_id().unwrap().unwrap_pending(), 1);
    assert_eq!(worker.try_poll_id().unwrap().unwrap_pending(), 1);

    time.set(43);
    let id = worker.try_poll_id().unwrap().unwrap_ready();
    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 1234);
}

#[test]
fn next_id_spins_into_next_millisecond_after_wrap() {
    let time = TickingTime {
        start: 1_000,
        reads_per_tick: 5_000,
        reads: AtomicU64::new(0),
    };
    let worker = SequenceWorker::new(9, time, ThreadRandom).unwrap();

    let mut seen = HashSet::new();
    let ids: Vec<_> = (0..4097).map(|_| worker.next_id().unwrap()).collect();
    for id in &ids {
        assert!(seen.insert((id.timestamp(), id.sequence())));
    }

    assert!(ids[..4096].iter().all(|id| id.timestamp() == 1_000));
    assert_eq!(ids[4096].timestamp(), 1_001);
}

#[test]
fn small_regression_is_waited_out() {
    let time = StepTime {
        values: vec![100, 95, 96, 97, 98, 99, 100, 101],
        index: AtomicUsize::new(0),
    };
    let worker = SequenceWorker::new(2, time, FixedRand(10)).unwrap();

    let first = worker.next_id().unwrap();
    let second = worker.next_id().unwrap();

    assert_eq!(first.decode(), (100, 2, 10));
    assert_eq!(second.decode(), (100, 2, 11));
}

#[test]
fn small_regression_reports_remaining_wait() {
    let time = ManualTime::at(100);
    let worker = SequenceWorker::new(2, Arc::clone(&time), FixedRand(0)).unwrap();
    worker.next_id().unwrap();

    time.set(95);
    assert_eq!(worker.try_poll_id().unwrap().unwrap_pending(), 5);
    time.set(91);
    assert_eq!(worker.try_poll_id().unwrap().unwrap_pending(), 9);
}

#[test]
fn large_regression_fails() {
    let time = ManualTime::at(100);
    let worker = SequenceWorker::new(2, Arc::clone(&time), FixedRand(0)).unwrap();
    worker.next_id().unwrap();

    time.set(85);
    assert_eq!(
        worker.next_id(),
        Err(Error::ClockRegression {
            behind_ms: 15,
            tolerance_ms: 10,
        })
    );

    // exactly at the tolerance is already too far
    time.set(90);
    assert!(matches!(
        worker.next_id(),
        Err(Error::ClockRegression { behind_ms: 10, .. })
    ));

    // nothing was consumed by the failed calls
    time.set(100);
    assert_eq!(worker.next_id().unwrap().decode(), (100, 2, 1));
}

#[test]
fn regression_tolerance_is_configurable() {
    let time = ManualTime::at(100);
    let worker = SequenceWorker::new(2, Arc::clone(&time), FixedRand(0))
        .unwrap()
        .with_regression_tolerance(20);
    assert_eq!(worker.regression_tolerance(), 20);
    worker.next_id().unwrap();

    time.set(85);
    assert_eq!(worker.try_poll_id().unwrap().unwrap_pending(), 15);
}

#[test]
fn timestamp_beyond_layout_fails() {
    let worker = SequenceWorker::new(
        0,
        ManualTime::at(LeaseflakeId::MAX_TIMESTAMP + 1),
        FixedRand(0),
    )
    .unwrap();
    assert!(matches!(
        worker.next_id(),
        Err(Error::EncodingOverflow { .. })
    ));
}

#[test]
fn slot_out_of_range_is_rejected() {
    assert!(SequenceWorker::new(128, SystemClock, ThreadRandom).is_err());
    assert!(SequenceWorker::new(127, SystemClock, ThreadRandom).is_ok());
}

#[test]
fn system_clock_sequential_ids_are_unique_and_time_ordered() {
    const TOTAL_IDS: usize = 4096 * 64;
    let worker = SequenceWorker::new(1, SystemClock, ThreadRandom).unwrap();

    let mut seen = HashSet::with_capacity(TOTAL_IDS);
    let mut last_timestamp = 0;
    for _ in 0..TOTAL_IDS {
        let id = worker.next_id().unwrap();
        assert!(id.timestamp() >= last_timestamp);
        assert_eq!(id.slot(), 1);
        assert!(seen.insert(id));
        last_timestamp = id.timestamp();
    }
    assert_eq!(seen.len(), TOTAL_IDS);
}

#[test]
fn shared_worker_threaded_ids_are_unique() {
    const THREADS: usize = 100;
    const IDS_PER_THREAD: usize = 10_000;

    let worker = SequenceWorker::new(0, SystemClock, ThreadRandom).unwrap();

    let batches: Vec<Vec<LeaseflakeId>> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..IDS_PER_THREAD)
                        .map(|_| worker.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for batch in &batches {
        // each thread observes its own calls in order
        assert!(batch.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    let unique: HashSet<_> = batches.into_iter().flatten().collect();
    assert_eq!(unique.len(), THREADS * IDS_PER_THREAD);
}

#[test]
fn contended_callers_never_see_a_false_regression() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 20_000;

    let time = LeapingTime {
        next: AtomicU64::new(1_000),
        step: 20,
    };
    let worker = SequenceWorker::new(4, time, ThreadRandom).unwrap();

    let ids: Vec<LeaseflakeId> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..IDS_PER_THREAD)
                        .map(|_| worker.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    // every read lands after the previous one, so every call opens a new tick
    let timestamps: HashSet<_> = ids.iter().map(|id| id.timestamp()).collect();
    assert_eq!(timestamps.len(), THREADS * IDS_PER_THREAD);
}
