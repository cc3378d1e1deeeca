use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use leaseflake::{IdService, LeaseflakeId, SequenceWorker, StaticSlot, SystemClock, ThreadRandom};
use std::{thread::scope, time::Instant};

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function("encode", |b| {
        b.iter(|| LeaseflakeId::encode(black_box(1_700_000_000_000), black_box(17), black_box(99)))
    });

    let id = LeaseflakeId::encode(1_700_000_000_000, 17, 99).unwrap();
    group.bench_function("decode", |b| b.iter(|| black_box(id).decode()));

    group.finish();
}

fn bench_worker(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        let worker = SequenceWorker::new(1, SystemClock, ThreadRandom).unwrap();
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for _ in 0..TOTAL_IDS {
                    black_box(worker.next_id().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn bench_service_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("service/threaded");

    for threads in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements((TOTAL_IDS * threads) as u64));
        group.bench_function(format!("threads/{threads}/elems/{TOTAL_IDS}"), |b| {
            let service = IdService::new(StaticSlot::new(1).unwrap());
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    scope(|s| {
                        for _ in 0..threads {
                            s.spawn(|| {
                                for _ in 0..TOTAL_IDS {
                                    black_box(service.next_id().unwrap());
                                }
                            });
                        }
                    });
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_worker, bench_service_threaded);
criterion_main!(benches);
