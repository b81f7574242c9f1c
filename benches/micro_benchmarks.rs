//! # Micro Benchmarks
//!
//! Fine-grained benchmarks for the building blocks under the primitives.
//!
//! Run with: `cargo bench --bench micro_benchmarks`

use corral::{
    AtomicCounter, Clock, ConcurrentMap, ManualClock, MemoryOrdering, SystemClock, TokenBucket,
    TokenBucketBuilder, TokenBucketConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Clock reads on the admission path
fn bench_clocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("clocks");

    group.bench_function("system_clock", |b| {
        let clock = SystemClock;
        b.iter(|| black_box(clock.now()));
    });

    group.bench_function("manual_clock", |b| {
        let clock = ManualClock::new();
        b.iter(|| black_box(clock.now()));
    });

    group.bench_function("std_instant_now", |b| {
        b.iter(|| black_box(Instant::now()));
    });

    group.finish();
}

/// Counter operations, alone and contended
fn bench_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_counter");

    group.bench_function("increment", |b| {
        let counter = AtomicCounter::new(0);
        b.iter(|| black_box(counter.increment(1)));
    });

    group.bench_function("fetch_max", |b| {
        let counter = AtomicCounter::new(0);
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            black_box(counter.fetch_max(i))
        });
    });

    for num_threads in [2usize, 8] {
        group.bench_with_input(
            BenchmarkId::new("contended_increment", num_threads),
            &num_threads,
            |b, &num_threads| {
                let counter = Arc::new(AtomicCounter::new(0));
                b.iter_custom(|iters| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let handles: Vec<_> = (0..num_threads)
                            .map(|_| {
                                let counter = counter.clone();
                                thread::spawn(move || {
                                    for _ in 0..100 {
                                        counter.increment(1);
                                    }
                                })
                            })
                            .collect();
                        for handle in handles {
                            handle.join().unwrap();
                        }
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Single-key read-modify-write on the sharded map
fn bench_concurrent_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_map");

    group.bench_function("update_existing_key", |b| {
        let map = ConcurrentMap::new();
        map.put(1u64, 0u64);
        b.iter(|| black_box(map.update(1, || 0, |n| *n += 1)));
    });

    group.bench_function("get_clone", |b| {
        let map = ConcurrentMap::new();
        map.put(1u64, String::from("value"));
        b.iter(|| black_box(map.get(&1)));
    });

    group.finish();
}

/// Balance reads at different fill levels
fn bench_available_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("available_tokens");

    for (name, drained) in [("full", 0u64), ("half", 50), ("empty", 100)] {
        group.bench_function(name, |b| {
            let limiter = TokenBucket::new(100, 10.0).unwrap();
            if drained > 0 {
                limiter.allow_n(drained).unwrap();
            }
            b.iter(|| black_box(limiter.available_tokens()));
        });
    }

    group.finish();
}

/// Refill accounting when the clock moves between calls
fn bench_refill(c: &mut Criterion) {
    let mut group = c.benchmark_group("refill");

    for step_us in [1u64, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}us_steps", step_us)),
            &step_us,
            |b, &step_us| {
                let clock = ManualClock::shared();
                let limiter =
                    TokenBucket::with_config(TokenBucketConfig::new(1000, 100.0), clock.clone())
                        .unwrap();
                b.iter(|| {
                    clock.advance(Duration::from_micros(step_us));
                    black_box(limiter.allow())
                });
            },
        );
    }

    group.finish();
}

/// Snapshot cost
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    group.bench_function("snapshot", |b| {
        let limiter = TokenBucket::new(1000, 100.0).unwrap();
        while limiter.allow() {}
        b.iter(|| black_box(limiter.metrics()));
    });

    group.bench_function("summary", |b| {
        let limiter = TokenBucket::new(1000, 100.0).unwrap();
        let metrics = limiter.metrics();
        b.iter(|| black_box(metrics.summary()));
    });

    group.bench_function("is_inactive", |b| {
        let limiter = TokenBucket::new(1000, 100.0).unwrap();
        b.iter(|| black_box(limiter.is_inactive(Duration::from_secs(1))));
    });

    group.finish();
}

/// Configuration validation and building
fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");

    group.bench_function("validate_valid", |b| {
        let config = TokenBucketConfig::per_second(100);
        b.iter(|| black_box(config.validate()));
    });

    group.bench_function("validate_invalid", |b| {
        let config = TokenBucketConfig::new(0, 10.0);
        b.iter(|| black_box(config.validate()));
    });

    group.bench_function("builder", |b| {
        b.iter(|| {
            black_box(
                TokenBucketBuilder::new()
                    .capacity(100)
                    .refill_rate(10.0)
                    .memory_ordering(MemoryOrdering::AcquireRelease)
                    .build(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    micro_benches,
    bench_clocks,
    bench_counter,
    bench_concurrent_map,
    bench_available_tokens,
    bench_refill,
    bench_metrics,
    bench_construction,
);

criterion_main!(micro_benches);
