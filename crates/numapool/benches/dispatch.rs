//! Dispatch and collective latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use numapool::{parallel_reduce, HostPool, LogicalTopology, PoolConfig, ReducePolicy};

fn pool_with(threads: usize) -> Option<HostPool> {
    let mut pool = HostPool::new(PoolConfig::from_env());
    pool.initialize(LogicalTopology::new(1, threads), None).ok()?;
    Some(pool)
}

fn thread_counts() -> Vec<usize> {
    let max = numapool::detect().shape().capacity();
    [1, 2, 4, 8, 16]
        .into_iter()
        .filter(|&n| n <= max)
        .collect()
}

fn benchmark_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    for threads in thread_counts() {
        let Some(pool) = pool_with(threads) else { continue };
        group.bench_with_input(BenchmarkId::new("empty", threads), &threads, |b, _| {
            b.iter(|| pool.execute(|ctx| { black_box(ctx.rank()); }))
        });
        group.bench_with_input(BenchmarkId::new("barrier", threads), &threads, |b, _| {
            b.iter(|| pool.execute(|ctx| ctx.barrier()))
        });
        group.bench_with_input(BenchmarkId::new("reduce", threads), &threads, |b, _| {
            b.iter(|| pool.execute(|ctx| { black_box(ctx.reduce(ctx.rank(), |a, b| a + b)); }))
        });
    }

    group.finish();
}

fn benchmark_parallel_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_reduce");
    let data: Vec<f64> = (0..1_000_000).map(|i| (i as f64).sin()).collect();
    let policy: ReducePolicy<f64> = ReducePolicy::new(|| 0.0, |a, b| a + b);

    for threads in thread_counts() {
        let Some(pool) = pool_with(threads) else { continue };
        group.bench_with_input(BenchmarkId::new("sum_1m", threads), &threads, |b, _| {
            b.iter(|| {
                parallel_reduce(&pool, data.len(), &policy, |range, acc, _| {
                    *acc += data[range].iter().sum::<f64>();
                })
            })
        });
    }

    group.bench_function("serial_sum_1m", |b| {
        b.iter(|| black_box(&data).iter().sum::<f64>())
    });

    group.finish();
}

criterion_group!(benches, benchmark_execute, benchmark_parallel_reduce);
criterion_main!(benches);
