//! Benchmark suite for numapool
//!
//! Measures dispatch, barrier, reduce and sleep/wake latency on the pool
//! configured from `NPL_*` environment variables.

use numapool::{HostPool, PoolConfig, PoolResult};
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    println!("=== numapool Benchmarks ===\n");

    let pool = match HostPool::start(PoolConfig::from_env()) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("initialize failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _ = pool.print_configuration(&mut std::io::stdout(), false);
    println!();

    let result = bench_execute(&pool)
        .and_then(|_| bench_barrier(&pool))
        .and_then(|_| bench_reduce(&pool))
        .and_then(|_| bench_serial(&pool))
        .and_then(|_| bench_sleep_wake(&pool));
    if let Err(e) = result {
        eprintln!("benchmark failed: {}", e);
        return ExitCode::FAILURE;
    }

    println!("=== Benchmarks Complete ===");
    ExitCode::SUCCESS
}

fn report(what: &str, iterations: usize, elapsed: std::time::Duration) {
    let per_op = elapsed.as_nanos() as f64 / iterations as f64;
    println!("  Iterations:  {}", iterations);
    println!("  Total time:  {:?}", elapsed);
    println!("  Per {}: {:.1} ns", what, per_op);
    println!("  Rate:        {:.0}/sec\n", iterations as f64 / elapsed.as_secs_f64());
}

fn bench_execute(pool: &HostPool) -> PoolResult<()> {
    println!("Benchmark: Empty dispatch");
    println!("{}", "─".repeat(40));

    let iterations = 100_000;
    let start = Instant::now();
    for _ in 0..iterations {
        pool.execute(|_| {})?;
    }
    report("dispatch", iterations, start.elapsed());
    Ok(())
}

fn bench_barrier(pool: &HostPool) -> PoolResult<()> {
    println!("Benchmark: Barrier (inside one dispatch)");
    println!("{}", "─".repeat(40));

    let iterations = 100_000;
    let start = Instant::now();
    pool.execute(|ctx| {
        for _ in 0..iterations {
            ctx.barrier();
        }
    })?;
    report("barrier", iterations, start.elapsed());
    Ok(())
}

fn bench_reduce(pool: &HostPool) -> PoolResult<()> {
    println!("Benchmark: Reduce u64 (inside one dispatch)");
    println!("{}", "─".repeat(40));

    let iterations = 100_000;
    let start = Instant::now();
    pool.execute(|ctx| {
        let mut total = 0u64;
        for i in 0..iterations as u64 {
            total = ctx.reduce(total + i + ctx.rank() as u64, |a, b| a.wrapping_add(b));
        }
        std::hint::black_box(total);
    })?;
    report("reduce", iterations, start.elapsed());
    Ok(())
}

fn bench_serial(pool: &HostPool) -> PoolResult<()> {
    println!("Benchmark: Serial dispatch");
    println!("{}", "─".repeat(40));

    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        pool.execute_serial(|_| {})?;
    }
    report("dispatch", iterations, start.elapsed());
    Ok(())
}

fn bench_sleep_wake(pool: &HostPool) -> PoolResult<()> {
    println!("Benchmark: Sleep + wake");
    println!("{}", "─".repeat(40));

    let iterations = 1_000;
    let start = Instant::now();
    for _ in 0..iterations {
        pool.sleep()?;
        pool.wake()?;
    }
    report("cycle", iterations, start.elapsed());
    Ok(())
}
