//! Dot product over a NUMA-bound pool
//!
//! Each rank first-touches its own partition of both vectors, then the
//! product is reduced up the fan-in tree and checked against a serial sum.
//!
//! # Environment Variables
//!
//! - `DOT_LEN` - vector length (default 10_000_000)
//! - `DOT_REPEAT` - timed repetitions (default 10)
//! - `NPL_*` - pool configuration, see `PoolConfig::from_env`

use numapool::{env_get, kinfo, parallel_for, parallel_reduce, HostPool, PoolConfig, ReducePolicy};
use std::cell::UnsafeCell;
use std::process::ExitCode;
use std::time::Instant;

/// Vector written by disjoint ranks in parallel
struct SharedVec(Box<[UnsafeCell<f64>]>);

// SAFETY: ranks write disjoint elements; reads happen after the dispatch
unsafe impl Sync for SharedVec {}

impl SharedVec {
    fn zeroed(n: usize) -> Self {
        Self((0..n).map(|_| UnsafeCell::new(0.0)).collect())
    }

    /// # Safety
    /// No two ranks may write the same index concurrently.
    unsafe fn set(&self, i: usize, v: f64) {
        *self.0[i].get() = v;
    }

    fn get(&self) -> &[f64] {
        // SAFETY: UnsafeCell<f64> has the layout of f64, and this is only
        // called when no dispatch writes
        unsafe { &*(&*self.0 as *const [UnsafeCell<f64>] as *const [f64]) }
    }
}

fn main() -> ExitCode {
    println!("=== numapool dot product ===\n");

    let n: usize = env_get("DOT_LEN", 10_000_000);
    let repeat: usize = env_get("DOT_REPEAT", 10);

    let pool = match HostPool::start(PoolConfig::from_env()) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("initialize failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Threads:     {}", pool.thread_count());
    println!("Length:      {}", n);

    let x = SharedVec::zeroed(n);
    let y = SharedVec::zeroed(n);
    let fill = parallel_for(&pool, n, |range, _| {
        for i in range {
            // SAFETY: partitions are disjoint
            unsafe {
                x.set(i, (i % 7) as f64 * 0.5);
                y.set(i, (i % 5) as f64 + 1.0);
            }
        }
    });
    if let Err(e) = fill {
        eprintln!("fill failed: {}", e);
        return ExitCode::FAILURE;
    }
    let (x, y) = (x.get(), y.get());

    let policy: ReducePolicy<f64> = ReducePolicy::new(|| 0.0, |a, b| a + b);
    let mut result = 0.0;
    let start = Instant::now();
    for _ in 0..repeat {
        match parallel_reduce(&pool, n, &policy, |range, acc, _| {
            *acc += x[range.clone()].iter().zip(&y[range]).map(|(a, b)| a * b).sum::<f64>();
        }) {
            Ok(v) => result = v,
            Err(e) => {
                eprintln!("reduce failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    let elapsed = start.elapsed();

    let serial_start = Instant::now();
    let expected: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let serial = serial_start.elapsed();

    let per_iter = elapsed / repeat.max(1) as u32;
    println!("Result:      {}", result);
    println!("Expected:    {}", expected);
    println!("Parallel:    {:?} per dot", per_iter);
    println!("Serial:      {:?} per dot", serial);
    println!(
        "Bandwidth:   {:.2} GB/s",
        (2 * n * std::mem::size_of::<f64>()) as f64 / per_iter.as_secs_f64() / 1e9
    );
    kinfo!("dot finished after {} repetitions", repeat);

    // partial sums are combined in a different order than the serial loop
    if (result - expected).abs() > expected.abs() * 1e-9 {
        eprintln!("MISMATCH");
        return ExitCode::FAILURE;
    }
    println!("\n=== Done ===");
    ExitCode::SUCCESS
}
