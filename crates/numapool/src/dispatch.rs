//! Parallel loop helpers over a [`HostPool`]

use numapool_core::PoolResult;
use numapool_runtime::{HostPool, ThreadContext};
use std::ops::Range;
use std::sync::OnceLock;

/// Run `body` once per rank on that rank's share of `0..n`
pub fn parallel_for<F>(pool: &HostPool, n: usize, body: F) -> PoolResult<()>
where
    F: Fn(Range<usize>, &ThreadContext<'_>) + Sync,
{
    pool.execute(|ctx| body(ctx.partition(n), ctx))
}

type InitFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type CombineFn<T> = Box<dyn Fn(T, T) -> T + Send + Sync>;
type FinalizeFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;

/// How per-rank partial results are created, merged and post-processed
pub struct ReducePolicy<T> {
    init: InitFn<T>,
    combine: CombineFn<T>,
    finalize: Option<FinalizeFn<T>>,
}

impl<T> ReducePolicy<T> {
    /// `init` must return the identity of `combine`
    pub fn new<I, C>(init: I, combine: C) -> Self
    where
        I: Fn() -> T + Send + Sync + 'static,
        C: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Self {
            init: Box::new(init),
            combine: Box::new(combine),
            finalize: None,
        }
    }

    /// Applied once, on the master, to the combined total
    pub fn with_finalize<G>(mut self, finalize: G) -> Self
    where
        G: Fn(T) -> T + Send + Sync + 'static,
    {
        self.finalize = Some(Box::new(finalize));
        self
    }

    pub fn identity(&self) -> T {
        (self.init)()
    }

    pub fn combine(&self, a: T, b: T) -> T {
        (self.combine)(a, b)
    }

    pub fn finish(&self, total: T) -> T {
        match &self.finalize {
            Some(f) => f(total),
            None => total,
        }
    }
}

/// Reduce over `0..n`: each rank folds its partition into a fresh identity
/// with `body`, partials are combined up the fan-in tree.
///
/// Partials travel through each rank's reduction slot, never its scratch
/// buffer, so any `T: Copy` works without resizing anything.
pub fn parallel_reduce<T, F>(
    pool: &HostPool,
    n: usize,
    policy: &ReducePolicy<T>,
    body: F,
) -> PoolResult<T>
where
    T: Copy + Send + Sync,
    F: Fn(Range<usize>, &mut T, &ThreadContext<'_>) + Sync,
{
    let result = OnceLock::new();
    pool.execute(|ctx| {
        let mut acc = policy.identity();
        body(ctx.partition(n), &mut acc, ctx);
        if let Some(total) = ctx.fan_in(acc, |a, b| policy.combine(a, b)) {
            let _ = result.set(total);
        }
    })?;

    let total = result.into_inner().unwrap_or_else(|| policy.identity());
    Ok(policy.finish(total))
}
