//! Per-rank view of a dispatch and the collectives built on the fan-in tree
//!
//! Every collective (`barrier`, `fan_in`, `reduce`, `broadcast`) must be
//! reached by all ranks of the dispatch, in the same order.
//!
//! Protocol for one collective at epoch `e`:
//! 1. wait until every child's `arrived >= e`, folding its value into ours
//!    with `combine(acc, child)` in ascending child order
//! 2. non-root: publish the folded value, store `arrived = e`, then wait for
//!    `release >= e`
//! 3. root: store `release = e`
//!
//! A rank writes its reduction slot only after its whole subtree arrived at
//! `e`, so nobody is still reading the value it published at `e - 1`.

use crate::worker::{Shared, ThreadMeta, ThreadSlot};
use crossbeam_utils::Backoff;
use numapool_core::{partition, HardwareCoordinate};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::Ordering;

/// Handle passed to a kernel on each rank
///
/// Pinned to the thread running the rank: it is neither `Send` nor `Sync`.
pub struct ThreadContext<'a> {
    pub(crate) shared: &'a Shared,
    slot: &'a ThreadSlot,
    meta: ThreadMeta,
    scratch_busy: Cell<bool>,
    _pinned: PhantomData<*const ()>,
}

impl<'a> ThreadContext<'a> {
    pub(crate) fn new(shared: &'a Shared, meta: ThreadMeta) -> Self {
        Self {
            shared,
            slot: &shared.slots[meta.rank],
            meta,
            scratch_busy: Cell::new(false),
            _pinned: PhantomData,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.meta.rank
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.shared.thread_count()
    }

    #[inline]
    pub fn is_master(&self) -> bool {
        self.meta.rank == 0
    }

    #[inline]
    pub fn gang_rank(&self) -> usize {
        self.meta.gang
    }

    #[inline]
    pub fn gang_count(&self) -> usize {
        self.shared.logical.gang_count
    }

    #[inline]
    pub fn worker_rank(&self) -> usize {
        self.meta.worker
    }

    #[inline]
    pub fn workers_per_gang(&self) -> usize {
        self.shared.logical.workers_per_gang
    }

    /// Hardware coordinate assigned to this rank
    #[inline]
    pub fn coordinate(&self) -> HardwareCoordinate {
        self.meta.coordinate
    }

    /// Whether this rank's thread is pinned to [`coordinate`](Self::coordinate)
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.meta.bound
    }

    pub fn meta(&self) -> ThreadMeta {
        self.meta
    }

    /// This rank's contiguous share of `0..n`
    #[inline]
    pub fn partition(&self, n: usize) -> Range<usize> {
        partition(n, self.thread_count(), self.rank())
    }

    /// Wait until every rank reached the barrier
    pub fn barrier(&self) {
        self.fan_in((), |_, _| ());
    }

    /// Combine one value per rank up the tree.
    ///
    /// Rank 0 gets `Some(total)`, every other rank `None`. Returns on every
    /// rank only after all ranks contributed.
    pub fn fan_in<T, F>(&self, value: T, combine: F) -> Option<T>
    where
        T: Copy + Send,
        F: Fn(T, T) -> T,
    {
        let (epoch, total) = self.arrive(value, &combine);
        self.depart(epoch);
        total
    }

    /// Combine one value per rank; every rank gets the total
    pub fn reduce<T, F>(&self, value: T, combine: F) -> T
    where
        T: Copy + Send,
        F: Fn(T, T) -> T,
    {
        let (epoch, total) = self.arrive(value, &combine);
        match total {
            Some(total) => {
                // SAFETY: every rank arrived, nobody reads rank 0's slot
                unsafe { self.slot.write_reduce(total) };
                self.depart(epoch);
                total
            }
            None => {
                self.depart(epoch);
                // SAFETY: release observed; rank 0 rewrites only after we arrive again
                unsafe { self.shared.slots[0].read_reduce() }
            }
        }
    }

    /// Rank 0's `value` on every rank
    pub fn broadcast<T>(&self, value: T) -> T
    where
        T: Copy + Send,
    {
        let (epoch, _) = self.arrive((), &|_, _| ());
        if self.is_master() {
            // SAFETY: as in `reduce`
            unsafe { self.slot.write_reduce(value) };
            self.depart(epoch);
            value
        } else {
            self.depart(epoch);
            // SAFETY: as in `reduce`
            unsafe { self.shared.slots[0].read_reduce() }
        }
    }

    /// Fan-in half of a collective. Returns the epoch and, on rank 0, the total.
    fn arrive<T, F>(&self, value: T, combine: &F) -> (u64, Option<T>)
    where
        T: Copy + Send,
        F: Fn(T, T) -> T,
    {
        let epoch = self.slot.epoch.load(Ordering::Relaxed) + 1;
        self.slot.epoch.store(epoch, Ordering::Relaxed);

        let mut acc = value;
        for &child in self.shared.tree.children(self.rank()) {
            let child = &self.shared.slots[child];
            let backoff = Backoff::new();
            while child.arrived.load(Ordering::Acquire) < epoch {
                backoff.snooze();
            }
            // SAFETY: the child published before storing `arrived`
            acc = combine(acc, unsafe { child.read_reduce() });
        }

        if self.is_master() {
            return (epoch, Some(acc));
        }
        // SAFETY: our subtree arrived, so our parent finished reading the
        // value we published last epoch
        unsafe { self.slot.write_reduce(acc) };
        self.slot.arrived.store(epoch, Ordering::Release);
        (epoch, None)
    }

    /// Fan-out half of a collective
    fn depart(&self, epoch: u64) {
        if self.is_master() {
            self.shared.release.store(epoch, Ordering::Release);
            return;
        }
        let backoff = Backoff::new();
        while self.shared.release.load(Ordering::Acquire) < epoch {
            backoff.snooze();
        }
    }

    /// Current scratch size in bytes
    pub fn scratch_len(&self) -> usize {
        self.with_scratch(|buf| buf.len())
    }

    /// Borrow this rank's scratch buffer.
    ///
    /// # Panics
    /// If called while the scratch buffer is already borrowed on this rank.
    pub fn with_scratch<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let _borrow = ScratchBorrow::new(&self.scratch_busy);
        // SAFETY: the context is pinned to the owning thread and the flag
        // rules out a second live borrow
        f(unsafe { self.slot.scratch_mut() }.as_mut_slice())
    }

    /// Resize this rank's scratch buffer to `bytes`.
    ///
    /// # Panics
    /// If called while the scratch buffer is borrowed.
    pub fn resize_scratch(&self, bytes: usize) {
        let _borrow = ScratchBorrow::new(&self.scratch_busy);
        // SAFETY: as in `with_scratch`
        unsafe { self.slot.scratch_mut() }.resize(bytes, 0);
    }

    /// Grow both of this rank's buffers to at least `bytes`.
    ///
    /// # Safety
    /// Only valid inside a serial dispatch, where no other rank runs.
    pub(crate) unsafe fn reserve_exclusive(&self, bytes: usize) {
        let _borrow = ScratchBorrow::new(&self.scratch_busy);
        self.slot.reserve(bytes);
    }
}

struct ScratchBorrow<'a>(&'a Cell<bool>);

impl<'a> ScratchBorrow<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        assert!(!flag.replace(true), "scratch buffer already borrowed");
        Self(flag)
    }
}

impl Drop for ScratchBorrow<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::topology::FallbackTopology;
    use numapool_core::LogicalTopology;
    use std::sync::Arc;
    use std::thread;

    /// Run `f` on `count` scoped threads, one per rank, without a pool
    fn on_ranks<F>(count: usize, f: F)
    where
        F: Fn(&ThreadContext<'_>) + Sync,
    {
        let config = PoolConfig::new().scratch_bytes(8);
        let shared = Shared::new(
            1,
            &config,
            LogicalTopology::new(1, count),
            vec![HardwareCoordinate::default(); count],
            Arc::new(FallbackTopology::new()),
            false,
        );
        thread::scope(|s| {
            for rank in 0..count {
                let shared = &shared;
                let f = &f;
                s.spawn(move || {
                    let ctx = ThreadContext::new(shared, shared.meta(rank, false));
                    f(&ctx);
                });
            }
        });
    }

    #[test]
    fn test_reduce_every_rank_sees_total() {
        for count in [1, 2, 3, 5, 8] {
            on_ranks(count, |ctx| {
                let expect = (0..count as u64).sum::<u64>();
                for round in 0..20u64 {
                    let total = ctx.reduce(ctx.rank() as u64 + round, |a, b| a + b);
                    assert_eq!(total, expect + round * count as u64);
                }
            });
        }
    }

    #[test]
    fn test_fan_in_only_master_gets_total() {
        on_ranks(6, |ctx| {
            let got = ctx.fan_in(1usize, |a, b| a + b);
            if ctx.is_master() {
                assert_eq!(got, Some(6));
            } else {
                assert_eq!(got, None);
            }
        });
    }

    #[test]
    fn test_broadcast_and_array_values() {
        on_ranks(4, |ctx| {
            let v = ctx.broadcast([ctx.rank() as u32 + 10; 3]);
            assert_eq!(v, [10, 10, 10]);

            let sums = ctx.reduce([ctx.rank() as f64, 1.0], |a, b| [a[0] + b[0], a[1] + b[1]]);
            assert_eq!(sums, [6.0, 4.0]);
        });
    }

    #[test]
    fn test_combine_order_is_fixed() {
        // non-commutative combine: concatenate rank digits
        on_ranks(4, |ctx| {
            let got = ctx.reduce(ctx.rank() as u64, |a, b| a * 10 + b);
            // tree: 0 <- 1, 0 <- 2 <- 3  =>  ((0*10+1)*10 + (2*10+3))
            assert_eq!(got, 33);
        });
    }

    #[test]
    fn test_barrier_separates_phases() {
        use std::sync::atomic::AtomicUsize;
        let counter = AtomicUsize::new(0);
        on_ranks(5, |ctx| {
            for phase in 1..=10 {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.barrier();
                assert!(counter.load(Ordering::SeqCst) >= phase * 5);
                ctx.barrier();
            }
        });
    }

    #[test]
    fn test_scratch_borrow() {
        on_ranks(1, |ctx| {
            assert_eq!(ctx.scratch_len(), 0);
            ctx.resize_scratch(32);
            ctx.with_scratch(|buf| {
                assert_eq!(buf.len(), 32);
                buf[0] = 7;
            });
            assert_eq!(ctx.with_scratch(|buf| buf[0]), 7);
        });
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn test_nested_scratch_borrow_panics() {
        let config = PoolConfig::new();
        let shared = Shared::new(
            1,
            &config,
            LogicalTopology::serial(),
            vec![HardwareCoordinate::default()],
            Arc::new(FallbackTopology::new()),
            false,
        );
        let ctx = ThreadContext::new(&shared, shared.meta(0, false));
        ctx.with_scratch(|_| ctx.with_scratch(|_| ()));
    }

    #[test]
    fn test_partition_covers_range() {
        on_ranks(3, |ctx| {
            let r = ctx.partition(10);
            let total = ctx.reduce(r.len(), |a, b| a + b);
            assert_eq!(total, 10);
            let expect = [0..4, 4..7, 7..10];
            assert_eq!(r, expect[ctx.rank()]);
        });
    }
}
