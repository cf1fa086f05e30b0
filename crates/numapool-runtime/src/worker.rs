//! Pool threads and the state they share
//!
//! Every rank owns one [`ThreadSlot`] in a contiguous array. The slot's state
//! word is written by the master to request work or termination and by the
//! owning thread to report completion; nobody else writes it.

use crate::config::PoolConfig;
use crate::dispatch::{self, Job};
use crate::gate::{new_gate, SleepGate};
use crate::sync::ThreadContext;
use crate::topology::Topology;
use crossbeam_utils::{Backoff, CachePadded};
use numapool_core::error::ConfigError;
use numapool_core::{kdebug, ktrace};
use numapool_core::{
    ClaimTable, FanInTree, HardwareCoordinate, LogicalTopology, SpawnError, ThreadAssignment,
    ThreadState,
};
use std::any::Any;
use std::cell::UnsafeCell;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Registry entry of one pool thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadMeta {
    pub rank: usize,
    pub gang: usize,
    pub worker: usize,
    pub coordinate: HardwareCoordinate,
    /// Whether the thread was pinned to `coordinate`
    pub bound: bool,
}

/// Per-rank slot
pub(crate) struct ThreadSlot {
    state: CachePadded<AtomicU8>,
    /// Last sync epoch for which this rank's whole subtree arrived
    pub(crate) arrived: CachePadded<AtomicU64>,
    /// Sync epoch counter, touched only by whichever thread runs this rank
    pub(crate) epoch: AtomicU64,
    /// Reduction value slot, read by the parent rank during fan-in
    reduce: UnsafeCell<Vec<u8>>,
    /// User scratch, owner only
    scratch: UnsafeCell<Vec<u8>>,
    registration: Mutex<Option<ThreadMeta>>,
}

// SAFETY: the two buffers are only reached through the unsafe accessors
// below, whose callers uphold the documented access windows. Everything else
// is atomics or behind a Mutex.
unsafe impl Sync for ThreadSlot {}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(ThreadState::Inactive.into())),
            arrived: CachePadded::new(AtomicU64::new(0)),
            epoch: AtomicU64::new(0),
            reduce: UnsafeCell::new(Vec::new()),
            scratch: UnsafeCell::new(Vec::new()),
            registration: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ThreadState {
        ThreadState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: ThreadState) {
        self.state.store(state.into(), Ordering::Release);
    }

    /// Spin, then yield, until the owner leaves Active
    pub(crate) fn wait_idle(&self) {
        let backoff = Backoff::new();
        while self.state() == ThreadState::Active {
            backoff.snooze();
        }
    }

    /// Grow both buffers to at least `bytes`. Never shrinks, so a rank that
    /// sized its own scratch larger keeps its contents.
    ///
    /// # Safety
    /// No other thread may access either buffer for the duration of the call.
    pub(crate) unsafe fn reserve(&self, bytes: usize) {
        for buf in [&mut *self.reduce.get(), &mut *self.scratch.get()] {
            if buf.len() < bytes {
                buf.resize(bytes, 0);
            }
        }
    }

    /// Store `value` in the reduction slot, growing it if needed.
    ///
    /// # Safety
    /// Caller runs this rank, and every reader of the previous value has
    /// finished (guaranteed once this rank's subtree arrived for the current
    /// epoch).
    pub(crate) unsafe fn write_reduce<T: Copy>(&self, value: T) {
        let buf = &mut *self.reduce.get();
        if buf.len() < mem::size_of::<T>() {
            buf.resize(mem::size_of::<T>(), 0);
        }
        ptr::write_unaligned(buf.as_mut_ptr().cast::<T>(), value);
    }

    /// # Safety
    /// The owner published a `T` with `write_reduce` and the caller observed
    /// that publication (arrival or release epoch, Acquire).
    pub(crate) unsafe fn read_reduce<T: Copy>(&self) -> T {
        let buf = &*self.reduce.get();
        debug_assert!(buf.len() >= mem::size_of::<T>());
        ptr::read_unaligned(buf.as_ptr().cast::<T>())
    }

    /// # Safety
    /// Caller runs this rank and holds no other reference into scratch.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn scratch_mut(&self) -> &mut Vec<u8> {
        &mut *self.scratch.get()
    }

    pub(crate) fn register(&self, meta: ThreadMeta) {
        *self.registration.lock().unwrap_or_else(PoisonError::into_inner) = Some(meta);
    }

    pub(crate) fn unregister(&self) -> Option<ThreadMeta> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn registration(&self) -> Option<ThreadMeta> {
        *self.registration.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

const PENDING: u8 = 0;
const READY: u8 = 1;
const NO_RANK: u8 = 2;
const BIND_FAILED: u8 = 3;

/// Readiness report of the thread currently being spawned
pub(crate) struct Handshake {
    status: AtomicU8,
    rank: AtomicUsize,
}

impl Handshake {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(PENDING),
            rank: AtomicUsize::new(0),
        }
    }

    /// Arm for the next spawn
    pub(crate) fn begin(&self) {
        self.status.store(PENDING, Ordering::Release);
    }

    fn report(&self, status: u8, rank: usize) {
        self.rank.store(rank, Ordering::Relaxed);
        self.status.store(status, Ordering::Release);
    }

    /// `None` while the spawned thread has not reported yet
    pub(crate) fn poll(&self) -> Option<Result<usize, SpawnError>> {
        let status = self.status.load(Ordering::Acquire);
        let rank = self.rank.load(Ordering::Relaxed);
        match status {
            PENDING => None,
            READY => Some(Ok(rank)),
            BIND_FAILED => Some(Err(SpawnError::BindFailed { rank })),
            _ => Some(Err(SpawnError::SpawnFailed)),
        }
    }
}

/// State shared by the master and every worker of one initialized pool
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) logical: LogicalTopology,
    pub(crate) assignment: ThreadAssignment,
    pub(crate) slots: Box<[ThreadSlot]>,
    pub(crate) tree: FanInTree,
    /// Published job: null when idle, `sleep_job` while asleep
    current: CachePadded<AtomicPtr<Job>>,
    /// Epoch released by rank 0 after the last fan-in
    pub(crate) release: CachePadded<AtomicU64>,
    pub(crate) gate: Box<dyn SleepGate>,
    sleep_poll: Duration,
    sleep_job: Job,
    panic: Mutex<Option<Box<dyn Any + Send>>>,
    claims: Mutex<ClaimTable>,
    pub(crate) topology: Arc<dyn Topology>,
    pub(crate) bind: bool,
    scratch_bytes: usize,
    pub(crate) handshake: Handshake,
}

impl Shared {
    pub(crate) fn new(
        id: u64,
        config: &PoolConfig,
        logical: LogicalTopology,
        assignment: ThreadAssignment,
        topology: Arc<dyn Topology>,
        bind: bool,
    ) -> Self {
        let count = assignment.len();
        Self {
            id,
            logical,
            slots: (0..count).map(|_| ThreadSlot::new()).collect(),
            tree: FanInTree::new(count),
            current: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            release: CachePadded::new(AtomicU64::new(0)),
            gate: new_gate(),
            sleep_poll: config.sleep_poll,
            sleep_job: Job::from_fn(sleep_on_gate),
            panic: Mutex::new(None),
            claims: Mutex::new(ClaimTable::new(assignment.clone())),
            assignment,
            topology,
            bind,
            scratch_bytes: config.scratch_bytes,
            handshake: Handshake::new(),
        }
    }

    #[inline]
    pub(crate) fn thread_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots of the spawned threads (every rank but the master)
    #[inline]
    pub(crate) fn workers(&self) -> &[ThreadSlot] {
        self.slots.get(1..).unwrap_or(&[])
    }

    pub(crate) fn meta(&self, rank: usize, bound: bool) -> ThreadMeta {
        ThreadMeta {
            rank,
            gang: self.logical.gang_of(rank),
            worker: self.logical.worker_of(rank),
            coordinate: self.assignment[rank],
            bound,
        }
    }

    /// Registered metadata of `rank`, or its planned metadata
    pub(crate) fn meta_of(&self, rank: usize) -> ThreadMeta {
        self.slots[rank]
            .registration()
            .unwrap_or_else(|| self.meta(rank, false))
    }

    fn sleep_sentinel(&self) -> *mut Job {
        &self.sleep_job as *const Job as *mut Job
    }

    /// Take the dispatch slot for `job`
    pub(crate) fn publish(&self, job: *const Job) -> Result<(), ConfigError> {
        self.current
            .compare_exchange(
                ptr::null_mut(),
                job as *mut Job,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|held| {
                if held == self.sleep_sentinel() {
                    ConfigError::HostBlocked
                } else {
                    ConfigError::FunctorExecuting
                }
            })
    }

    pub(crate) fn publish_sleep(&self) -> Result<(), ConfigError> {
        self.publish(self.sleep_sentinel())
    }

    /// Release the dispatch slot
    pub(crate) fn retire(&self) {
        self.current.store(ptr::null_mut(), Ordering::Release);
    }

    pub(crate) fn is_asleep(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.sleep_sentinel()
    }

    pub(crate) fn is_busy(&self) -> bool {
        !self.current.load(Ordering::Acquire).is_null()
    }

    /// Flip every worker Inactive -> Active
    pub(crate) fn activate_workers(&self) {
        for slot in self.workers() {
            debug_assert!(slot.state().is_idle());
            slot.set_state(ThreadState::Active);
        }
    }

    pub(crate) fn wait_workers_idle(&self) {
        for slot in self.workers() {
            slot.wait_idle();
        }
    }

    /// Run `job` for the rank behind `ctx`, recording a panic instead of
    /// unwinding through the pool.
    pub(crate) fn run_job(&self, job: &Job, ctx: &ThreadContext<'_>) {
        let _region = dispatch::enter_region(self.id);
        // SAFETY: `job` stays alive until every rank is back to Inactive
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { job.run(ctx) }));
        if let Err(payload) = outcome {
            let mut slot = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
    }

    /// Run `job` as rank 0 on the calling (master) thread
    pub(crate) fn run_master(&self, job: &Job) {
        let ctx = ThreadContext::new(self, self.meta_of(0));
        self.run_job(job, &ctx);
    }

    /// Re-raise the first panic recorded during the last dispatch
    pub(crate) fn resume_panic(&self) {
        let payload = self
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }

    fn wait_gate(&self) {
        while !self.gate.wait_open(self.sleep_poll) {}
    }

    /// Claim a rank for a thread found at `here`, with its coordinate
    fn claim(&self, here: Option<HardwareCoordinate>) -> Option<(usize, HardwareCoordinate)> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        let rank = claims.claim(here)?;
        ktrace!("claimed rank {}, {} left", rank, claims.remaining());
        Some((rank, claims.coordinate(rank)?))
    }

    /// Allocate rank 0's buffers on the master thread
    pub(crate) fn prepare_master(&self) {
        // SAFETY: workers never touch slot 0 outside a dispatch
        unsafe { self.slots[0].reserve(self.scratch_bytes) };
    }
}

/// Job published by `sleep()`: park on the gate until `wake()`
unsafe fn sleep_on_gate(_data: *const (), ctx: &ThreadContext<'_>) {
    ctx.shared.wait_gate();
}

/// Body of every spawned thread
pub(crate) fn worker_main(shared: Arc<Shared>) {
    let here = shared.topology.this_thread_coordinate().ok();
    let Some((rank, coordinate)) = shared.claim(here) else {
        shared.handshake.report(NO_RANK, 0);
        return;
    };

    let bound = shared.bind && shared.topology.bind_this_thread(coordinate);
    if shared.bind && !bound {
        shared.handshake.report(BIND_FAILED, rank);
        return;
    }

    let slot = &shared.slots[rank];
    // SAFETY: nobody else touches this slot before the handshake completes
    unsafe { slot.reserve(shared.scratch_bytes) };
    let meta = shared.meta(rank, bound);
    slot.register(meta);
    kdebug!("rank {} registered at {} (started near {:?})", rank, coordinate, here);
    shared.handshake.report(READY, rank);

    let ctx = ThreadContext::new(&shared, meta);
    run_loop(&shared, slot, &ctx);
    ktrace!("rank {} leaving", rank);
}

fn run_loop(shared: &Shared, slot: &ThreadSlot, ctx: &ThreadContext<'_>) {
    let backoff = Backoff::new();
    loop {
        match slot.state() {
            ThreadState::Inactive => backoff.snooze(),
            ThreadState::Terminating => break,
            ThreadState::Active => {
                backoff.reset();
                let job = shared.current.load(Ordering::Acquire);
                // SAFETY: non-null while this rank is Active
                if let Some(job) = unsafe { job.as_ref() } {
                    shared.run_job(job, ctx);
                }
                slot.set_state(ThreadState::Inactive);
            }
        }
    }
}
