//! Host thread pool lifecycle and dispatch
//!
//! ```rust,ignore
//! use numapool_runtime::{HostPool, PoolConfig};
//!
//! let mut pool = HostPool::new(PoolConfig::from_env());
//! pool.initialize(LogicalTopology::new(2, 4), None)?;
//! pool.execute(|ctx| {
//!     let range = ctx.partition(1_000);
//!     let local: u64 = range.map(|i| i as u64).sum();
//!     let total = ctx.reduce(local, |a, b| a + b);
//! })?;
//! pool.finalize()?;
//! ```

use crate::config::PoolConfig;
use crate::dispatch::{self, Job, PoolKernel};
use crate::sync::ThreadContext;
use crate::topology::{self, Topology};
use crate::worker::{self, Shared, ThreadMeta};
use crossbeam_utils::Backoff;
use numapool_core::constants::MAX_THREADS;
use numapool_core::{kdebug, kerror, kinfo, kwarn};
use numapool_core::{
    compute_mapping, ConfigError, HardwareCoordinate, HardwareShape, LogicalTopology, PoolResult,
    SpawnError, ThreadState, TopologyError,
};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Threads and shared state of an initialized pool
struct Running {
    shared: Arc<Shared>,
    /// (rank, handle) of every spawned thread
    workers: Vec<(usize, JoinHandle<()>)>,
    usable: HardwareShape,
    master_bound: bool,
}

/// Fixed-size pool of bound worker threads plus the calling (master) thread
pub struct HostPool {
    id: u64,
    config: PoolConfig,
    topology: Arc<dyn Topology>,
    scratch_bytes: AtomicUsize,
    running: Option<Running>,
}

impl HostPool {
    /// Uninitialized pool on the process topology
    pub fn new(config: PoolConfig) -> Self {
        Self::with_topology(config, topology::detect())
    }

    /// Uninitialized pool on an explicit topology source
    pub fn with_topology(config: PoolConfig, topology: Arc<dyn Topology>) -> Self {
        numapool_core::kprint::init();
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            scratch_bytes: AtomicUsize::new(config.scratch_bytes),
            config,
            topology,
            running: None,
        }
    }

    /// Validate `config`, then initialize with its logical grid and cap
    pub fn start(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let logical = config.logical();
        let cap = config.hardware_cap;
        let mut pool = Self::new(config);
        pool.initialize(logical, cap)?;
        Ok(pool)
    }

    /// Spawn, bind and register `logical.thread_count() - 1` workers.
    ///
    /// `requested` caps the hardware extent; a degenerate or oversized cap
    /// means the whole machine. On error no thread is left running.
    pub fn initialize(
        &mut self,
        logical: LogicalTopology,
        requested: Option<HardwareShape>,
    ) -> PoolResult<()> {
        if self.running.is_some() || dispatch::current_pool().is_some() {
            return Err(ConfigError::AlreadyActive.into());
        }
        let count = logical.thread_count();
        if count == 0 {
            return Err(ConfigError::InvalidTopology.into());
        }
        if count > MAX_THREADS {
            return Err(ConfigError::InvalidValue("too many threads requested").into());
        }

        let usable = self.topology.shape().clamp_request(requested);
        let can_bind = self.topology.can_bind();
        if can_bind && count > usable.capacity() {
            return Err(TopologyError::InsufficientCapacity {
                requested: count,
                available: usable.capacity(),
            }
            .into());
        }

        let here = self.topology.this_thread_coordinate().unwrap_or_else(|e| {
            kdebug!("master location unknown ({}), assuming (0,0)", e);
            HardwareCoordinate::default()
        });
        let master = HardwareCoordinate::new(
            here.numa % usable.numa_count.max(1),
            here.core % usable.cores_per_numa.max(1),
        );
        let assignment = if can_bind {
            compute_mapping(logical, usable, master)?
        } else {
            vec![master; count]
        };

        let bind = self.config.bind_threads && can_bind;
        let shared = Arc::new(Shared::new(
            self.id,
            &self.config,
            logical,
            assignment,
            Arc::clone(&self.topology),
            bind,
        ));

        let mut workers = Vec::with_capacity(count - 1);
        for n in 1..count {
            match spawn_worker(&shared, n, self.config.spawn_timeout) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    kerror!("worker {} of {}: {}", n, count - 1, e);
                    teardown(&shared, workers);
                    return Err(e.into());
                }
            }
        }

        let master_bound = bind && self.topology.bind_this_thread(shared.assignment[0]);
        if bind && !master_bound {
            kerror!("master failed to bind to {}", shared.assignment[0]);
            teardown(&shared, workers);
            return Err(SpawnError::BindFailed { rank: 0 }.into());
        }
        shared.prepare_master();
        shared.slots[0].register(shared.meta(0, master_bound));

        self.scratch_bytes.store(self.config.scratch_bytes, Ordering::Relaxed);
        kdebug!("pool {} fan-in tree depth {}", self.id, shared.tree.depth());
        kinfo!(
            "pool {} initialized: {} on {} via {} (bind={})",
            self.id,
            logical,
            usable,
            self.topology.name(),
            bind
        );
        self.running = Some(Running {
            shared,
            workers,
            usable,
            master_bound,
        });
        Ok(())
    }

    /// Stop and join every worker. No-op when not initialized.
    pub fn finalize(&mut self) -> PoolResult<()> {
        let Some(running) = self.running.as_ref() else {
            return Ok(());
        };
        if running.shared.is_asleep() {
            return Err(ConfigError::HostBlocked.into());
        }
        if running.shared.is_busy() {
            return Err(ConfigError::FunctorExecuting.into());
        }
        let Some(Running {
            shared,
            mut workers,
            master_bound,
            ..
        }) = self.running.take()
        else {
            return Ok(());
        };

        workers.sort_by_key(|(rank, _)| *rank);
        for (rank, handle) in workers {
            shared.slots[rank].set_state(ThreadState::Terminating);
            if handle.join().is_err() {
                kwarn!("worker rank {} exited abnormally", rank);
            }
            shared.slots[rank].unregister();
        }
        if master_bound && !self.topology.unbind_this_thread() {
            kwarn!("master failed to restore its cpu set");
        }
        shared.slots[0].unregister();
        kinfo!("pool {} finalized", self.id);
        Ok(())
    }

    /// Run `f` once on every rank and wait for all of them.
    ///
    /// Rank 0 runs on the calling thread. A panic on any rank is re-raised
    /// here after every rank finished.
    pub fn execute<F>(&self, f: F) -> PoolResult<()>
    where
        F: Fn(&ThreadContext<'_>) + Sync,
    {
        let shared = self.shared()?;
        let job = Job::new(&f);
        shared.publish(&job)?;
        shared.activate_workers();
        shared.run_master(&job);
        shared.wait_workers_idle();
        shared.retire();
        shared.resume_panic();
        Ok(())
    }

    /// Run `f` on one rank at a time, highest rank first, master last.
    ///
    /// Collectives must not be used inside a serial dispatch.
    pub fn execute_serial<F>(&self, f: F) -> PoolResult<()>
    where
        F: Fn(&ThreadContext<'_>) + Sync,
    {
        let shared = self.shared()?;
        let job = Job::new(&f);
        shared.publish(&job)?;
        for slot in shared.workers().iter().rev() {
            slot.set_state(ThreadState::Active);
            slot.wait_idle();
        }
        shared.run_master(&job);
        shared.retire();
        shared.resume_panic();
        Ok(())
    }

    /// Dispatch a kernel object
    pub fn run<K: PoolKernel>(&self, kernel: &K) -> PoolResult<()> {
        self.execute(|ctx| kernel.execute_on_thread(ctx))
    }

    /// Park every worker on the sleep gate. The master returns immediately.
    pub fn sleep(&self) -> PoolResult<()> {
        let shared = self.shared()?;
        shared.publish_sleep()?;
        shared.gate.close();
        shared.activate_workers();
        kdebug!("pool {} asleep", self.id);
        Ok(())
    }

    /// Release workers parked by [`sleep`](Self::sleep)
    pub fn wake(&self) -> PoolResult<()> {
        let shared = self.shared()?;
        if !shared.is_asleep() {
            return Err(ConfigError::NotAsleep.into());
        }
        shared.gate.open();
        shared.wait_workers_idle();
        shared.retire();
        kdebug!("pool {} awake", self.id);
        Ok(())
    }

    pub fn is_asleep(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.shared.is_asleep())
    }

    /// Grow every rank's scratch buffer to at least `bytes` (serial dispatch).
    /// Buffers already larger are left untouched.
    pub fn resize_scratch(&self, bytes: usize) -> PoolResult<()> {
        // SAFETY: serial dispatch runs one rank at a time
        self.execute_serial(|ctx| unsafe { ctx.reserve_exclusive(bytes) })?;
        self.scratch_bytes.fetch_max(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// Scratch size every rank is guaranteed to have, in bytes
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self) -> bool {
        self.running.is_some()
    }

    /// Registered threads, 0 when not initialized
    pub fn thread_count(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.shared.thread_count())
    }

    pub fn logical_topology(&self) -> Option<LogicalTopology> {
        self.running.as_ref().map(|r| r.shared.logical)
    }

    /// Discovered hardware shape
    pub fn hardware_shape(&self) -> HardwareShape {
        self.topology.shape()
    }

    /// Hardware extent in use after clamping
    pub fn usable_shape(&self) -> Option<HardwareShape> {
        self.running.as_ref().map(|r| r.usable)
    }

    /// Rank -> coordinate assignment
    pub fn assignment(&self) -> Option<&[HardwareCoordinate]> {
        self.running.as_ref().map(|r| r.shared.assignment.as_slice())
    }

    /// Snapshot of every registered rank, in rank order
    pub fn registry(&self) -> Vec<ThreadMeta> {
        self.running
            .as_ref()
            .map(|r| r.shared.slots.iter().filter_map(|s| s.registration()).collect())
            .unwrap_or_default()
    }

    /// Whether the calling thread is running a dispatch of this pool
    pub fn in_parallel(&self) -> bool {
        dispatch::current_pool() == Some(self.id)
    }

    pub fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// One summary line; with `detail`, one line per rank
    pub fn print_configuration<W: io::Write>(&self, out: &mut W, detail: bool) -> io::Result<()> {
        let hw = self.hardware_shape();
        let state = match &self.running {
            None => "uninitialized",
            Some(r) if r.shared.is_asleep() => "asleep",
            Some(r) if r.shared.is_busy() => "executing",
            Some(_) => "idle",
        };
        write!(out, "numapool[{}] {} [{}]", self.topology.name(), state, hw)?;
        if let Some(r) = &self.running {
            write!(
                out,
                " using {} x {} for {} = {} threads",
                r.usable.numa_count,
                r.usable.cores_per_numa,
                r.shared.logical,
                r.shared.thread_count()
            )?;
        }
        writeln!(out)?;

        if detail {
            for meta in self.registry() {
                writeln!(
                    out,
                    "  rank {:>4}  gang {:>3}  worker {:>3}  core {}{}",
                    meta.rank,
                    meta.gang,
                    meta.worker,
                    meta.coordinate,
                    if meta.bound { "" } else { "  (unbound)" }
                )?;
            }
        }
        Ok(())
    }

    fn shared(&self) -> PoolResult<&Shared> {
        self.running
            .as_ref()
            .map(|r| &*r.shared)
            .ok_or_else(|| ConfigError::NotInitialized.into())
    }
}

impl Drop for HostPool {
    fn drop(&mut self) {
        if self.is_asleep() {
            let _ = self.wake();
        }
        if let Err(e) = self.finalize() {
            kwarn!("pool {} not finalized on drop: {}", self.id, e);
        }
    }
}

/// Spawn the `n`th worker and wait for its readiness report
fn spawn_worker(
    shared: &Arc<Shared>,
    n: usize,
    timeout: Duration,
) -> Result<(usize, JoinHandle<()>), SpawnError> {
    shared.handshake.begin();
    let worker_shared = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name(format!("numapool-worker-{}", n))
        .spawn(move || worker::worker_main(worker_shared))
        .map_err(|e| {
            kerror!("thread spawn failed: {}", e);
            SpawnError::SpawnFailed
        })?;

    let deadline = Instant::now() + timeout;
    let backoff = Backoff::new();
    loop {
        if let Some(report) = shared.handshake.poll() {
            return match report {
                Ok(rank) => Ok((rank, handle)),
                Err(e) => {
                    let _ = handle.join();
                    Err(e)
                }
            };
        }
        if handle.is_finished() {
            let outcome = shared.handshake.poll();
            let _ = handle.join();
            return Err(match outcome {
                Some(Err(e)) => e,
                _ => SpawnError::Panicked,
            });
        }
        if Instant::now() >= deadline {
            // the thread stays detached; teardown marks every slot
            // Terminating so it exits if it ever registers
            return Err(SpawnError::Timeout);
        }
        backoff.snooze();
    }
}

/// Stop and join the workers spawned so far
fn teardown(shared: &Shared, workers: Vec<(usize, JoinHandle<()>)>) {
    for slot in shared.workers() {
        slot.set_state(ThreadState::Terminating);
    }
    for (rank, handle) in workers {
        let _ = handle.join();
        shared.slots[rank].unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::FallbackTopology;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn unbound_pool() -> HostPool {
        HostPool::with_topology(
            PoolConfig::new().bind_threads(false),
            Arc::new(FallbackTopology::new()),
        )
    }

    fn pool(gangs: usize, workers: usize) -> HostPool {
        let mut pool = unbound_pool();
        pool.initialize(LogicalTopology::new(gangs, workers), None).unwrap();
        pool
    }

    /// 2 x 2 grid whose binding can be made to fail
    struct GridTopology {
        fail_bind: AtomicBool,
    }

    impl Topology for GridTopology {
        fn shape(&self) -> HardwareShape {
            HardwareShape::new(2, 2)
        }
        fn this_thread_coordinate(&self) -> PoolResult<HardwareCoordinate> {
            Err(TopologyError::UnknownLocation.into())
        }
        fn bind_this_thread(&self, _coord: HardwareCoordinate) -> bool {
            !self.fail_bind.load(Ordering::SeqCst)
        }
        fn unbind_this_thread(&self) -> bool {
            true
        }
        fn can_bind(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "grid"
        }
    }

    fn grid_pool(fail_bind: bool) -> HostPool {
        let topo = Arc::new(GridTopology {
            fail_bind: AtomicBool::new(fail_bind),
        });
        HostPool::with_topology(PoolConfig::new(), topo)
    }

    #[test]
    fn test_every_rank_runs_exactly_once() {
        let pool = pool(3, 4);
        assert_eq!(pool.thread_count(), 12);

        let hits: Vec<AtomicUsize> = (0..12).map(|_| AtomicUsize::new(0)).collect();
        for _ in 0..50 {
            pool.execute(|ctx| {
                hits[ctx.rank()].fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 50));
    }

    #[test]
    fn test_serial_order_descending_then_master() {
        let pool = pool(1, 5);
        let order = Mutex::new(Vec::new());
        pool.execute_serial(|ctx| order.lock().unwrap().push(ctx.rank()))
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_reentrant_dispatch_rejected() {
        let pool = pool(1, 3);
        let errors = Mutex::new(Vec::new());
        pool.execute(|ctx| {
            if ctx.is_master() {
                assert!(pool.in_parallel());
                errors.lock().unwrap().push(pool.execute(|_| {}).unwrap_err());
                errors.lock().unwrap().push(pool.execute_serial(|_| {}).unwrap_err());
            }
        })
        .unwrap();
        let errors = errors.into_inner().unwrap();
        assert!(errors
            .iter()
            .all(|e| *e == ConfigError::FunctorExecuting.into()));
        assert!(!pool.in_parallel());

        // slot was left intact and released afterwards
        pool.execute(|_| {}).unwrap();
    }

    #[test]
    fn test_reentrant_dispatch_from_worker_rejected() {
        let pool = pool(1, 4);
        let errors = Mutex::new(Vec::new());
        pool.execute(|ctx| {
            if ctx.rank() == 3 {
                assert!(pool.in_parallel());
                errors.lock().unwrap().push(pool.execute(|_| {}).unwrap_err());
                errors.lock().unwrap().push(pool.sleep().unwrap_err());
            }
        })
        .unwrap();
        let errors = errors.into_inner().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| *e == ConfigError::FunctorExecuting.into()));

        let runs = AtomicUsize::new(0);
        pool.execute(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_initialize_inside_region_rejected() {
        let pool = pool(1, 2);
        let nested = Mutex::new(None);
        pool.execute(|ctx| {
            if ctx.is_master() {
                let mut other = unbound_pool();
                *nested.lock().unwrap() =
                    Some(other.initialize(LogicalTopology::serial(), None));
            }
        })
        .unwrap();
        assert_eq!(
            nested.into_inner().unwrap(),
            Some(Err(ConfigError::AlreadyActive.into()))
        );
    }

    #[test]
    fn test_finalize_is_idempotent_and_reinitializable() {
        let mut pool = pool(2, 2);
        assert_eq!(
            pool.initialize(LogicalTopology::new(1, 1), None),
            Err(ConfigError::AlreadyActive.into())
        );
        pool.finalize().unwrap();
        pool.finalize().unwrap();
        assert!(!pool.is_initialized());
        assert_eq!(pool.execute(|_| {}), Err(ConfigError::NotInitialized.into()));

        pool.initialize(LogicalTopology::new(1, 3), None).unwrap();
        assert_eq!(pool.thread_count(), 3);
        pool.finalize().unwrap();
    }

    #[test]
    fn test_single_thread_pool_spawns_nothing() {
        let pool = pool(1, 1);
        assert_eq!(pool.thread_count(), 1);
        assert_eq!(pool.registry().len(), 1);

        let runs = AtomicUsize::new(0);
        let caller = thread::current().id();
        pool.execute(|ctx| {
            assert_eq!(thread::current().id(), caller);
            assert_eq!(ctx.reduce(5u32, |a, b| a + b), 5);
            ctx.barrier();
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collectives_inside_dispatch() {
        let pool = pool(2, 3);
        let n = 1_000usize;
        let seen = Mutex::new(Vec::new());
        pool.execute(|ctx| {
            let local: usize = ctx.partition(n).sum();
            let total = ctx.reduce(local, |a, b| a + b);
            let root = ctx.broadcast(ctx.rank() * 100 + 7);
            ctx.barrier();
            seen.lock().unwrap().push((total, root));
        })
        .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|&(t, r)| t == n * (n - 1) / 2 && r == 7));
    }

    #[test]
    fn test_registry_metadata() {
        let pool = pool(2, 3);
        let registry = pool.registry();
        assert_eq!(registry.len(), 6);
        for (i, meta) in registry.iter().enumerate() {
            assert_eq!(meta.rank, i);
            assert_eq!((meta.gang, meta.worker), (i / 3, i % 3));
            assert!(!meta.bound);
        }
    }

    #[test]
    fn test_sleep_and_wake() {
        let pool = pool(1, 4);
        assert_eq!(pool.wake(), Err(ConfigError::NotAsleep.into()));

        pool.sleep().unwrap();
        assert!(pool.is_asleep());
        assert_eq!(pool.execute(|_| {}), Err(ConfigError::HostBlocked.into()));
        assert_eq!(pool.sleep(), Err(ConfigError::HostBlocked.into()));
        thread::sleep(Duration::from_millis(20));
        pool.wake().unwrap();
        assert!(!pool.is_asleep());

        let runs = AtomicUsize::new(0);
        pool.execute(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_finalize_while_asleep_is_rejected() {
        let mut pool = pool(1, 2);
        pool.sleep().unwrap();
        assert_eq!(pool.finalize(), Err(ConfigError::HostBlocked.into()));
        pool.wake().unwrap();
        pool.finalize().unwrap();
    }

    #[test]
    fn test_drop_while_asleep() {
        let pool = pool(1, 3);
        pool.sleep().unwrap();
        drop(pool);
    }

    #[test]
    fn test_worker_panic_is_propagated() {
        let pool = pool(1, 3);
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            pool.execute(|ctx| {
                if ctx.rank() == 2 {
                    panic!("rank 2 failed");
                }
            })
        }));
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rank 2 failed"));

        // pool still serves dispatches
        let runs = AtomicUsize::new(0);
        pool.execute(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resize_scratch() {
        let pool = pool(1, 3);
        pool.resize_scratch(1024).unwrap();
        assert_eq!(pool.scratch_bytes(), 1024);
        let lens = Mutex::new(Vec::new());
        pool.execute(|ctx| lens.lock().unwrap().push(ctx.scratch_len()))
            .unwrap();
        assert!(lens.into_inner().unwrap().iter().all(|&l| l == 1024));
    }

    #[test]
    fn test_resize_scratch_never_shrinks_a_rank() {
        let mut pool = HostPool::with_topology(
            PoolConfig::new().bind_threads(false).scratch_bytes(8),
            Arc::new(FallbackTopology::new()),
        );
        pool.initialize(LogicalTopology::new(1, 3), None).unwrap();
        pool.execute(|ctx| {
            if ctx.rank() == 2 {
                ctx.resize_scratch(4096);
                ctx.with_scratch(|buf| buf[4095] = 0xab);
            }
        })
        .unwrap();
        pool.resize_scratch(64).unwrap();
        assert_eq!(pool.scratch_bytes(), 64);

        let seen = Mutex::new(Vec::new());
        pool.execute(|ctx| {
            let tail = ctx.with_scratch(|buf| buf.last().copied());
            seen.lock().unwrap().push((ctx.rank(), ctx.scratch_len(), tail));
        })
        .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![(0, 64, Some(0)), (1, 64, Some(0)), (2, 4096, Some(0xab))]);
    }

    #[test]
    fn test_kernel_object() {
        struct Count(AtomicUsize);
        impl PoolKernel for Count {
            fn execute_on_thread(&self, ctx: &ThreadContext<'_>) {
                self.0.fetch_add(ctx.rank() + 1, Ordering::SeqCst);
            }
        }
        let pool = pool(1, 4);
        let kernel = Count(AtomicUsize::new(0));
        pool.run(&kernel).unwrap();
        assert_eq!(kernel.0.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_capacity_and_cap() {
        let mut pool = grid_pool(false);
        assert_eq!(
            pool.initialize(LogicalTopology::new(1, 5), None),
            Err(TopologyError::InsufficientCapacity {
                requested: 5,
                available: 4
            }
            .into())
        );
        assert!(!pool.is_initialized());

        // cap to one region of two cores
        assert_eq!(
            pool.initialize(LogicalTopology::new(1, 3), Some(HardwareShape::new(1, 2))),
            Err(TopologyError::InsufficientCapacity {
                requested: 3,
                available: 2
            }
            .into())
        );

        pool.initialize(LogicalTopology::new(2, 2), None).unwrap();
        let assignment = pool.assignment().unwrap().to_vec();
        assert_eq!(assignment[0], HardwareCoordinate::new(0, 0));
        assert_eq!(assignment.len(), 4);
        assert!(pool.registry().iter().all(|m| m.bound));
        pool.finalize().unwrap();
    }

    #[test]
    fn test_bind_failure_rolls_back() {
        let mut pool = grid_pool(true);
        let err = pool
            .initialize(LogicalTopology::new(1, 3), None)
            .unwrap_err();
        assert!(matches!(
            err,
            numapool_core::PoolError::Spawn(SpawnError::BindFailed { .. })
        ));
        assert!(!pool.is_initialized());
        assert_eq!(pool.thread_count(), 0);

        // unbound retry on the same topology succeeds
        let topo = Arc::clone(pool.topology());
        let mut pool = HostPool::with_topology(PoolConfig::new().bind_threads(false), topo);
        pool.initialize(LogicalTopology::new(1, 3), None).unwrap();
        assert!(pool.registry().iter().all(|m| !m.bound));
    }

    /// Single location whose threads take `delay_ms` to report where they run
    struct SlowStartTopology {
        delay_ms: AtomicU64,
    }

    impl Topology for SlowStartTopology {
        fn shape(&self) -> HardwareShape {
            HardwareShape::single()
        }
        fn this_thread_coordinate(&self) -> PoolResult<HardwareCoordinate> {
            thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
            Ok(HardwareCoordinate::default())
        }
        fn bind_this_thread(&self, _coord: HardwareCoordinate) -> bool {
            true
        }
        fn unbind_this_thread(&self) -> bool {
            true
        }
        fn can_bind(&self) -> bool {
            false
        }
        fn name(&self) -> &'static str {
            "slow-start"
        }
    }

    #[test]
    fn test_spawn_timeout_rolls_back() {
        let topo = Arc::new(SlowStartTopology {
            delay_ms: AtomicU64::new(2_000),
        });
        let config = PoolConfig::new()
            .bind_threads(false)
            .spawn_timeout(Duration::from_millis(250));
        let mut pool = HostPool::with_topology(config, topo.clone());

        let err = pool
            .initialize(LogicalTopology::new(1, 3), None)
            .unwrap_err();
        assert_eq!(err, SpawnError::Timeout.into());
        assert!(!pool.is_initialized());
        assert_eq!(pool.thread_count(), 0);

        topo.delay_ms.store(0, Ordering::SeqCst);
        pool.initialize(LogicalTopology::new(1, 3), None).unwrap();
        assert_eq!(pool.registry().len(), 3);
        let runs = AtomicUsize::new(0);
        pool.execute(|_| {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_print_configuration() {
        let mut pool = unbound_pool();
        let mut out = Vec::new();
        pool.print_configuration(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("numapool[fallback] uninitialized"));

        pool.initialize(LogicalTopology::new(1, 2), None).unwrap();
        let mut out = Vec::new();
        pool.print_configuration(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("idle"));
        assert!(lines[0].contains("1 gangs x 2 workers = 2 threads"));
        assert!(lines[2].contains("rank    1"));
        assert!(lines[2].contains("(unbound)"));
    }
}
