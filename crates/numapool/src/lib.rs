//! # numapool - NUMA-aware host thread pool
//!
//! A fixed pool of OS threads, each pinned to one (numa, core) coordinate,
//! driven by the calling thread. Kernels are dispatched synchronously to
//! every rank and synchronize through a static fan-in tree.
//!
//! ## Features
//!
//! - **Topology aware**: gangs balanced over NUMA regions, workers over cores
//! - **Deterministic**: fixed rank -> core mapping and fixed combine order
//! - **Collectives**: barrier, fan-in, reduce and broadcast with logarithmic depth
//! - **Sleep / wake**: park the whole pool on a futex without burning cpu
//!
//! ## Quick Start
//!
//! ```ignore
//! use numapool::{HostPool, LogicalTopology, PoolConfig, ReducePolicy};
//!
//! fn main() -> numapool::PoolResult<()> {
//!     let mut pool = HostPool::new(PoolConfig::from_env());
//!     pool.initialize(LogicalTopology::new(2, 4), None)?;
//!
//!     let xs: Vec<f64> = (0..1_000_000).map(|i| i as f64).collect();
//!     let policy: ReducePolicy<f64> = ReducePolicy::new(|| 0.0, |a, b| a + b);
//!     let sum = numapool::parallel_reduce(&pool, xs.len(), &policy, |range, acc, _| {
//!         *acc += xs[range].iter().sum::<f64>();
//!     })?;
//!
//!     pool.print_configuration(&mut std::io::stdout(), true).ok();
//!     pool.finalize()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Kernels                           │
//! │        parallel_for, parallel_reduce, execute, run          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HostPool                              │
//! │     lifecycle, dispatch slot, sleep gate, thread registry   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Master   │      │  Worker   │      │  Worker   │
//!    │  rank 0   │      │  rank 1   │      │  rank N   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                    Topology                             │
//!    │    sysfs NUMA nodes x cores, sched affinity binding     │
//!    └─────────────────────────────────────────────────────────┘
//! ```

pub mod dispatch;

pub use dispatch::{parallel_for, parallel_reduce, ReducePolicy};

// Re-export core types
pub use numapool_core::{
    balanced_split,
    compute_mapping,
    partition,
    ClaimTable,
    ConfigError,
    FanInTree,
    HardwareCoordinate,
    HardwareShape,
    LogicalTopology,
    PoolError,
    PoolResult,
    SpawnError,
    ThreadAssignment,
    ThreadState,
    TopologyError,
};

// Re-export kprint macros for debug logging
pub use numapool_core::{kprint, kerror, kwarn, kinfo, kdebug, ktrace};
pub use numapool_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use numapool_core::{env_get, env_get_bool, env_get_opt, env_get_pair};

// Re-export runtime types
pub use numapool_runtime::{
    detect,
    FallbackTopology,
    HostPool,
    PoolConfig,
    PoolKernel,
    ThreadContext,
    ThreadMeta,
    Topology,
};
