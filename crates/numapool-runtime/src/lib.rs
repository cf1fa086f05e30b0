//! # numapool-runtime
//!
//! Platform-specific half of the numapool host thread pool.
//!
//! This crate provides:
//! - Topology discovery and thread binding (Linux sysfs, portable fallback)
//! - The sleep gate parked workers block on (futex, condvar fallback)
//! - Pool configuration from defaults and `NPL_*` environment variables
//! - Worker threads, the per-rank synchronization core, and [`HostPool`]

pub mod config;
pub mod topology;
pub mod gate;
pub mod worker;
pub mod sync;
pub mod dispatch;
pub mod pool;

// Re-exports
pub use config::PoolConfig;
pub use topology::{detect, FallbackTopology, Topology};
pub use gate::{new_gate, SleepGate};
pub use worker::ThreadMeta;
pub use sync::ThreadContext;
pub use dispatch::{current_pool, PoolKernel};
pub use pool::HostPool;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub use topology::{parse_cpulist, SysfsTopology};
    }
}
