//! # numapool-core
//!
//! Platform-agnostic building blocks of the numapool host thread pool.
//! Nothing here touches the OS; discovery, binding and threads live in
//! `numapool-runtime`.
//!
//! ## Modules
//!
//! - `coord` - hardware coordinates, hardware shape, logical gang x worker grid
//! - `mapping` - balanced rank -> coordinate assignment and contended-slot claiming
//! - `tree` - static fan-in tree used by barrier / reduce
//! - `partition` - contiguous work partition of an index space
//! - `state` - per-thread dispatch state
//! - `error` - error types
//! - `kprint` - leveled stderr logging macros
//! - `env` - environment variable helpers

pub mod coord;
pub mod mapping;
pub mod tree;
pub mod partition;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

pub use coord::{HardwareCoordinate, HardwareShape, LogicalTopology};
pub use mapping::{balanced_split, compute_mapping, ClaimTable, ThreadAssignment};
pub use tree::FanInTree;
pub use partition::partition;
pub use state::ThreadState;
pub use error::{ConfigError, PoolError, PoolResult, SpawnError, TopologyError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_pair};

/// Layout constants
pub mod constants {
    /// Upper bound on pool threads
    pub const MAX_THREADS: usize = 1024;

    /// Default per-thread reduction scratch in bytes
    pub const DEFAULT_SCRATCH_BYTES: usize = 256;
}
