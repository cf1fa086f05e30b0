//! Library defaults, overridden by `NPL_*` environment variables

use crate::topology;

/// Bind each thread to its assigned core
pub const BIND_THREADS: bool = true;

/// Per-thread reduction and scratch buffer size
pub const SCRATCH_BYTES: usize = numapool_core::constants::DEFAULT_SCRATCH_BYTES;

/// How long initialize() waits for one spawned thread to report in
pub const SPAWN_TIMEOUT_MS: u64 = 10_000;

/// Interval at which sleeping workers re-check the sleep gate
pub const SLEEP_POLL_MS: u64 = 100;

/// Gangs: one per NUMA region
pub fn gangs() -> usize {
    topology::detect().shape().numa_count.max(1)
}

/// Workers per gang: one per core of a region
pub fn workers_per_gang() -> usize {
    topology::detect().shape().cores_per_numa.max(1)
}
