//! Hardware topology discovery and thread binding
//!
//! The pool only sees the hardware through [`Topology`]: a symmetric grid of
//! NUMA regions x cores restricted to the cpus this process may run on, a way
//! to ask where the calling thread is, and bind / unbind of the calling
//! thread. Platforms without a topology source get [`FallbackTopology`], a
//! single-core grid on which every bind trivially succeeds.

mod fallback;

pub use fallback::FallbackTopology;

use numapool_core::{HardwareCoordinate, HardwareShape, PoolResult};
use std::sync::{Arc, OnceLock};

/// Platform topology source
pub trait Topology: Send + Sync {
    /// Usable grid, symmetric across NUMA regions
    fn shape(&self) -> HardwareShape;

    /// Coordinate of the core the calling thread last ran on
    fn this_thread_coordinate(&self) -> PoolResult<HardwareCoordinate>;

    /// Pin the calling thread to the hardware threads of `coord`.
    ///
    /// Best effort: returns `false` when `coord` is out of range or the OS
    /// refused the request.
    fn bind_this_thread(&self, coord: HardwareCoordinate) -> bool;

    /// Restore the calling thread to the process-wide cpu set
    fn unbind_this_thread(&self) -> bool;

    /// Whether binding has any effect on this platform
    fn can_bind(&self) -> bool;

    /// Provider name for diagnostics
    fn name(&self) -> &'static str;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod sysfs;
        pub use sysfs::{parse_cpulist, SysfsTopology};

        fn discover() -> Arc<dyn Topology> {
            match SysfsTopology::discover() {
                Ok(topo) => Arc::new(topo),
                Err(e) => {
                    numapool_core::kwarn!("topology discovery failed ({}), running unbound", e);
                    Arc::new(FallbackTopology::new())
                }
            }
        }
    } else {
        fn discover() -> Arc<dyn Topology> {
            Arc::new(FallbackTopology::new())
        }
    }
}

static PROCESS_TOPOLOGY: OnceLock<Arc<dyn Topology>> = OnceLock::new();

/// Process-wide topology, queried from the hardware on first use
pub fn detect() -> Arc<dyn Topology> {
    PROCESS_TOPOLOGY.get_or_init(discover).clone()
}
