//! Topology for platforms without a hardware query
//!
//! One NUMA region with one core; the caller is always at (0,0) and binding
//! is a no-op that reports success. Kernels run correctly, just without
//! locality.

use super::Topology;
use numapool_core::{HardwareCoordinate, HardwareShape, PoolResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackTopology;

impl FallbackTopology {
    pub fn new() -> Self {
        Self
    }
}

impl Topology for FallbackTopology {
    fn shape(&self) -> HardwareShape {
        HardwareShape::single()
    }

    fn this_thread_coordinate(&self) -> PoolResult<HardwareCoordinate> {
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
        "fallback"
    }
}
