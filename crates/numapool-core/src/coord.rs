//! Hardware and logical thread grids

use core::fmt;

/// A (numa, core) binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HardwareCoordinate {
    pub numa: usize,
    pub core: usize,
}

impl HardwareCoordinate {
    #[inline]
    pub const fn new(numa: usize, core: usize) -> Self {
        Self { numa, core }
    }

    /// True when the coordinate lies inside `shape`
    #[inline]
    pub const fn within(&self, shape: &HardwareShape) -> bool {
        self.numa < shape.numa_count && self.core < shape.cores_per_numa
    }
}

impl fmt::Display for HardwareCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.numa, self.core)
    }
}

/// Usable hardware grid: `numa_count` regions of `cores_per_numa` cores,
/// each core exposing `threads_per_core` hardware threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareShape {
    pub numa_count: usize,
    pub cores_per_numa: usize,
    pub threads_per_core: usize,
}

impl HardwareShape {
    pub const fn new(numa_count: usize, cores_per_numa: usize) -> Self {
        Self { numa_count, cores_per_numa, threads_per_core: 1 }
    }

    /// Single core, used when the platform cannot report a topology
    pub const fn single() -> Self {
        Self::new(1, 1)
    }

    pub const fn with_threads_per_core(mut self, n: usize) -> Self {
        self.threads_per_core = n;
        self
    }

    /// Number of (numa, core) slots
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.numa_count * self.cores_per_numa
    }

    #[inline]
    pub const fn is_degenerate(&self) -> bool {
        self.numa_count == 0 || self.cores_per_numa == 0
    }

    /// Clamp a requested extent to this (actual) shape.
    ///
    /// A degenerate request, or one larger than the hardware on either axis,
    /// yields the full hardware shape.
    pub fn clamp_request(&self, requested: Option<HardwareShape>) -> HardwareShape {
        match requested {
            Some(r)
                if !r.is_degenerate()
                    && r.numa_count <= self.numa_count
                    && r.cores_per_numa <= self.cores_per_numa =>
            {
                HardwareShape { threads_per_core: self.threads_per_core, ..r }
            }
            _ => *self,
        }
    }
}

impl fmt::Display for HardwareShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} numa x {} cores x {} threads",
            self.numa_count, self.cores_per_numa, self.threads_per_core
        )
    }
}

/// Requested logical grid of gangs x workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalTopology {
    pub gang_count: usize,
    pub workers_per_gang: usize,
}

impl LogicalTopology {
    pub const fn new(gang_count: usize, workers_per_gang: usize) -> Self {
        Self { gang_count, workers_per_gang }
    }

    /// Master thread only
    pub const fn serial() -> Self {
        Self::new(1, 1)
    }

    #[inline]
    pub const fn thread_count(&self) -> usize {
        self.gang_count * self.workers_per_gang
    }

    /// Gang id of `rank`; gangs occupy contiguous rank ranges
    #[inline]
    pub const fn gang_of(&self, rank: usize) -> usize {
        rank / self.workers_per_gang
    }

    /// Worker-in-gang id of `rank`
    #[inline]
    pub const fn worker_of(&self, rank: usize) -> usize {
        rank % self.workers_per_gang
    }
}

impl fmt::Display for LogicalTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} gangs x {} workers", self.gang_count, self.workers_per_gang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_request() {
        let hw = HardwareShape::new(2, 8).with_threads_per_core(2);

        assert_eq!(hw.clamp_request(None), hw);
        assert_eq!(hw.clamp_request(Some(HardwareShape::new(0, 4))), hw);
        assert_eq!(hw.clamp_request(Some(HardwareShape::new(4, 4))), hw);
        assert_eq!(hw.clamp_request(Some(HardwareShape::new(2, 16))), hw);

        let clamped = hw.clamp_request(Some(HardwareShape::new(1, 4)));
        assert_eq!((clamped.numa_count, clamped.cores_per_numa), (1, 4));
        assert_eq!(clamped.threads_per_core, 2);
    }

    #[test]
    fn test_gang_and_worker_ids() {
        let t = LogicalTopology::new(3, 4);
        assert_eq!(t.thread_count(), 12);
        assert_eq!((t.gang_of(0), t.worker_of(0)), (0, 0));
        assert_eq!((t.gang_of(5), t.worker_of(5)), (1, 1));
        assert_eq!((t.gang_of(11), t.worker_of(11)), (2, 3));
    }

    #[test]
    fn test_within() {
        let hw = HardwareShape::new(2, 4);
        assert!(HardwareCoordinate::new(1, 3).within(&hw));
        assert!(!HardwareCoordinate::new(2, 0).within(&hw));
        assert!(!HardwareCoordinate::new(0, 4).within(&hw));
    }
}
