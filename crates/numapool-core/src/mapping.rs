//! Logical rank -> hardware coordinate assignment
//!
//! The assignment is computed once at pool initialization and must be
//! reproducible: the same (logical, hardware, master) input always yields the
//! same rank order.

use crate::coord::{HardwareCoordinate, HardwareShape, LogicalTopology};
use crate::error::{ConfigError, PoolResult, TopologyError};

/// One coordinate per rank; index 0 belongs to the master thread
pub type ThreadAssignment = Vec<HardwareCoordinate>;

/// Split `total` items over `bins` as evenly as possible.
///
/// With `ceil = ceil(total / bins)` and `k = bins * ceil - total`, the first
/// `bins - k` bins hold `ceil` and the last `k` hold `floor`.
/// `balanced_split(5, 2) == [3, 2]`.
pub fn balanced_split(total: usize, bins: usize) -> Vec<usize> {
    if bins == 0 {
        return Vec::new();
    }
    let floor = total / bins;
    let ceil = floor + usize::from(total % bins != 0);
    let k = bins * ceil - total;
    (0..bins).map(|i| if i < bins - k { ceil } else { floor }).collect()
}

/// Compute the rank -> coordinate assignment.
///
/// Gangs are balanced over NUMA regions, then each region's workers over its
/// cores; the result is rotated so that `assignment[0] == master` (for a
/// master inside `usable`).
pub fn compute_mapping(
    logical: LogicalTopology,
    usable: HardwareShape,
    master: HardwareCoordinate,
) -> PoolResult<ThreadAssignment> {
    let count = logical.thread_count();
    if count == 0 {
        return Err(ConfigError::InvalidTopology.into());
    }
    if count == 1 {
        return Ok(vec![master]);
    }
    if usable.is_degenerate() || count > usable.capacity() {
        return Err(TopologyError::InsufficientCapacity {
            requested: count,
            available: usable.capacity(),
        }
        .into());
    }

    let mut assignment = Vec::with_capacity(count);
    for (numa, gangs) in balanced_split(logical.gang_count, usable.numa_count)
        .into_iter()
        .enumerate()
    {
        let workers = gangs * logical.workers_per_gang;
        for (core, n) in balanced_split(workers, usable.cores_per_numa)
            .into_iter()
            .enumerate()
        {
            assignment.extend(std::iter::repeat(HardwareCoordinate::new(numa, core)).take(n));
        }
    }
    debug_assert_eq!(assignment.len(), count);

    rotate_to_master(&mut assignment, usable, master);
    Ok(assignment)
}

/// Shift every entry per axis so that entry 0 lands on `master`
fn rotate_to_master(
    assignment: &mut [HardwareCoordinate],
    usable: HardwareShape,
    master: HardwareCoordinate,
) {
    let Some(first) = assignment.first().copied() else {
        return;
    };
    let numa_offset = master.numa.saturating_sub(first.numa) % usable.numa_count;
    let core_offset = master.core.saturating_sub(first.core) % usable.cores_per_numa;
    for c in assignment.iter_mut() {
        c.numa = (c.numa + numa_offset) % usable.numa_count;
        c.core = (c.core + core_offset) % usable.cores_per_numa;
    }
}

/// Tracks which assignment entries have been taken by spawned threads.
///
/// A thread wakes up wherever the OS first scheduled it and claims the entry
/// closest to that location: exact (numa, core) match, then same numa, then
/// any free entry. Entry 0 is reserved for the master.
#[derive(Debug, Clone)]
pub struct ClaimTable {
    entries: ThreadAssignment,
    claimed: Vec<bool>,
}

impl ClaimTable {
    pub fn new(assignment: ThreadAssignment) -> Self {
        let mut claimed = vec![false; assignment.len()];
        if let Some(first) = claimed.first_mut() {
            *first = true;
        }
        Self { entries: assignment, claimed }
    }

    /// Claim an entry for a thread currently running at `current`.
    /// Returns the claimed rank, or `None` when every entry is taken.
    pub fn claim(&mut self, current: Option<HardwareCoordinate>) -> Option<usize> {
        let free = |i: &usize| !self.claimed[*i];
        let ranks = 0..self.entries.len();

        let rank = current
            .and_then(|cur| {
                ranks.clone().filter(free).find(|&i| self.entries[i] == cur).or_else(|| {
                    ranks.clone().filter(free).find(|&i| self.entries[i].numa == cur.numa)
                })
            })
            .or_else(|| ranks.clone().find(free))?;

        self.claimed[rank] = true;
        Some(rank)
    }

    /// Coordinate assigned to `rank`
    pub fn coordinate(&self, rank: usize) -> Option<HardwareCoordinate> {
        self.entries.get(rank).copied()
    }

    pub fn remaining(&self) -> usize {
        self.claimed.iter().filter(|c| !**c).count()
    }
}
