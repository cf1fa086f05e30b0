//! Linux topology from sysfs
//!
//! - NUMA regions: `/sys/devices/system/node/nodeN/cpulist`
//! - cores: `/sys/devices/system/cpu/cpuN/topology/thread_siblings_list`
//! - usable cpus: the process affinity mask at discovery time
//!
//! A core is usable when any of its hardware threads is in the affinity
//! mask. A batch scheduler that hands the job one hardware thread per core
//! still owns the whole core, so bind requests target the full sibling set
//! first and only fall back to the allowed subset if the kernel refuses.

use super::Topology;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use numapool_core::{kdebug, kwarn};
use numapool_core::{HardwareCoordinate, HardwareShape, PoolResult, TopologyError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

const NODE_ROOT: &str = "/sys/devices/system/node";
const CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Symmetric grid discovered from sysfs
#[derive(Debug, Clone)]
pub struct SysfsTopology {
    shape: HardwareShape,
    /// `[numa][core]` -> hardware threads of that core
    core_cpus: Vec<Vec<Vec<usize>>>,
    /// Process affinity mask captured at discovery
    allowed: Vec<usize>,
    /// cpu id -> coordinate, for every cpu inside the grid
    location: HashMap<usize, HardwareCoordinate>,
}

impl SysfsTopology {
    /// Query the hardware
    pub fn discover() -> PoolResult<Self> {
        let allowed = process_cpus()?;
        let nodes = read_nodes().unwrap_or_else(|| vec![allowed.clone()]);
        let topo = Self::assemble(nodes, read_siblings, allowed)?;
        kdebug!(
            "discovered {} ({} usable cpus)",
            topo.shape,
            topo.location.len()
        );
        Ok(topo)
    }

    /// Build the grid from per-node cpu lists.
    ///
    /// `siblings(cpu)` returns the hardware threads sharing `cpu`'s core.
    /// Regions without a usable core are dropped; if the remaining regions
    /// differ in usable cores, every region is cut down to the smallest.
    pub fn assemble<F>(nodes: Vec<Vec<usize>>, siblings: F, allowed: Vec<usize>) -> PoolResult<Self>
    where
        F: Fn(usize) -> Vec<usize>,
    {
        let allowed_set: HashSet<usize> = allowed.iter().copied().collect();

        let mut regions: Vec<Vec<Vec<usize>>> = Vec::new();
        for node_cpus in nodes {
            let mut seen = HashSet::new();
            let mut cores = Vec::new();
            for cpu in node_cpus {
                if seen.contains(&cpu) {
                    continue;
                }
                let mut threads = siblings(cpu);
                threads.push(cpu);
                threads.sort_unstable();
                threads.dedup();
                seen.extend(threads.iter().copied());
                if threads.iter().any(|t| allowed_set.contains(t)) {
                    cores.push(threads);
                }
            }
            if !cores.is_empty() {
                regions.push(cores);
            }
        }

        let cores_per_numa = regions
            .iter()
            .map(Vec::len)
            .min()
            .ok_or(TopologyError::DiscoveryFailed)?;
        if regions.iter().any(|r| r.len() != cores_per_numa) {
            kwarn!(
                "NUMA regions expose {:?} usable cores; forcing symmetric topology of {} cores per region",
                regions.iter().map(Vec::len).collect::<Vec<_>>(),
                cores_per_numa
            );
            for region in regions.iter_mut() {
                region.truncate(cores_per_numa);
            }
        }

        let threads_per_core = regions
            .iter()
            .flatten()
            .map(Vec::len)
            .min()
            .unwrap_or(1);

        let mut location = HashMap::new();
        for (numa, region) in regions.iter().enumerate() {
            for (core, threads) in region.iter().enumerate() {
                for &cpu in threads {
                    location.insert(cpu, HardwareCoordinate::new(numa, core));
                }
            }
        }

        Ok(Self {
            shape: HardwareShape::new(regions.len(), cores_per_numa)
                .with_threads_per_core(threads_per_core),
            core_cpus: regions,
            allowed,
            location,
        })
    }

    /// Hardware threads of `coord`
    pub fn cpus_of(&self, coord: HardwareCoordinate) -> Option<&[usize]> {
        self.core_cpus
            .get(coord.numa)
            .and_then(|region| region.get(coord.core))
            .map(Vec::as_slice)
    }

    /// Coordinate owning `cpu`
    pub fn coordinate_of(&self, cpu: usize) -> Option<HardwareCoordinate> {
        self.location.get(&cpu).copied()
    }
}

impl Topology for SysfsTopology {
    fn shape(&self) -> HardwareShape {
        self.shape
    }

    fn this_thread_coordinate(&self) -> PoolResult<HardwareCoordinate> {
        // SAFETY: sched_getcpu has no preconditions
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            return Err(TopologyError::UnknownLocation.into());
        }
        self.coordinate_of(cpu as usize)
            .ok_or_else(|| TopologyError::UnknownLocation.into())
    }

    fn bind_this_thread(&self, coord: HardwareCoordinate) -> bool {
        let Some(cpus) = self.cpus_of(coord) else {
            return false;
        };
        if set_affinity(cpus) {
            return true;
        }
        let owned: Vec<usize> = cpus
            .iter()
            .copied()
            .filter(|c| self.allowed.contains(c))
            .collect();
        set_affinity(&owned)
    }

    fn unbind_this_thread(&self) -> bool {
        set_affinity(&self.allowed)
    }

    fn can_bind(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}

/// Pin the calling thread to `cpus`
fn set_affinity(cpus: &[usize]) -> bool {
    let mut set = CpuSet::new();
    let mut any = false;
    for &cpu in cpus {
        any |= set.set(cpu).is_ok();
    }
    any && sched_setaffinity(Pid::from_raw(0), &set).is_ok()
}

/// Cpus the process may run on
fn process_cpus() -> PoolResult<Vec<usize>> {
    let set = sched_getaffinity(Pid::this()).map_err(|_| TopologyError::DiscoveryFailed)?;
    let cpus: Vec<usize> = (0..CpuSet::count())
        .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
        .collect();
    if cpus.is_empty() {
        return Err(TopologyError::DiscoveryFailed.into());
    }
    Ok(cpus)
}

/// Per-node cpu lists ordered by node id, `None` without NUMA sysfs
fn read_nodes() -> Option<Vec<Vec<usize>>> {
    let mut nodes: Vec<(usize, Vec<usize>)> = fs::read_dir(NODE_ROOT)
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let id = name.to_str()?.strip_prefix("node")?.parse::<usize>().ok()?;
            let list = fs::read_to_string(entry.path().join("cpulist")).ok()?;
            let cpus = parse_cpulist(&list);
            (!cpus.is_empty()).then_some((id, cpus))
        })
        .collect();
    if nodes.is_empty() {
        return None;
    }
    nodes.sort_by_key(|(id, _)| *id);
    Some(nodes.into_iter().map(|(_, cpus)| cpus).collect())
}

fn read_siblings(cpu: usize) -> Vec<usize> {
    let path = Path::new(CPU_ROOT).join(format!("cpu{cpu}/topology/thread_siblings_list"));
    fs::read_to_string(path)
        .map(|s| parse_cpulist(&s))
        .unwrap_or_default()
}

/// Parse a kernel cpu list such as `0-3,8,10-11`
pub fn parse_cpulist(s: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<usize>(), hi.parse::<usize>()) {
                    cpus.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(cpu) = part.parse::<usize>() {
                    cpus.push(cpu);
                }
            }
        }
    }
    cpus
}
