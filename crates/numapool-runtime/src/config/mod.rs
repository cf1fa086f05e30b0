//! Pool configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. Library defaults (`config::defaults`)
//!
//! ```rust,ignore
//! use numapool_runtime::config::PoolConfig;
//!
//! let config = PoolConfig::from_env()
//!     .gangs(2)
//!     .workers_per_gang(4)
//!     .bind_threads(false);
//! ```

pub mod defaults;

use numapool_core::constants::MAX_THREADS;
use numapool_core::env::{env_get, env_get_bool, env_get_pair};
use numapool_core::error::ConfigError;
use numapool_core::{HardwareShape, LogicalTopology};
use std::time::Duration;

/// Pool configuration with builder pattern
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Gangs in the logical grid
    pub gangs: usize,
    /// Workers per gang
    pub workers_per_gang: usize,
    /// Optional cap on the hardware extent the pool may use
    pub hardware_cap: Option<HardwareShape>,
    /// Pin threads to their assigned cores
    pub bind_threads: bool,
    /// Initial per-thread scratch buffer size in bytes
    pub scratch_bytes: usize,
    /// Bounded wait for each spawned thread's readiness report
    pub spawn_timeout: Duration,
    /// Re-check interval of sleeping workers
    pub sleep_poll: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `NPL_GANGS` - gangs in the logical grid
    /// - `NPL_WORKERS_PER_GANG` - workers per gang
    /// - `NPL_SHAPE` - hardware cap as `NUMAxCORES`, e.g. `2x8`
    /// - `NPL_NUMA_CAP` / `NPL_CORES_CAP` - hardware cap, one axis each
    /// - `NPL_BIND` - pin threads to cores (0/1)
    /// - `NPL_SCRATCH_BYTES` - per-thread scratch size
    /// - `NPL_SPAWN_TIMEOUT_MS` - spawn confirmation timeout
    /// - `NPL_SLEEP_POLL_MS` - sleep gate re-check interval
    pub fn from_env() -> Self {
        let base = Self::new();

        let hardware_cap = env_get_pair("NPL_SHAPE")
            .map(|(n, c)| HardwareShape::new(n, c))
            .or_else(|| {
                let numa = env_get("NPL_NUMA_CAP", 0usize);
                let cores = env_get("NPL_CORES_CAP", 0usize);
                (numa > 0 || cores > 0).then(|| HardwareShape::new(numa, cores))
            });

        Self {
            gangs: env_get("NPL_GANGS", base.gangs),
            workers_per_gang: env_get("NPL_WORKERS_PER_GANG", base.workers_per_gang),
            hardware_cap,
            bind_threads: env_get_bool("NPL_BIND", base.bind_threads),
            scratch_bytes: env_get("NPL_SCRATCH_BYTES", base.scratch_bytes),
            spawn_timeout: Duration::from_millis(env_get(
                "NPL_SPAWN_TIMEOUT_MS",
                defaults::SPAWN_TIMEOUT_MS,
            )),
            sleep_poll: Duration::from_millis(env_get(
                "NPL_SLEEP_POLL_MS",
                defaults::SLEEP_POLL_MS,
            )),
        }
    }

    /// Library defaults only, no environment lookup
    pub fn new() -> Self {
        Self {
            gangs: defaults::gangs(),
            workers_per_gang: defaults::workers_per_gang(),
            hardware_cap: None,
            bind_threads: defaults::BIND_THREADS,
            scratch_bytes: defaults::SCRATCH_BYTES,
            spawn_timeout: Duration::from_millis(defaults::SPAWN_TIMEOUT_MS),
            sleep_poll: Duration::from_millis(defaults::SLEEP_POLL_MS),
        }
    }

    // Builder methods

    pub fn gangs(mut self, n: usize) -> Self {
        self.gangs = n;
        self
    }

    pub fn workers_per_gang(mut self, n: usize) -> Self {
        self.workers_per_gang = n;
        self
    }

    pub fn hardware_cap(mut self, cap: Option<HardwareShape>) -> Self {
        self.hardware_cap = cap;
        self
    }

    pub fn bind_threads(mut self, enable: bool) -> Self {
        self.bind_threads = enable;
        self
    }

    pub fn scratch_bytes(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }

    pub fn spawn_timeout(mut self, d: Duration) -> Self {
        self.spawn_timeout = d;
        self
    }

    pub fn sleep_poll(mut self, d: Duration) -> Self {
        self.sleep_poll = d;
        self
    }

    /// Requested logical grid
    pub fn logical(&self) -> LogicalTopology {
        LogicalTopology::new(self.gangs, self.workers_per_gang)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gangs == 0 {
            return Err(ConfigError::InvalidValue("gangs must be > 0"));
        }
        if self.workers_per_gang == 0 {
            return Err(ConfigError::InvalidValue("workers_per_gang must be > 0"));
        }
        if self.gangs.saturating_mul(self.workers_per_gang) > MAX_THREADS {
            return Err(ConfigError::InvalidValue("too many threads requested"));
        }
        if self.spawn_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("spawn_timeout must be > 0"));
        }
        if self.sleep_poll.is_zero() {
            return Err(ConfigError::InvalidValue("sleep_poll must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("numapool configuration:");
        eprintln!("  gangs:             {}", self.gangs);
        eprintln!("  workers_per_gang:  {}", self.workers_per_gang);
        match self.hardware_cap {
            Some(cap) => eprintln!("  hardware_cap:      {}x{}", cap.numa_count, cap.cores_per_numa),
            None => eprintln!("  hardware_cap:      none"),
        }
        eprintln!("  bind_threads:      {}", self.bind_threads);
        eprintln!("  scratch_bytes:     {}", self.scratch_bytes);
        eprintln!("  spawn_timeout:     {:?}", self.spawn_timeout);
        eprintln!("  sleep_poll:        {:?}", self.sleep_poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PoolConfig::new();
        assert!(config.gangs >= 1);
        assert!(config.workers_per_gang >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new()
            .gangs(2)
            .workers_per_gang(3)
            .bind_threads(false)
            .hardware_cap(Some(HardwareShape::new(1, 6)));

        assert_eq!(config.logical(), LogicalTopology::new(2, 3));
        assert!(!config.bind_threads);
        assert_eq!(config.hardware_cap, Some(HardwareShape::new(1, 6)));
    }

    #[test]
    fn test_validation() {
        assert!(PoolConfig::new().gangs(0).validate().is_err());
        assert!(PoolConfig::new().workers_per_gang(0).validate().is_err());
        assert!(PoolConfig::new().gangs(MAX_THREADS).workers_per_gang(2).validate().is_err());
        assert!(PoolConfig::new().spawn_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_from_env_shape() {
        std::env::set_var("NPL_SHAPE", "2x3");
        std::env::set_var("NPL_GANGS", "4");
        let config = PoolConfig::from_env();
        std::env::remove_var("NPL_SHAPE");
        std::env::remove_var("NPL_GANGS");

        assert_eq!(config.hardware_cap, Some(HardwareShape::new(2, 3)));
        assert_eq!(config.gangs, 4);
    }
}
