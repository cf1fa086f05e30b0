//! Error types for the host thread pool

use core::fmt;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur in pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Lifecycle or dispatch state machine was violated by the caller
    Config(ConfigError),

    /// Requested layout does not fit the discovered hardware
    Topology(TopologyError),

    /// Worker thread creation or binding failed during initialization
    Spawn(SpawnError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Config(e) => write!(f, "configuration error: {}", e),
            PoolError::Topology(e) => write!(f, "topology error: {}", e),
            PoolError::Spawn(e) => write!(f, "spawning or binding failed: {}", e),
        }
    }
}

impl std::error::Error for PoolError {}

/// Caller violated a precondition of the pool state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// initialize() on an active pool, or from inside a parallel region
    AlreadyActive,

    /// Dispatch on a pool that was never initialized (or was finalized)
    NotInitialized,

    /// A dispatch is already in flight
    FunctorExecuting,

    /// The pool was put to sleep and has not been woken
    HostBlocked,

    /// wake() on a pool that is not asleep
    NotAsleep,

    /// Logical topology with zero threads
    InvalidTopology,

    /// Rejected configuration value
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AlreadyActive => write!(f, "device already active"),
            ConfigError::NotInitialized => write!(f, "device not initialized"),
            ConfigError::FunctorExecuting => write!(f, "functor is executing"),
            ConfigError::HostBlocked => write!(f, "host is blocked"),
            ConfigError::NotAsleep => write!(f, "host is not asleep"),
            ConfigError::InvalidTopology => write!(f, "logical topology has no threads"),
            ConfigError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}

impl From<ConfigError> for PoolError {
    fn from(e: ConfigError) -> Self {
        PoolError::Config(e)
    }
}

/// Hardware topology related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// More logical threads than usable (numa, core) slots
    InsufficientCapacity { requested: usize, available: usize },

    /// Calling thread's cpu could not be matched to a coordinate
    UnknownLocation,

    /// Hardware query failed
    DiscoveryFailed,
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::InsufficientCapacity { requested, available } => write!(
                f,
                "requested {} threads but only {} cores are available",
                requested, available
            ),
            TopologyError::UnknownLocation => write!(f, "current thread location is unknown"),
            TopologyError::DiscoveryFailed => write!(f, "hardware topology discovery failed"),
        }
    }
}

impl From<TopologyError> for PoolError {
    fn from(e: TopologyError) -> Self {
        PoolError::Topology(e)
    }
}

/// Worker spawn related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// OS refused to create the thread
    SpawnFailed,

    /// Thread could not be pinned to its assigned coordinate
    BindFailed { rank: usize },

    /// Thread did not confirm readiness in time
    Timeout,

    /// Thread died before confirming readiness
    Panicked,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            SpawnError::BindFailed { rank } => write!(f, "failed to bind rank {}", rank),
            SpawnError::Timeout => write!(f, "worker did not report readiness"),
            SpawnError::Panicked => write!(f, "worker thread panicked during startup"),
        }
    }
}

impl From<SpawnError> for PoolError {
    fn from(e: SpawnError) -> Self {
        PoolError::Spawn(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e: PoolError = ConfigError::AlreadyActive.into();
        assert_eq!(format!("{}", e), "configuration error: device already active");

        let e: PoolError = SpawnError::BindFailed { rank: 3 }.into();
        assert_eq!(format!("{}", e), "spawning or binding failed: failed to bind rank 3");

        let e: PoolError = ConfigError::FunctorExecuting.into();
        assert!(e.to_string().contains("functor is executing"));
    }

    #[test]
    fn test_error_conversion() {
        let err: PoolError = TopologyError::InsufficientCapacity {
            requested: 8,
            available: 4,
        }
        .into();
        assert!(matches!(
            err,
            PoolError::Topology(TopologyError::InsufficientCapacity { requested: 8, available: 4 })
        ));
    }
}
