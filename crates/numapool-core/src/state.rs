//! Per-thread dispatch state

use core::fmt;

/// State of one pool thread
///
/// Transitions:
/// ```text
///            master publishes work
///   Inactive ---------------------> Active
///      ^                              |
///      +------------------------------+
///          owning thread finished
///
///   Inactive ---------------------> Terminating   (master, during finalize)
/// ```
/// Only the owning thread moves Active -> Inactive; only the master moves a
/// thread out of Inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Idle, waiting for the master to publish work
    Inactive = 0,

    /// Executing (or about to execute) the published work item
    Active = 1,

    /// Asked to leave its work loop
    Terminating = 2,
}

impl ThreadState {
    #[inline]
    pub const fn is_idle(&self) -> bool {
        matches!(self, ThreadState::Inactive)
    }
}

impl From<u8> for ThreadState {
    fn from(v: u8) -> Self {
        match v {
            0 => ThreadState::Inactive,
            1 => ThreadState::Active,
            _ => ThreadState::Terminating,
        }
    }
}

impl From<ThreadState> for u8 {
    fn from(state: ThreadState) -> u8 {
        state as u8
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Inactive => write!(f, "inactive"),
            ThreadState::Active => write!(f, "active"),
            ThreadState::Terminating => write!(f, "terminating"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_roundtrip_and_idle() {
        for s in [ThreadState::Inactive, ThreadState::Active, ThreadState::Terminating] {
            assert_eq!(ThreadState::from(u8::from(s)), s);
        }
        assert!(ThreadState::Inactive.is_idle());
        assert!(!ThreadState::Active.is_idle());
        assert_eq!(ThreadState::from(200), ThreadState::Terminating);
    }
}
