//! Sleep gate for parked workers
//!
//! While the pool sleeps every worker is blocked on a shared gate instead of
//! spinning on its state word. `wake()` opens the gate and all waiters return.
//! Platform-specific implementations use the cheapest primitive available.

use std::time::Duration;

/// Gate shared by the master and every worker
///
/// The master calls `close()` before putting workers to sleep and `open()`
/// to release them. Workers call `wait_open()` in a loop until it reports
/// the gate is open.
pub trait SleepGate: Send + Sync {
    /// Block future `wait_open` callers
    fn close(&self);

    /// Release every waiter
    fn open(&self);

    /// Current gate state
    fn is_open(&self) -> bool;

    /// Wait until the gate opens or `timeout` elapses.
    ///
    /// Returns `true` if the gate was open on return. Spurious returns are
    /// allowed; callers re-check.
    fn wait_open(&self, timeout: Duration) -> bool;

    /// Threads currently inside `wait_open` (hint, may be stale)
    fn waiting(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexGate as PlatformGate;
        #[cfg(test)]
        mod fallback;
    } else {
        mod fallback;
        pub use fallback::CondvarGate as PlatformGate;
    }
}

/// Create a new platform-appropriate gate, initially open
pub fn new_gate() -> Box<dyn SleepGate> {
    Box::new(PlatformGate::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_open_gate_does_not_block() {
        let gate = new_gate();
        assert!(gate.is_open());
        let start = Instant::now();
        assert!(gate.wait_open(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_closed_gate_times_out() {
        let gate = new_gate();
        gate.close();
        let start = Instant::now();
        assert!(!gate.wait_open(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(gate.waiting(), 0);
    }

    #[test]
    fn test_open_releases_waiters() {
        let gate = Arc::new(PlatformGate::new());
        gate.close();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    while !gate.wait_open(Duration::from_secs(10)) {}
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        gate.open();
        for h in handles {
            h.join().unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
