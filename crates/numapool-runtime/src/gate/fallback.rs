//! Fallback sleep gate using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::SleepGate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Condvar-based gate
pub struct CondvarGate {
    /// true = open
    state: Mutex<bool>,
    condvar: Condvar,
    waiting: AtomicUsize,
}

impl CondvarGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(true),
            condvar: Condvar::new(),
            waiting: AtomicUsize::new(0),
        }
    }
}

impl Default for CondvarGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepGate for CondvarGate {
    fn close(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn open(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }

    fn is_open(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_open(&self, timeout: Duration) -> bool {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
        let open = *guard;
        drop(guard);
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        open
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}
