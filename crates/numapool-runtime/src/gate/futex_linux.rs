//! Linux futex-based sleep gate
//!
//! Futex word semantics:
//! - 0 = closed, waiters block
//! - 1 = open
//!
//! `open()` stores 1 then issues FUTEX_WAKE for every waiter. A waiter that
//! races with `open()` sees the changed word and FUTEX_WAIT returns EAGAIN
//! immediately.

use super::SleepGate;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;

/// Linux futex-based gate
pub struct FutexGate {
    word: AtomicU32,
    waiting: AtomicUsize,
}

impl FutexGate {
    pub fn new() -> Self {
        Self {
            word: AtomicU32::new(OPEN),
            waiting: AtomicUsize::new(0),
        }
    }
}

impl Default for FutexGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepGate for FutexGate {
    fn close(&self) {
        self.word.store(CLOSED, Ordering::Release);
    }

    fn open(&self) {
        // SeqCst pairs with the waiter's increment-then-check
        self.word.store(OPEN, Ordering::SeqCst);
        if self.waiting.load(Ordering::SeqCst) == 0 {
            return;
        }
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn is_open(&self) -> bool {
        self.word.load(Ordering::Acquire) == OPEN
    }

    fn wait_open(&self, timeout: Duration) -> bool {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        if self.word.load(Ordering::SeqCst) != OPEN {
            let ts = libc::timespec {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_nsec: timeout.subsec_nanos() as libc::c_long,
            };
            // Return value ignored: ETIMEDOUT, EAGAIN and EINTR all mean
            // "re-check the word".
            unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    self.word.as_ptr(),
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    CLOSED,
                    &ts as *const libc::timespec,
                    std::ptr::null::<u32>(),
                    0u32,
                );
            }
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        self.is_open()
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}
