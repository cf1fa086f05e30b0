//! Work items handed to the pool
//!
//! A dispatch publishes a type-erased [`Job`] that borrows the caller's
//! kernel. The borrow is sound because every dispatch is synchronous: the
//! job is retired only after every rank went back to Inactive.

use crate::sync::ThreadContext;
use std::cell::Cell;

/// Kernel object run once per rank per dispatch
///
/// Closures taking a `&ThreadContext` are kernels too.
pub trait PoolKernel: Sync {
    fn execute_on_thread(&self, ctx: &ThreadContext<'_>);
}

impl<F> PoolKernel for F
where
    F: Fn(&ThreadContext<'_>) + Sync,
{
    #[inline]
    fn execute_on_thread(&self, ctx: &ThreadContext<'_>) {
        self(ctx)
    }
}

/// Type-erased kernel reference
pub(crate) struct Job {
    data: *const (),
    call: unsafe fn(*const (), &ThreadContext<'_>),
}

// SAFETY: `data` points at a `Sync` kernel that outlives the dispatch it is
// published for; the job itself is immutable.
unsafe impl Send for Job {}
unsafe impl Sync for Job {}

impl Job {
    pub(crate) fn new<F>(kernel: &F) -> Self
    where
        F: Fn(&ThreadContext<'_>) + Sync,
    {
        Self {
            data: (kernel as *const F).cast(),
            call: call_kernel::<F>,
        }
    }

    /// Job without kernel data
    pub(crate) const fn from_fn(call: unsafe fn(*const (), &ThreadContext<'_>)) -> Self {
        Self {
            data: std::ptr::null(),
            call,
        }
    }

    /// # Safety
    /// The kernel this job was built from must still be alive.
    #[inline]
    pub(crate) unsafe fn run(&self, ctx: &ThreadContext<'_>) {
        (self.call)(self.data, ctx)
    }
}

unsafe fn call_kernel<F>(data: *const (), ctx: &ThreadContext<'_>)
where
    F: Fn(&ThreadContext<'_>) + Sync,
{
    (*data.cast::<F>())(ctx)
}

thread_local! {
    /// Pool whose parallel region the current thread is in, 0 when none
    static CURRENT_POOL: Cell<u64> = const { Cell::new(0) };
}

/// Marks the current thread as inside a parallel region until dropped
pub(crate) struct RegionGuard {
    prev: u64,
}

pub(crate) fn enter_region(pool: u64) -> RegionGuard {
    RegionGuard {
        prev: CURRENT_POOL.with(|c| c.replace(pool)),
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        CURRENT_POOL.with(|c| c.set(self.prev));
    }
}

/// Id of the pool whose parallel region the calling thread is in
pub fn current_pool() -> Option<u64> {
    let id = CURRENT_POOL.with(Cell::get);
    (id != 0).then_some(id)
}
