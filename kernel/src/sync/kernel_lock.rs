//! The global kernel lock
//!
//! Kernel threads only give up the CPU at explicit points, so the lock is
//! never held across a switch: waits release it before sleeping and the
//! terminal exit releases it before leaving. Contention therefore means the
//! holder is parked, and the caller yields until it can proceed.

use spin::{Mutex, MutexGuard};

use super::WaitQueue;
use crate::task::scheduler::Scheduler;

pub type KernelGuard<'a, T> = MutexGuard<'a, T>;

pub struct KernelLock<T> {
    inner: Mutex<T>,
}

impl<T> KernelLock<T> {
    pub const fn new(value: T) -> Self {
        KernelLock {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, yielding the CPU while another thread holds it
    pub fn lock<'a>(&'a self, sched: &Scheduler) -> KernelGuard<'a, T> {
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return guard;
            }
            sched.yield_now();
        }
    }

    /// Sleep on the queue chosen by `select` with the lock released
    ///
    /// The caller is enqueued under the lock, so no broadcast between the
    /// check and the sleep is lost. On return the lock is held again and the
    /// caller is no longer queued, whether it was woken by a broadcast or
    /// forced runnable. Callers re-check their predicate in a loop.
    pub fn wait<'a, F>(&'a self, sched: &Scheduler, mut guard: KernelGuard<'a, T>, select: F) -> KernelGuard<'a, T>
    where
        F: Fn(&mut T) -> Option<&mut WaitQueue>,
    {
        let me = sched.current_thread_id();
        if let Some(queue) = select(&mut *guard) {
            queue.enqueue(me);
        }
        drop(guard);

        sched.sleep_current();

        let mut guard = self.lock(sched);
        if let Some(queue) = select(&mut *guard) {
            queue.remove(me);
        }
        guard
    }
}
