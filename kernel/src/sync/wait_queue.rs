use alloc::collections::VecDeque;
#[cfg(test)]
use alloc::vec::Vec;

use crate::task::scheduler::Scheduler;
use crate::task::ThreadId;

/// Threads waiting for a condition, in arrival order
///
/// Condition-variable semantics without the lock: the queue lives inside
/// lock-protected state, so it is only touched under the kernel lock.
/// Wake-ups are always broadcasts; every waiter re-checks its predicate.
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: VecDeque<ThreadId>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            waiters: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, tid: ThreadId) {
        if !self.waiters.contains(&tid) {
            self.waiters.push_back(tid);
        }
    }

    /// Drop `tid` from the queue if it is still there
    pub fn remove(&mut self, tid: ThreadId) {
        self.waiters.retain(|&waiter| waiter != tid);
    }

    /// Take every waiter, leaving the queue empty
    #[cfg(test)]
    pub fn take_all(&mut self) -> Vec<ThreadId> {
        self.waiters.drain(..).collect()
    }

    /// Make every waiter runnable
    pub fn broadcast(&mut self, sched: &Scheduler) {
        for tid in self.waiters.drain(..) {
            sched.wake(tid);
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }
}
