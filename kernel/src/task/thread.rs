//! Dispatcher-level thread records
//!
//! A [`Thread`] is what the dispatcher knows about a kernel thread: its id,
//! owning process, scheduling state and the host thread that backs it.
//! Per-process bookkeeping (join, detach, interrupt) lives one level up in
//! [`super::ptcb::ProcessThread`].

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use alloc::string::String;

use crate::process::ProcessId;

/// Thread ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// The idle thread, backed by the host thread that booted the kernel
    pub const IDLE: ThreadId = ThreadId(0);

    pub const fn new(id: u64) -> Self {
        ThreadId(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for thread ids, one per dispatcher
pub(crate) struct ThreadIdAllocator {
    next: AtomicU64,
}

impl ThreadIdAllocator {
    pub(crate) const fn new() -> Self {
        // 0 is the idle thread
        ThreadIdAllocator { next: AtomicU64::new(1) }
    }

    pub(crate) fn allocate(&self) -> ThreadId {
        ThreadId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Thread states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but never made runnable
    Init,
    /// Runnable and sitting in the ready queue
    Ready,
    /// Holding the CPU
    Running,
    /// Blocked until woken
    Stopped,
}

pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    /// Process the thread executes in
    pub owner: ProcessId,
    pub state: ThreadState,
    /// Host thread to unpark when this thread is dispatched
    pub(crate) host: std::thread::Thread,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, name: String, owner: ProcessId, host: std::thread::Thread) -> Self {
        Thread {
            id,
            name,
            owner,
            state: ThreadState::Init,
            host,
        }
    }

    pub fn set_ready(&mut self) {
        self.state = ThreadState::Ready;
    }

    pub fn set_running(&mut self) {
        self.state = ThreadState::Running;
    }
}
