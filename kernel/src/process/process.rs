//! Process control records

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use crate::ipc::FdTable;
use crate::sync::WaitQueue;
use crate::task::ptcb::ProcessThread;
use crate::task::ThreadId;

/// Process ID type: the index of the record in the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// The idle process, always the first allocated
    pub const IDLE: ProcessId = ProcessId(0);
    /// The init process, which adopts orphans
    pub const INIT: ProcessId = ProcessId(1);

    pub const fn new(id: u32) -> Self {
        ProcessId(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// pid 0 and 1 never have a parent
    pub const fn is_parentless(self) -> bool {
        self.0 <= 1
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is on the free list
    Free,
    /// Process is running
    Alive,
    /// Process has terminated and waits to be reaped
    Zombie,
}

pub struct Process {
    pub id: ProcessId,

    pub state: ProcessState,

    /// Parent process ID (None for pid 0 and 1)
    pub parent: Option<ProcessId>,

    /// Live and zombie children not yet reaped
    pub children: Vec<ProcessId>,

    /// Children that became zombies, oldest first
    pub exited: VecDeque<ProcessId>,

    /// Thread records owned by this process, in creation order
    pub threads: Vec<ProcessThread>,

    /// Thread running the process's entry task
    pub main_thread: Option<ThreadId>,

    /// Exit value (meaningful once Zombie)
    pub exit_value: i32,

    /// Set by the first thread to start process-wide termination
    pub exit_in_progress: bool,

    /// Signaled when a child becomes a zombie or zombies are handed over
    pub child_exit: WaitQueue,

    /// Signaled when one of this process's thread records becomes done
    pub thread_exit: WaitQueue,

    pub fd_table: FdTable,
}

impl Process {
    /// A record in the Free state
    pub fn new(id: ProcessId, max_fileid: usize) -> Self {
        Process {
            id,
            state: ProcessState::Free,
            parent: None,
            children: Vec::new(),
            exited: VecDeque::new(),
            threads: Vec::new(),
            main_thread: None,
            exit_value: 0,
            exit_in_progress: false,
            child_exit: WaitQueue::new(),
            thread_exit: WaitQueue::new(),
            fd_table: FdTable::new(max_fileid),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == ProcessState::Alive
    }

    pub fn is_zombie(&self) -> bool {
        self.state == ProcessState::Zombie
    }

    pub fn add_child(&mut self, child_id: ProcessId) {
        self.children.push(child_id);
    }

    /// Unlink a child from both the children and exited collections
    pub fn remove_child(&mut self, child_id: ProcessId) {
        self.children.retain(|&id| id != child_id);
        self.exited.retain(|&id| id != child_id);
    }

    pub fn thread(&self, tid: ThreadId) -> Option<&ProcessThread> {
        self.threads.iter().find(|ptcb| ptcb.tid == tid)
    }

    pub fn thread_mut(&mut self, tid: ThreadId) -> Option<&mut ProcessThread> {
        self.threads.iter_mut().find(|ptcb| ptcb.tid == tid)
    }

    /// Number of thread records that are not done
    pub fn unfinished_threads(&self) -> usize {
        self.threads.iter().filter(|ptcb| !ptcb.done).count()
    }

    /// Unfinished thread records other than `tid`
    pub fn unfinished_threads_except(&self, tid: ThreadId) -> usize {
        self.threads
            .iter()
            .filter(|ptcb| !ptcb.done && ptcb.tid != tid)
            .count()
    }
}
