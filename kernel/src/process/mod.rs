//! Process management
//!
//! Processes are records in a fixed-capacity table indexed by pid. This
//! module holds creation, the parent/child hierarchy, process-wide exit and
//! the wait/reap protocol; per-thread bookkeeping lives in [`crate::task`].

use core::fmt;

pub mod creation;
pub mod exit;
pub mod manager;
pub mod pool;
pub mod process;
pub mod wait;

pub use manager::ProcessManager;
pub use process::{Process, ProcessId, ProcessState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Out of range, or not a live or zombie process
    InvalidPid,
    /// The process exists but is not a child of the caller
    NotMyChild,
    /// The caller has no children to wait for
    NoChild,
    /// No free process slot, or no backing thread could be created
    ResourceExhausted,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::InvalidPid => write!(f, "invalid process id"),
            ProcessError::NotMyChild => write!(f, "not a child of the calling process"),
            ProcessError::NoChild => write!(f, "no child processes"),
            ProcessError::ResourceExhausted => write!(f, "no free process slots"),
        }
    }
}

/// Which child `wait_child` should collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// This specific child
    Pid(ProcessId),
    /// The child that became a zombie first
    Any,
}

/// Point-in-time view of one process record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub state: ProcessState,
    /// Thread records that have not finished
    pub threads: usize,
    /// Children not yet reaped, zombies included
    pub children: usize,
    /// Children that are zombies waiting to be reaped
    pub zombies: usize,
    pub open_fds: usize,
    /// Exit value, once the process is a zombie
    pub exit_value: Option<i32>,
}

impl From<&Process> for ProcessInfo {
    fn from(process: &Process) -> Self {
        ProcessInfo {
            pid: process.id,
            parent: process.parent,
            state: process.state,
            threads: process.unfinished_threads(),
            children: process.children.len(),
            zombies: process.exited.len(),
            open_fds: process.fd_table.open_count(),
            exit_value: process.is_zombie().then_some(process.exit_value),
        }
    }
}
