//! Per-process thread records
//!
//! Each [`ProcessThread`] sits on top of exactly one dispatcher thread and
//! carries what the process needs to manage it: the task and its argument
//! buffer, the join/detach bookkeeping and the cooperative interrupt flag.

use alloc::sync::Arc;
use core::fmt;

use super::ThreadId;
use crate::kernel::Kernel;
use crate::sync::WaitQueue;

type TaskFn = dyn Fn(&Kernel, Option<Arc<[u8]>>) -> i32 + Send + Sync;

/// Entry point of a process or thread
///
/// The task receives the kernel handle for making calls and the argument
/// buffer of its thread record; its return value becomes the exit value.
#[derive(Clone)]
pub struct Task(Arc<TaskFn>);

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Kernel, Option<Arc<[u8]>>) -> i32 + Send + Sync + 'static,
    {
        Task(Arc::new(f))
    }

    pub fn call(&self, kernel: &Kernel, args: Option<Arc<[u8]>>) -> i32 {
        (self.0)(kernel, args)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

pub struct ProcessThread {
    /// Dispatcher thread this record manages
    pub tid: ThreadId,

    pub task: Task,

    /// Argument buffer; dropped when the record is reclaimed
    pub args: Option<Arc<[u8]>>,

    /// Whether the exit value may still be collected by a join
    pub joinable: bool,

    /// Threads currently blocked joining this one
    pub joiners: usize,

    /// Set exactly once, when the thread finishes
    pub done: bool,

    /// Set when a detach ended the record's joinability
    pub detached: bool,

    /// Cooperative interrupt flag
    pub interrupted: bool,

    /// Published exit value (set while joinable)
    pub exit_value: Option<i32>,

    /// Signaled when the thread finishes or is detached
    pub join_cond: WaitQueue,
}

impl ProcessThread {
    pub fn new(tid: ThreadId, task: Task, args: Option<Arc<[u8]>>) -> Self {
        ProcessThread {
            tid,
            task,
            args,
            joinable: true,
            joiners: 0,
            done: false,
            detached: false,
            interrupted: false,
            exit_value: None,
            join_cond: WaitQueue::new(),
        }
    }

    /// Whether a join on this record can still succeed
    pub fn can_join(&self) -> bool {
        self.joinable && !self.detached
    }

    /// Record the exit value for joiners, if anyone may still join
    pub fn publish_exit(&mut self, exit_value: i32) -> bool {
        if self.joinable {
            self.exit_value = Some(exit_value);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for ProcessThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessThread")
            .field("tid", &self.tid)
            .field("joinable", &self.joinable)
            .field("joiners", &self.joiners)
            .field("done", &self.done)
            .field("detached", &self.detached)
            .field("interrupted", &self.interrupted)
            .field("exit_value", &self.exit_value)
            .finish()
    }
}
