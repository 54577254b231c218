//! Process manager - the state guarded by the kernel lock
//!
//! Owns the process table and maintains the hierarchy links between its
//! records. Parent and child links are pids, never references; only the
//! table owns the records themselves.

use alloc::vec::Vec;
use core::mem;

use super::pool::ProcessTable;
use super::{Process, ProcessId, ProcessInfo};
use crate::task::scheduler::Scheduler;

pub struct ProcessManager {
    table: ProcessTable,
}

impl ProcessManager {
    pub fn new(max_proc: usize, max_fileid: usize) -> Self {
        ProcessManager {
            table: ProcessTable::new(max_proc, max_fileid),
        }
    }

    /// Take a free slot; the new record is Alive and parentless
    pub fn allocate(&mut self) -> Option<ProcessId> {
        self.table.acquire()
    }

    pub fn release(&mut self, pid: ProcessId) {
        self.table.release(pid);
    }

    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.table.get(pid)
    }

    pub fn process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.table.get_mut(pid)
    }

    pub fn in_range(&self, pid: ProcessId) -> bool {
        self.table.in_range(pid)
    }

    /// Make `child` a child of `parent`, sharing the parent's open handles
    pub fn link_child(&mut self, parent: ProcessId, child: ProcessId) {
        let fd_table = match self.table.get_mut(parent) {
            Some(process) => {
                process.add_child(child);
                process.fd_table.inherit()
            }
            None => {
                log::error!("link of pid {} to missing parent {}", child, parent);
                return;
            }
        };

        if let Some(process) = self.table.get_mut(child) {
            process.parent = Some(parent);
            process.fd_table = fd_table;
        }
    }

    /// Collect a zombie child: unlink it from `parent` and free its slot
    pub fn reap(&mut self, parent: ProcessId, child: ProcessId) -> i32 {
        let exit_value = self
            .table
            .get(child)
            .map_or(0, |process| process.exit_value);

        if let Some(process) = self.table.get_mut(parent) {
            process.remove_child(child);
        }
        self.table.release(child);

        log::info!("process {} reaped by {}, exit value {}", child, parent, exit_value);
        exit_value
    }

    /// Hand every child of `pid` over to init, zombies included
    pub fn adopt_orphans(&mut self, pid: ProcessId, sched: &Scheduler) {
        if pid == ProcessId::INIT {
            return;
        }

        let (children, exited) = match self.table.get_mut(pid) {
            Some(process) => (
                mem::take(&mut process.children),
                mem::take(&mut process.exited),
            ),
            None => return,
        };
        if children.is_empty() {
            return;
        }

        for &child in &children {
            if let Some(process) = self.table.get_mut(child) {
                process.parent = Some(ProcessId::INIT);
            }
        }

        match self.table.get_mut(ProcessId::INIT) {
            Some(init) => {
                log::debug!(
                    "init adopts {} children of process {} ({} zombies)",
                    children.len(),
                    pid,
                    exited.len()
                );
                init.children.extend(children);
                init.exited.extend(exited);
                init.child_exit.broadcast(sched);
            }
            None => log::error!("no init process to adopt children of {}", pid),
        }
    }

    /// Queue `pid` on its parent's exited list and wake the parent's waiters
    pub fn notify_parent(&mut self, pid: ProcessId, sched: &Scheduler) {
        let parent = match self.table.get(pid).and_then(|process| process.parent) {
            Some(parent) => parent,
            None => return,
        };

        if let Some(process) = self.table.get_mut(parent) {
            process.exited.push_back(pid);
            process.child_exit.broadcast(sched);
        }
    }

    /// Number of occupied slots, zombies included
    pub fn count(&self) -> usize {
        self.table.live_count()
    }

    pub fn info(&self, pid: ProcessId) -> Option<ProcessInfo> {
        self.table.get(pid).map(ProcessInfo::from)
    }

    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        self.table.iter().map(ProcessInfo::from).collect()
    }
}
