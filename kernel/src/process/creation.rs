//! Process creation
//!
//! A new process takes a slot from the table, joins the hierarchy under the
//! calling process and shares its open streams. When given a task it gets a
//! main thread, whose return or last exit ends the whole process.

use alloc::sync::Arc;

use super::{ProcessError, ProcessId};
use crate::kernel::Kernel;
use crate::task::ptcb::ProcessThread;
use crate::task::Task;

impl Kernel {
    /// Create a process running `task` with a private copy of `args`
    ///
    /// pid 0 and 1 are created parentless; every later process becomes a
    /// child of the caller. Without a task the process has no threads,
    /// which is only meaningful for the idle process.
    pub fn create_process(&self, task: Option<Task>, args: Option<&[u8]>) -> Result<ProcessId, ProcessError> {
        let parent = self.current_pid();
        let mut state = self.lock();

        let pid = match state.allocate() {
            Some(pid) => pid,
            None => {
                log::warn!("create_process: no free process slot");
                return Err(ProcessError::ResourceExhausted);
            }
        };

        let main = match task {
            Some(task) => {
                let tid = match self.spawn_backing(pid, "main", true) {
                    Ok(tid) => tid,
                    Err(err) => {
                        log::warn!("create_process: no backing thread for pid {}: {:?}", pid, err);
                        state.release(pid);
                        return Err(ProcessError::ResourceExhausted);
                    }
                };
                let args = args.map(Arc::<[u8]>::from);
                if let Some(process) = state.process_mut(pid) {
                    process.threads.push(ProcessThread::new(tid, task, args));
                    process.main_thread = Some(tid);
                }
                Some(tid)
            }
            None => None,
        };

        if pid.is_parentless() {
            log::info!("created process {}", pid);
        } else {
            state.link_child(parent, pid);
            log::info!("created process {} (parent {})", pid, parent);
        }
        drop(state);

        if let Some(tid) = main {
            self.sched.wake(tid);
        }
        Ok(pid)
    }

    /// The process the calling thread belongs to
    pub fn current_pid(&self) -> ProcessId {
        self.sched.current_owner()
    }

    /// Parent of the calling process; None for pid 0 and 1
    pub fn parent_pid(&self) -> Option<ProcessId> {
        let pid = self.current_pid();
        self.lock().process(pid).and_then(|process| process.parent)
    }
}
