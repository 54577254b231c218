//! Threads within a process
//!
//! Creation, join, detach, exit and cooperative interruption of the thread
//! records a process owns. Thread ids are only meaningful inside the calling
//! process: a tid belonging to another process is reported as unknown.

use alloc::sync::Arc;
use core::fmt;

use super::ptcb::ProcessThread;
use super::thread::ThreadState;
use super::{Task, ThreadId};
use crate::kernel::Kernel;
use crate::process::{ProcessId, ProcessManager};
use crate::sync::KernelGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// No such thread in the calling process
    InvalidTid,
    /// A thread tried to join itself
    SelfJoin,
    /// Detached, or its exit value was already collected
    NotJoinable,
    /// No backing thread could be created
    ResourceExhausted,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidTid => write!(f, "no such thread in this process"),
            ThreadError::SelfJoin => write!(f, "a thread cannot join itself"),
            ThreadError::NotJoinable => write!(f, "thread is not joinable"),
            ThreadError::ResourceExhausted => write!(f, "cannot create thread"),
        }
    }
}

impl Kernel {
    /// Start a joinable thread in the calling process
    ///
    /// `args` is shared with the caller, not copied.
    pub fn spawn_thread(&self, task: Task, args: Option<Arc<[u8]>>) -> Result<ThreadId, ThreadError> {
        let pid = self.current_pid();
        let mut state = self.lock();

        if state.process(pid).is_none() {
            return Err(ThreadError::InvalidTid);
        }
        let tid = self.spawn_backing(pid, "thread", false).map_err(|err| {
            log::warn!("spawn_thread: no backing thread in process {}: {:?}", pid, err);
            ThreadError::ResourceExhausted
        })?;
        if let Some(process) = state.process_mut(pid) {
            process.threads.push(ProcessThread::new(tid, task, args));
        }
        drop(state);

        log::debug!("process {} spawned thread {}", pid, tid);
        self.sched.wake(tid);
        Ok(tid)
    }

    pub fn current_tid(&self) -> ThreadId {
        self.sched.current_thread_id()
    }

    /// Wait for `tid` to finish and collect its exit value
    pub fn join_thread(&self, tid: ThreadId) -> Result<i32, ThreadError> {
        let pid = self.current_pid();
        if tid == self.current_tid() {
            return Err(ThreadError::SelfJoin);
        }
        let mut state = self.lock();

        {
            let ptcb = thread_record(&mut state, pid, tid)?;
            if !ptcb.joinable {
                return Err(ThreadError::NotJoinable);
            }
            if ptcb.done {
                return take_exit_value(ptcb);
            }
            ptcb.joiners += 1;
        }
        log::debug!("thread {} joining {}", self.current_tid(), tid);

        loop {
            let ptcb = thread_record(&mut state, pid, tid)?;
            if !ptcb.joinable || ptcb.done {
                break;
            }
            state = self.wait(state, |manager| {
                manager
                    .process_mut(pid)
                    .and_then(|process| process.thread_mut(tid))
                    .map(|ptcb| &mut ptcb.join_cond)
            });
        }

        let ptcb = thread_record(&mut state, pid, tid)?;
        if ptcb.detached {
            return Err(ThreadError::NotJoinable);
        }
        ptcb.joiners = ptcb.joiners.saturating_sub(1);
        take_exit_value(ptcb)
    }

    /// Give up the right to join `tid`, failing anyone already waiting
    pub fn detach_thread(&self, tid: ThreadId) -> Result<(), ThreadError> {
        let pid = self.current_pid();
        let mut state = self.lock();

        let ptcb = thread_record(&mut state, pid, tid)?;
        if !ptcb.joinable {
            return Err(ThreadError::NotJoinable);
        }
        ptcb.joinable = false;
        ptcb.detached = true;
        ptcb.joiners = 0;
        ptcb.join_cond.broadcast(&self.sched);

        log::debug!("thread {} detached", tid);
        Ok(())
    }

    /// Finish the calling thread with `exit_value`
    ///
    /// The last unfinished thread of a process takes the whole process down
    /// with it, exactly as [`Kernel::terminate_process`] would. Never
    /// returns.
    pub fn exit_thread(&self, exit_value: i32) -> ! {
        let pid = self.current_pid();
        let me = self.current_tid();
        let state = self.lock();

        let last = state
            .process(pid)
            .map_or(false, |process| process.unfinished_threads() <= 1);
        if last {
            drop(state);
            self.terminate_process(exit_value)
        }
        self.finish_thread(state, pid, me, exit_value)
    }

    /// Mark the caller's record done and leave the CPU for good
    pub(crate) fn finish_thread(
        &self,
        mut state: KernelGuard<'_, ProcessManager>,
        pid: ProcessId,
        me: ThreadId,
        exit_value: i32,
    ) -> ! {
        if let Some(process) = state.process_mut(pid) {
            if let Some(ptcb) = process.thread_mut(me) {
                if ptcb.publish_exit(exit_value) {
                    ptcb.join_cond.broadcast(&self.sched);
                }
                ptcb.done = true;
            }
            process.thread_exit.broadcast(&self.sched);
        }
        drop(state);

        log::debug!("thread {} of process {} exited with {}", me, pid, exit_value);
        self.sched.exit_current()
    }

    /// Set the interrupt flag of `tid`, waking it if it is blocked
    pub fn interrupt_thread(&self, tid: ThreadId) -> Result<(), ThreadError> {
        let pid = self.current_pid();
        let mut state = self.lock();

        let ptcb = thread_record(&mut state, pid, tid)?;
        ptcb.interrupted = true;
        if self.sched.thread_state(tid) == Some(ThreadState::Stopped) {
            self.sched.wake(tid);
        }

        log::debug!("thread {} interrupted", tid);
        Ok(())
    }

    pub fn is_interrupted(&self) -> bool {
        let pid = self.current_pid();
        let me = self.current_tid();
        let mut state = self.lock();
        thread_record(&mut state, pid, me).map_or(false, |ptcb| ptcb.interrupted)
    }

    pub fn clear_interrupt(&self) {
        let pid = self.current_pid();
        let me = self.current_tid();
        let mut state = self.lock();
        if let Ok(ptcb) = thread_record(&mut state, pid, me) {
            ptcb.interrupted = false;
        }
    }

    /// Block until the calling thread's interrupt flag is set
    ///
    /// Returns at once if it already is. The flag is left set.
    pub fn park(&self) {
        let pid = self.current_pid();
        let me = self.current_tid();
        loop {
            {
                let mut state = self.lock();
                match thread_record(&mut state, pid, me) {
                    Ok(ptcb) if !ptcb.interrupted => {}
                    _ => return,
                }
            }
            self.sched.sleep_current();
        }
    }
}

fn thread_record<'a>(
    state: &'a mut ProcessManager,
    pid: ProcessId,
    tid: ThreadId,
) -> Result<&'a mut ProcessThread, ThreadError> {
    state
        .process_mut(pid)
        .and_then(|process| process.thread_mut(tid))
        .ok_or(ThreadError::InvalidTid)
}

/// Hand out a finished record's exit value; the last joiner out closes it
fn take_exit_value(ptcb: &mut ProcessThread) -> Result<i32, ThreadError> {
    let exit_value = ptcb.exit_value.ok_or(ThreadError::NotJoinable)?;
    if ptcb.joiners == 0 {
        ptcb.joinable = false;
    }
    Ok(exit_value)
}
