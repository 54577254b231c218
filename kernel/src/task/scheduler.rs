//! Cooperative uniprocessor dispatcher
//!
//! Every kernel thread is backed by a host thread, but only the thread that
//! currently owns the CPU runs kernel or task code; every other backing
//! thread is parked. Control moves only at explicit points: a yield, a sleep
//! or a terminal exit. The host thread that creates the dispatcher becomes
//! the idle thread and runs [`Scheduler::run_idle`].

use super::thread::{Thread, ThreadId, ThreadIdAllocator, ThreadState};
use crate::process::ProcessId;
use alloc::{boxed::Box, collections::BTreeMap, format, string::String, sync::Arc, vec::Vec};
use core::fmt;
use crossbeam_queue::SegQueue;
use spin::{Mutex, MutexGuard};
use std::panic::{self, AssertUnwindSafe};

/// Unwind payload used to leave a thread through [`Scheduler::exit_current`]
struct ThreadExit;

/// Why the idle loop stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Threads remain but none of them can ever become runnable
    Stalled(Vec<ThreadId>),
    /// A thread panicked while holding the CPU
    Panicked { tid: ThreadId, message: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Stalled(tids) => write!(f, "no runnable threads, blocked: {:?}", tids),
            DispatchError::Panicked { tid, message } => write!(f, "thread {} panicked: {}", tid, message),
        }
    }
}

#[derive(Debug)]
pub enum SpawnError {
    /// The host refused to create a backing thread
    HostThread,
}

struct SchedulerState {
    /// Threads that have not exited yet
    threads: BTreeMap<ThreadId, Thread>,
    /// Thread holding the CPU
    current: ThreadId,
    /// First fault reported by a panicking thread
    fault: Option<DispatchError>,
}

pub struct Scheduler {
    state: Mutex<SchedulerState>,
    /// Threads in state Ready, in FIFO order
    ready_queue: SegQueue<ThreadId>,
    ids: ThreadIdAllocator,
}

impl Scheduler {
    /// Create a dispatcher whose idle thread is the calling host thread
    pub fn new(idle_owner: ProcessId) -> Self {
        let mut idle = Thread::new(
            ThreadId::IDLE,
            String::from("idle"),
            idle_owner,
            std::thread::current(),
        );
        idle.set_running();

        let mut threads = BTreeMap::new();
        threads.insert(ThreadId::IDLE, idle);

        Scheduler {
            state: Mutex::new(SchedulerState {
                threads,
                current: ThreadId::IDLE,
                fault: None,
            }),
            ready_queue: SegQueue::new(),
            ids: ThreadIdAllocator::new(),
        }
    }

    /// Create a thread in state Init
    ///
    /// The thread does not run until [`Scheduler::wake`] makes it runnable.
    /// `entry` must leave through [`Scheduler::exit_current`].
    pub fn spawn(
        self: &Arc<Self>,
        owner: ProcessId,
        name: &str,
        entry: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<ThreadId, SpawnError> {
        let tid = self.ids.allocate();
        let sched = Arc::clone(self);

        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", name, tid))
            .spawn(move || sched.thread_main(tid, entry))
            .map_err(|_| SpawnError::HostThread)?;

        let thread = Thread::new(tid, String::from(name), owner, handle.thread().clone());
        self.state.lock().threads.insert(tid, thread);

        log::trace!("spawned thread {} '{}' in process {}", tid, name, owner);
        Ok(tid)
    }

    fn thread_main(&self, tid: ThreadId, entry: Box<dyn FnOnce() + Send + 'static>) {
        self.wait_for_cpu(tid);

        let message = match panic::catch_unwind(AssertUnwindSafe(entry)) {
            Ok(()) => String::from("thread entry returned without exiting"),
            Err(payload) if payload.is::<ThreadExit>() => return self.retire(tid),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.fault(tid, message);
    }

    /// Make a thread in state Init or Stopped runnable
    ///
    /// Returns false if the thread is unknown or not waiting to run.
    pub fn wake(&self, tid: ThreadId) -> bool {
        let mut state = self.state.lock();
        match state.threads.get_mut(&tid) {
            Some(thread) if matches!(thread.state, ThreadState::Init | ThreadState::Stopped) => {
                thread.set_ready();
                self.ready_queue.push(tid);
                true
            }
            _ => false,
        }
    }

    /// Give up the CPU, staying runnable
    pub fn yield_now(&self) {
        let me = self.current_thread_id();
        if self.switch_away(me, ThreadState::Ready) {
            self.wait_for_cpu(me);
        }
    }

    /// Block the current thread until someone wakes it
    pub fn sleep_current(&self) {
        let me = self.current_thread_id();
        if self.switch_away(me, ThreadState::Stopped) {
            self.wait_for_cpu(me);
        }
    }

    /// Terminate the current thread
    ///
    /// The thread's stack unwinds while it still holds the CPU; only then is
    /// its record dropped and the CPU handed on.
    pub fn exit_current(&self) -> ! {
        let me = self.current_thread_id();
        assert_ne!(me, ThreadId::IDLE, "the idle thread cannot exit");

        panic::resume_unwind(Box::new(ThreadExit))
    }

    pub fn current_thread_id(&self) -> ThreadId {
        self.state.lock().current
    }

    /// Process owning the thread that holds the CPU
    pub fn current_owner(&self) -> ProcessId {
        let state = self.state.lock();
        state
            .threads
            .get(&state.current)
            .map(|thread| thread.owner)
            .unwrap_or(ProcessId::IDLE)
    }

    pub fn thread_state(&self, tid: ThreadId) -> Option<ThreadState> {
        self.state.lock().threads.get(&tid).map(|thread| thread.state)
    }

    #[cfg(test)]
    fn thread_count(&self) -> usize {
        self.state.lock().threads.len()
    }

    /// Whether the caller is the host thread backing idle
    pub fn on_idle_host(&self) -> bool {
        let state = self.state.lock();
        state
            .threads
            .get(&ThreadId::IDLE)
            .map_or(false, |idle| idle.host.id() == std::thread::current().id())
    }

    /// Dispatch ready threads until the system drains
    ///
    /// Must run on the idle host thread. Returns once no thread is runnable:
    /// `Ok` if every thread has exited, otherwise the reason.
    pub fn run_idle(&self) -> Result<(), DispatchError> {
        loop {
            if let Some(fault) = self.state.lock().fault.take() {
                return Err(fault);
            }

            if self.switch_away(ThreadId::IDLE, ThreadState::Running) {
                self.wait_for_cpu(ThreadId::IDLE);
                continue;
            }

            let state = self.state.lock();
            let blocked: Vec<ThreadId> = state
                .threads
                .values()
                .filter(|thread| thread.id != ThreadId::IDLE)
                .map(|thread| thread.id)
                .collect();

            return if blocked.is_empty() {
                Ok(())
            } else {
                log::warn!("dispatcher stalled, blocked threads: {:?}", blocked);
                Err(DispatchError::Stalled(blocked))
            };
        }
    }

    fn pick_next(&self, state: &SchedulerState) -> ThreadId {
        while let Some(tid) = self.ready_queue.pop() {
            // Skip entries whose thread stopped being Ready
            if state.threads.get(&tid).map_or(false, |t| t.state == ThreadState::Ready) {
                return tid;
            }
        }
        ThreadId::IDLE
    }

    /// Put `me` into `new_state` and hand the CPU to the next ready thread
    ///
    /// Returns true if another thread now holds the CPU.
    fn switch_away(&self, me: ThreadId, new_state: ThreadState) -> bool {
        let mut state = self.state.lock();
        if let Some(thread) = state.threads.get_mut(&me) {
            thread.state = new_state;
        }
        if new_state == ThreadState::Ready && me != ThreadId::IDLE {
            self.ready_queue.push(me);
        }
        self.hand_off(state, me)
    }

    /// Forget a thread whose entry has fully unwound and pass the CPU on
    fn retire(&self, tid: ThreadId) {
        let mut state = self.state.lock();
        state.threads.remove(&tid);
        log::trace!("thread {} retired", tid);
        self.hand_off(state, tid);
    }

    fn hand_off(&self, mut state: MutexGuard<'_, SchedulerState>, me: ThreadId) -> bool {
        let next = self.pick_next(&state);
        state.current = next;
        let host = match state.threads.get_mut(&next) {
            Some(thread) => {
                thread.set_running();
                if next == me {
                    return false;
                }
                thread.host.clone()
            }
            None => return false,
        };
        drop(state);

        log::trace!("switch {} -> {}", me, next);
        host.unpark();
        true
    }

    fn wait_for_cpu(&self, me: ThreadId) {
        loop {
            if self.state.lock().current == me {
                return;
            }
            std::thread::park();
        }
    }

    /// Record a panic in the running thread and return the CPU to idle
    fn fault(&self, tid: ThreadId, message: String) {
        log::error!("thread {} panicked: {}", tid, message);

        let idle = {
            let mut state = self.state.lock();
            state.threads.remove(&tid);
            if state.fault.is_none() {
                state.fault = Some(DispatchError::Panicked { tid, message });
            }
            state.current = ThreadId::IDLE;
            match state.threads.get_mut(&ThreadId::IDLE) {
                Some(idle) => {
                    idle.set_running();
                    idle.host.clone()
                }
                None => return,
            }
        };
        idle.unpark();
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        String::from(*message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
