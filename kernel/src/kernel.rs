//! The kernel handle
//!
//! A [`Kernel`] ties the dispatcher to the process manager behind the single
//! kernel lock. Every operation a task can invoke is a method on it; they
//! are spread over the process and task modules next to the state they
//! manage.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;

use crate::config::KernelConfig;
use crate::ipc::{FdError, Fid, FileHandle};
use crate::process::{ProcessError, ProcessId, ProcessInfo, ProcessManager};
use crate::sync::{KernelGuard, KernelLock, WaitQueue};
use crate::task::scheduler::{DispatchError, Scheduler, SpawnError};
use crate::task::{Task, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    /// `boot` was called from a host thread other than the one that created the kernel
    WrongHost,
    /// The first process did not receive pid 0
    IdlePid(ProcessId),
    /// The second process did not receive pid 1
    InitPid(ProcessId),
    Spawn(ProcessError),
    /// Threads remained blocked with nothing left to run
    Stalled(Vec<ThreadId>),
    TaskPanicked { tid: ThreadId, message: String },
    /// The system drained but init never exited
    InitAlive,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::WrongHost => write!(f, "boot must run on the host thread that created the kernel"),
            BootError::IdlePid(pid) => write!(f, "idle process received pid {}, expected 0", pid),
            BootError::InitPid(pid) => write!(f, "init process received pid {}, expected 1", pid),
            BootError::Spawn(err) => write!(f, "failed to create boot process: {}", err),
            BootError::Stalled(tids) => write!(f, "system stalled with blocked threads {:?}", tids),
            BootError::TaskPanicked { tid, message } => write!(f, "thread {} panicked: {}", tid, message),
            BootError::InitAlive => write!(f, "init process did not exit"),
        }
    }
}

impl From<DispatchError> for BootError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Stalled(tids) => BootError::Stalled(tids),
            DispatchError::Panicked { tid, message } => BootError::TaskPanicked { tid, message },
        }
    }
}

pub struct Kernel {
    state: KernelLock<ProcessManager>,
    pub(crate) sched: Arc<Scheduler>,
    me: Weak<Kernel>,
    config: KernelConfig,
}

impl Kernel {
    /// Create a kernel; the calling host thread becomes its idle thread
    pub fn new(config: KernelConfig) -> Arc<Kernel> {
        Arc::new_cyclic(|me| Kernel {
            state: KernelLock::new(ProcessManager::new(config.max_proc, config.max_fileid)),
            sched: Arc::new(Scheduler::new(ProcessId::IDLE)),
            me: me.clone(),
            config,
        })
    }

    /// Create the idle and init processes and run until the system drains
    ///
    /// Returns the exit value init terminated with.
    pub fn boot(&self, init: Task, args: Option<&[u8]>) -> Result<i32, BootError> {
        if !self.sched.on_idle_host() {
            return Err(BootError::WrongHost);
        }

        let idle = self.create_process(None, None).map_err(BootError::Spawn)?;
        if idle != ProcessId::IDLE {
            log::error!("boot: first process got pid {}", idle);
            return Err(BootError::IdlePid(idle));
        }

        let init_pid = self.create_process(Some(init), args).map_err(BootError::Spawn)?;
        if init_pid != ProcessId::INIT {
            log::error!("boot: init process got pid {}", init_pid);
            return Err(BootError::InitPid(init_pid));
        }

        log::info!(
            "kernel booted: {} process slots, {} file ids per process",
            self.config.max_proc,
            self.config.max_fileid
        );

        if let Err(err) = self.sched.run_idle() {
            log::error!("boot: {}", err);
            return Err(err.into());
        }

        let state = self.lock();
        match state.process(ProcessId::INIT) {
            Some(init) if init.is_zombie() => {
                log::info!("init exited with {}", init.exit_value);
                Ok(init.exit_value)
            }
            _ => Err(BootError::InitAlive),
        }
    }

    pub(crate) fn lock(&self) -> KernelGuard<'_, ProcessManager> {
        self.state.lock(&self.sched)
    }

    /// Sleep on the queue chosen by `select`, with the kernel lock released
    pub(crate) fn wait<'a, F>(
        &'a self,
        guard: KernelGuard<'a, ProcessManager>,
        select: F,
    ) -> KernelGuard<'a, ProcessManager>
    where
        F: Fn(&mut ProcessManager) -> Option<&mut WaitQueue>,
    {
        self.state.wait(&self.sched, guard, select)
    }

    /// Back a new thread record of `owner` with a dispatcher thread
    ///
    /// The thread starts in state Init; the caller wakes it once its record
    /// is in place.
    pub(crate) fn spawn_backing(
        &self,
        owner: ProcessId,
        name: &str,
        is_main: bool,
    ) -> Result<ThreadId, SpawnError> {
        let kernel = self
            .me
            .upgrade()
            .expect("kernel handle used after the kernel was dropped");

        self.sched.spawn(
            owner,
            name,
            Box::new(move || {
                kernel.run_thread(is_main);
            }),
        )
    }

    /// Body of every dispatcher thread: run the record's task, then exit
    fn run_thread(&self, is_main: bool) -> ! {
        let pid = self.current_pid();
        let tid = self.current_tid();

        let start = {
            let state = self.lock();
            state
                .process(pid)
                .and_then(|process| process.thread(tid))
                .map(|ptcb| (ptcb.task.clone(), ptcb.args.clone()))
        };
        let (task, args) = match start {
            Some(start) => start,
            None => {
                log::error!("thread {} has no record in process {}", tid, pid);
                self.sched.exit_current()
            }
        };

        let exit_value = task.call(self, args);
        if is_main {
            self.terminate_process(exit_value)
        } else {
            self.exit_thread(exit_value)
        }
    }

    /// Number of occupied process slots, zombies included
    pub fn process_count(&self) -> usize {
        self.lock().count()
    }

    pub fn process_info(&self, pid: ProcessId) -> Option<ProcessInfo> {
        self.lock().info(pid)
    }

    pub fn process_table(&self) -> Vec<ProcessInfo> {
        self.lock().snapshot()
    }

    /// Give up the CPU, staying runnable
    pub fn yield_now(&self) {
        self.sched.yield_now();
    }

    /// Put a stream handle into the calling process's lowest free slot
    pub fn install_handle(&self, handle: FileHandle) -> Result<Fid, FdError> {
        let pid = self.current_pid();
        let mut state = self.lock();
        match state.process_mut(pid) {
            Some(process) => process.fd_table.install(handle),
            None => Err(FdError::BadFid),
        }
    }

    pub fn close_handle(&self, fid: Fid) -> Result<(), FdError> {
        let pid = self.current_pid();
        let mut state = self.lock();
        match state.process_mut(pid) {
            Some(process) => process.fd_table.close(fid),
            None => Err(FdError::BadFid),
        }
    }

    /// Open handles of the calling process
    pub fn open_handles(&self) -> usize {
        let pid = self.current_pid();
        self.lock()
            .process(pid)
            .map_or(0, |process| process.fd_table.open_count())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
