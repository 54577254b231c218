//! Process-wide exit

use super::{ProcessId, ProcessState, WaitTarget};
use crate::kernel::Kernel;

impl Kernel {
    /// Terminate the calling process with `exit_value`
    ///
    /// Any thread of the process may call this. The caller waits until it
    /// is the last unfinished thread, releases the process's resources,
    /// hands its children to init and becomes a zombie for the parent to
    /// reap. A second caller while an exit is already under way simply
    /// finishes its own thread. Never returns.
    pub fn terminate_process(&self, exit_value: i32) -> ! {
        let pid = self.current_pid();
        let me = self.current_tid();
        let mut state = self.lock();

        let reentered = match state.process_mut(pid) {
            Some(process) => {
                let reentered = process.exit_in_progress;
                process.exit_in_progress = true;
                if !reentered {
                    if let Some(ptcb) = process.thread_mut(me) {
                        if ptcb.publish_exit(exit_value) {
                            ptcb.joinable = false;
                            ptcb.join_cond.broadcast(&self.sched);
                        }
                    }
                }
                reentered
            }
            None => {
                log::error!("terminate_process: thread {} has no process {}", me, pid);
                drop(state);
                self.sched.exit_current()
            }
        };
        if reentered {
            log::debug!("process {} already exiting, finishing thread {}", pid, me);
            self.finish_thread(state, pid, me, exit_value)
        }

        log::info!("process {} exiting with {}", pid, exit_value);

        // init collects the whole tree before it goes
        if pid == ProcessId::INIT {
            drop(state);
            while let Ok((child, value)) = self.wait_child(WaitTarget::Any) {
                log::debug!("init collected process {} ({})", child, value);
            }
            state = self.lock();
        }

        loop {
            let others = state
                .process(pid)
                .map_or(0, |process| process.unfinished_threads_except(me));
            if others == 0 {
                break;
            }
            log::trace!("process {} exit waits for {} threads", pid, others);
            state = self.wait(state, |manager| {
                manager.process_mut(pid).map(|process| &mut process.thread_exit)
            });
        }

        if let Some(process) = state.process_mut(pid) {
            process.threads.retain(|ptcb| ptcb.tid == me);
            process.fd_table.release_all();
        }

        state.adopt_orphans(pid, &self.sched);
        state.notify_parent(pid, &self.sched);

        if let Some(process) = state.process_mut(pid) {
            process.threads.clear();
            process.main_thread = None;
            process.exit_value = exit_value;
            process.state = ProcessState::Zombie;
        }
        drop(state);

        self.sched.exit_current()
    }
}
