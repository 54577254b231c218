//! Waiting for children and reaping zombies

use super::{ProcessError, ProcessId, WaitTarget};
use crate::kernel::Kernel;

impl Kernel {
    /// Block until the selected child is a zombie, then reap it
    ///
    /// Returns the reaped pid and its exit value. A reaped pid is invalid
    /// from then on and may be handed out again by a later creation.
    pub fn wait_child(&self, target: WaitTarget) -> Result<(ProcessId, i32), ProcessError> {
        let me = self.current_pid();
        let mut state = self.lock();

        let child = match target {
            WaitTarget::Pid(child) => {
                if !state.in_range(child) {
                    return Err(ProcessError::InvalidPid);
                }
                loop {
                    let process = state.process(child).ok_or(ProcessError::InvalidPid)?;
                    if process.parent != Some(me) {
                        return Err(ProcessError::NotMyChild);
                    }
                    if !process.is_alive() {
                        break child;
                    }
                    state = self.wait(state, |manager| {
                        manager.process_mut(me).map(|process| &mut process.child_exit)
                    });
                }
            }
            WaitTarget::Any => loop {
                let process = state.process(me).ok_or(ProcessError::InvalidPid)?;
                if process.children.is_empty() {
                    return Err(ProcessError::NoChild);
                }
                if let Some(&child) = process.exited.front() {
                    break child;
                }
                state = self.wait(state, |manager| {
                    manager.process_mut(me).map(|process| &mut process.child_exit)
                });
            },
        };

        let exit_value = state.reap(me, child);
        Ok((child, exit_value))
    }
}
