//! Monitor primitives used by the process and thread managers
//!
//! One [`KernelLock`] serializes every mutation of kernel state. Blocking
//! waits go through [`KernelLock::wait`], which releases the lock while the
//! caller sleeps on a [`WaitQueue`] and reacquires it on wake-up.

pub mod kernel_lock;
pub mod wait_queue;

pub use kernel_lock::{KernelGuard, KernelLock};
pub use wait_queue::WaitQueue;
