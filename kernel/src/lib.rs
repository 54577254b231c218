//! Process and thread lifecycle core of a small teaching kernel
//!
//! The kernel runs on a host process: each kernel thread is backed by a host
//! thread, but a cooperative uniprocessor dispatcher lets only one of them
//! run at a time. Tasks drive the kernel through the methods of [`Kernel`].

extern crate alloc;

pub mod config;
pub mod ipc;
pub mod kernel;
pub mod logger;
pub mod process;
pub mod sync;
pub mod task;

pub use config::KernelConfig;
pub use ipc::{FdError, Fid, FileHandle, StreamOps};
pub use kernel::{BootError, Kernel};
pub use process::{ProcessError, ProcessId, ProcessInfo, ProcessState, WaitTarget};
pub use task::{Task, ThreadError, ThreadId, ThreadState};
