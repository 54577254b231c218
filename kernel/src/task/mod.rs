//! Threads: the dispatcher and the per-process thread records on top of it

pub mod pthread;
pub mod ptcb;
pub mod scheduler;
pub mod thread;

pub use pthread::ThreadError;
pub use ptcb::Task;
pub use thread::{ThreadId, ThreadState};
