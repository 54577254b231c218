//! Shared boot helpers for the kernel integration tests
//!
//! Every test boots its own kernel on the test's host thread, drives it from
//! the init task and checks what the tasks recorded once `boot` returns.

#![allow(dead_code)]

use std::sync::Arc;

use kernel::{BootError, Kernel, KernelConfig, StreamOps, Task};

/// Install the kernel logger once per test binary
///
/// Records go to stderr when `KERNEL_LOG` is set.
pub fn init_logging() {
    let config = KernelConfig::from_env();
    kernel::logger::init(config.log_level, std::env::var("KERNEL_LOG").is_ok());
}

pub fn task<F>(f: F) -> Task
where
    F: Fn(&Kernel, Option<Arc<[u8]>>) -> i32 + Send + Sync + 'static,
{
    Task::new(f)
}

/// Boot a default kernel with `init` as the init task
pub fn boot<F>(init: F) -> Result<i32, BootError>
where
    F: Fn(&Kernel, Option<Arc<[u8]>>) -> i32 + Send + Sync + 'static,
{
    boot_with(KernelConfig::default().with_max_proc(64), init)
}

pub fn boot_with<F>(config: KernelConfig, init: F) -> Result<i32, BootError>
where
    F: Fn(&Kernel, Option<Arc<[u8]>>) -> i32 + Send + Sync + 'static,
{
    init_logging();
    let kernel = Kernel::new(config);
    kernel.boot(Task::new(init), None)
}

/// Yield until `done` holds
pub fn yield_until<F>(kernel: &Kernel, done: F)
where
    F: Fn() -> bool,
{
    while !done() {
        kernel.yield_now();
    }
}

/// Stream that records when it gets closed
pub struct ClosingStream {
    pub closed: Arc<std::sync::atomic::AtomicBool>,
}

impl ClosingStream {
    pub fn new() -> (Self, Arc<std::sync::atomic::AtomicBool>) {
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        (
            ClosingStream {
                closed: Arc::clone(&closed),
            },
            closed,
        )
    }
}

impl StreamOps for ClosingStream {
    fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
