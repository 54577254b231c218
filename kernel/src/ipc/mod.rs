//! Stream handles shared between processes
//!
//! The stream subsystem itself lives outside the process core; all the core
//! needs is a reference-counted handle and a per-process table of them.

pub mod fd;

pub use fd::{FdError, FdTable, Fid, FileHandle, StreamOps};
