//! File handles and the per-process handle table
//!
//! A [`FileHandle`] points at a shared stream control block carrying an
//! explicit reference count: every table slot that holds the handle owns one
//! reference. Dropping the last reference runs the stream's own close logic.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Index into a process's handle table
pub type Fid = usize;

/// Stream behaviour the process core depends on
pub trait StreamOps: Send + Sync {
    /// Called exactly once, when the last table reference is released
    fn close(&self);
}

struct FileControlBlock {
    refcount: AtomicUsize,
    ops: Box<dyn StreamOps>,
}

#[derive(Clone)]
pub struct FileHandle {
    fcb: Arc<FileControlBlock>,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl FileHandle {
    /// Wrap a stream; the handle starts with no table references
    pub fn new<S>(ops: S) -> Self
    where
        S: StreamOps + 'static,
    {
        FileHandle {
            fcb: Arc::new(FileControlBlock {
                refcount: AtomicUsize::new(0),
                ops: Box::new(ops),
            }),
        }
    }

    pub fn incref(&self) {
        self.fcb.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one reference, closing the stream when none remain
    pub fn decref(&self) {
        let previous = self
            .fcb
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));

        match previous {
            Ok(1) => self.fcb.ops.close(),
            Ok(_) => {}
            Err(_) => log::error!("decref on a stream with no references"),
        }
    }

    pub fn refcount(&self) -> usize {
        self.fcb.refcount.load(Ordering::Acquire)
    }

    /// Whether both handles name the same stream
    pub fn same_stream(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.fcb, &other.fcb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// Fid out of range or naming an empty slot
    BadFid,
    /// No free slot left in the table
    TableFull,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdError::BadFid => write!(f, "bad stream id"),
            FdError::TableFull => write!(f, "stream table full"),
        }
    }
}

/// Per-process table of stream handles
pub struct FdTable {
    /// The handles (None = unused slot)
    fds: Box<[Option<FileHandle>]>,
}

impl FdTable {
    pub fn new(size: usize) -> Self {
        FdTable {
            fds: (0..size).map(|_| None).collect(),
        }
    }

    /// Store `handle` in the lowest free slot, taking a reference
    pub fn install(&mut self, handle: FileHandle) -> Result<Fid, FdError> {
        let fid = self
            .fds
            .iter()
            .position(Option::is_none)
            .ok_or(FdError::TableFull)?;
        handle.incref();
        self.fds[fid] = Some(handle);
        Ok(fid)
    }

    /// Empty a slot, releasing its reference
    pub fn close(&mut self, fid: Fid) -> Result<(), FdError> {
        let handle = self
            .fds
            .get_mut(fid)
            .and_then(Option::take)
            .ok_or(FdError::BadFid)?;
        handle.decref();
        Ok(())
    }

    pub fn get(&self, fid: Fid) -> Option<&FileHandle> {
        self.fds.get(fid).and_then(Option::as_ref)
    }

    /// Table for a child: same handles in the same slots, one more
    /// reference each
    pub fn inherit(&self) -> Self {
        let fds: Box<[Option<FileHandle>]> = self.fds.iter().cloned().collect();
        for handle in fds.iter().flatten() {
            handle.incref();
        }
        FdTable { fds }
    }

    /// Empty every slot, releasing each reference
    pub fn release_all(&mut self) {
        for slot in self.fds.iter_mut() {
            if let Some(handle) = slot.take() {
                handle.decref();
            }
        }
    }

    /// Number of occupied slots
    pub fn open_count(&self) -> usize {
        self.fds.iter().flatten().count()
    }
}
