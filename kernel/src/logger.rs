use conquer_once::spin::OnceCell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use alloc::{format, string::String};

static LOGGER: OnceCell<KernelLogger> = OnceCell::uninit();

const BUFFER_SIZE: usize = 8192;

/// Buffer keeping the most recent log output
///
/// Once full, whole lines are dropped from the front to make room.
pub struct LogBuffer {
    buffer: String,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: String::with_capacity(capacity),
            capacity,
        }
    }

    fn make_room(&mut self, needed: usize) {
        while self.buffer.len() + needed > self.capacity && !self.buffer.is_empty() {
            match self.buffer.find('\n') {
                Some(end) => {
                    self.buffer.drain(..=end);
                }
                None => self.buffer.clear(),
            }
        }
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }
}

impl Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.len() > self.capacity {
            // Oversized fragment: keep its tail only
            let start = s.len() - self.capacity;
            let start = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
            self.buffer.clear();
            self.buffer.push_str(&s[start..]);
            return Ok(());
        }
        self.make_room(s.len());
        self.buffer.push_str(s);
        Ok(())
    }
}

pub struct KernelLogger {
    buffer: Mutex<LogBuffer>,
    level: LevelFilter,
    console: AtomicBool,
}

impl KernelLogger {
    fn new(level: LevelFilter) -> Self {
        KernelLogger {
            buffer: Mutex::new(LogBuffer::new(BUFFER_SIZE)),
            level,
            console: AtomicBool::new(false),
        }
    }

    /// Start echoing records to the host console
    pub fn console_ready(&self) {
        self.console.store(true, Ordering::Release);
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_record(record.level(), record.target(), record.args());
        let _ = self.buffer.lock().write_str(&line);

        if self.console.load(Ordering::Acquire) {
            std::eprint!("{}", line);
        }
    }

    fn flush(&self) {}
}

/// One buffered line per record, so eviction never splits a record
fn format_record(level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    format!("[{:>5}] {}: {}\n", level, target, args)
}

/// Install the kernel logger
///
/// Only the first call installs; later calls keep the original level. When
/// `console` is set, records are also written to stderr.
pub fn init(level: LevelFilter, console: bool) {
    let logger = LOGGER.get_or_init(|| KernelLogger::new(level));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
    if console {
        logger.console_ready();
    }
}

/// Copy of the buffered log output
pub fn recent() -> String {
    LOGGER
        .get()
        .map(|logger| String::from(logger.buffer.lock().contents()))
        .unwrap_or_default()
}
