//! Kernel configuration
//!
//! Capacities of the fixed tables and the default log level. Values can be
//! overridden programmatically or from the host environment at boot.

use log::LevelFilter;

/// Default capacity of the process control-block pool
pub const MAX_PROC: usize = 1024;

/// Default number of stream slots per process
pub const MAX_FILEID: usize = 16;

/// Environment variable overriding the pool capacity
pub const ENV_MAX_PROC: &str = "KERNEL_MAX_PROC";
/// Environment variable overriding the per-process stream table size
pub const ENV_MAX_FILEID: &str = "KERNEL_MAX_FILEID";
/// Environment variable overriding the log level
pub const ENV_LOG: &str = "KERNEL_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of slots in the process table (pid 0 and 1 included)
    pub max_proc: usize,
    /// Number of stream slots per process
    pub max_fileid: usize,
    /// Level handed to the kernel logger when it is installed
    pub log_level: LevelFilter,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_proc: MAX_PROC,
            max_fileid: MAX_FILEID,
            log_level: LevelFilter::Info,
        }
    }
}

impl KernelConfig {
    pub fn with_max_proc(mut self, max_proc: usize) -> Self {
        self.max_proc = max_proc;
        self
    }

    pub fn with_max_fileid(mut self, max_fileid: usize) -> Self {
        self.max_fileid = max_fileid;
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Build a configuration from `KERNEL_*` environment variables
    ///
    /// Unset variables keep their defaults. Malformed values are reported
    /// and ignored rather than aborting boot.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = KernelConfig::default();

        if let Some(raw) = lookup(ENV_MAX_PROC) {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.max_proc = n,
                Err(_) => log::warn!("{}={:?} is not a count, using {}", ENV_MAX_PROC, raw, config.max_proc),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_FILEID) {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.max_fileid = n,
                Err(_) => log::warn!("{}={:?} is not a count, using {}", ENV_MAX_FILEID, raw, config.max_fileid),
            }
        }

        if let Some(raw) = lookup(ENV_LOG) {
            match raw.trim().parse::<LevelFilter>() {
                Ok(level) => config.log_level = level,
                Err(_) => log::warn!("{}={:?} is not a log level, using {}", ENV_LOG, raw, config.log_level),
            }
        }

        config
    }
}
