//! Configuration management.
//!
//! [`WorkerConfig`] controls how connection workers are spawned and how the
//! prepare handler backs off on a busy engine. A process-wide default can be
//! installed once with [`install`] before the first connection starts;
//! otherwise [`global`] builds one from the environment on first use.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Default number of prepare attempts while the engine reports busy.
pub const DEFAULT_PREPARE_BUSY_RETRIES: u32 = 100;

/// Default backoff unit between prepare attempts.
pub const DEFAULT_PREPARE_BACKOFF_STEP: Duration = Duration::from_micros(100);

/// Default maximum length of a database path, in bytes.
pub const DEFAULT_MAX_PATH_LEN: usize = 512;

/// Default prefix for worker thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "sqlite-courier";

/// Configuration for connection workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// How many times prepare is retried while the engine is busy.
    pub prepare_busy_retries: u32,
    /// Retry `n` sleeps `n * prepare_backoff_step` first.
    pub prepare_backoff_step: Duration,
    /// Longest accepted database path, in bytes.
    pub max_path_len: usize,
    /// Worker threads are named `<prefix>-<connection id>`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prepare_busy_retries: DEFAULT_PREPARE_BUSY_RETRIES,
            prepare_backoff_step: DEFAULT_PREPARE_BACKOFF_STEP,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Prepare retries while busy.
    pub prepare_busy_retries: Option<u32>,
    /// Backoff unit in microseconds.
    pub prepare_backoff_us: Option<u64>,
    /// Maximum path length.
    pub max_path_len: Option<usize>,
    /// Thread name prefix.
    pub thread_name_prefix: Option<String>,
    /// Worker stack size in bytes.
    pub stack_size: Option<usize>,
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file, on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text, on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`],
    /// or [`Error::InvalidInput`] if the result fails [`validate`](Self::validate).
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let config = Self::default().with_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would only fail once a worker is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the thread name prefix contains a
    /// NUL byte.
    pub fn validate(&self) -> Result<()> {
        match self.thread_name_prefix.find('\0') {
            Some(pos) => Err(Error::InvalidInput(format!(
                "thread name prefix contains a NUL byte at {pos}"
            ))),
            None => Ok(()),
        }
    }

    /// Builds configuration from `SQLITE_COURIER_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlays `SQLITE_COURIER_*` environment variables.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Some(v) = parse_env("SQLITE_COURIER_PREPARE_RETRIES") {
            self.prepare_busy_retries = v;
        }
        if let Some(v) = parse_env("SQLITE_COURIER_PREPARE_BACKOFF_US") {
            self.prepare_backoff_step = Duration::from_micros(v);
        }
        if let Some(v) = parse_env::<usize>("SQLITE_COURIER_MAX_PATH_LEN").filter(|v| *v > 0) {
            self.max_path_len = v;
        }
        if let Some(v) = parse_string_env("SQLITE_COURIER_THREAD_PREFIX") {
            self.thread_name_prefix = v;
        }
        if let Some(v) = parse_env::<usize>("SQLITE_COURIER_STACK_SIZE").filter(|v| *v > 0) {
            self.stack_size = Some(v);
        }
        self
    }

    fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.prepare_busy_retries {
            self.prepare_busy_retries = v;
        }
        if let Some(v) = file.prepare_backoff_us {
            self.prepare_backoff_step = Duration::from_micros(v);
        }
        if let Some(v) = file.max_path_len.filter(|v| *v > 0) {
            self.max_path_len = v;
        }
        if let Some(v) = file.thread_name_prefix.filter(|v| !v.trim().is_empty()) {
            self.thread_name_prefix = v;
        }
        if let Some(v) = file.stack_size.filter(|v| *v > 0) {
            self.stack_size = Some(v);
        }
        self
    }

    /// Sets the prepare retry bound.
    #[must_use]
    pub const fn with_prepare_busy_retries(mut self, retries: u32) -> Self {
        self.prepare_busy_retries = retries;
        self
    }

    /// Sets the prepare backoff unit.
    #[must_use]
    pub const fn with_prepare_backoff_step(mut self, step: Duration) -> Self {
        self.prepare_backoff_step = step;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sleep before prepare retry number `attempt` (1-based).
    #[must_use]
    pub fn prepare_backoff(&self, attempt: u32) -> Duration {
        self.prepare_backoff_step.saturating_mul(attempt)
    }
}

static GLOBAL_CONFIG: OnceLock<WorkerConfig> = OnceLock::new();

/// Installs the process-wide worker configuration.
///
/// Must run before the first connection starts; the configuration never
/// changes afterwards.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a configuration is already in place.
pub fn install(config: WorkerConfig) -> Result<()> {
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| Error::OperationFailed {
            operation: "config_install".to_string(),
            cause: "worker configuration already initialized".to_string(),
        })
}

/// Returns the process-wide worker configuration.
#[must_use]
pub fn global() -> &'static WorkerConfig {
    GLOBAL_CONFIG.get_or_init(WorkerConfig::from_env)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn parse_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
