//! Export configuration.
//!
//! [`ExportConfig`] is built once at startup, from CLI flags layered over an
//! optional TOML file, and is then passed by value to the exporter. Nothing in
//! the pipeline reads process-wide settings.
//!
//! Config file location (first match wins):
//! 1. `--config <path>`
//! 2. `$XDG_CONFIG_HOME/dirmirror/config.toml`
//! 3. `$HOME/.config/dirmirror/config.toml`
//!
//! ```toml
//! thread = 8
//! schedule = "per-directory"
//! max_failures = 0
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Hard ceiling on simultaneous downloads, whatever the user asks for.
pub const MAX_BUDGET: usize = 50;

/// Requested concurrency when none is given.
pub const DEFAULT_BUDGET: usize = 50;

/// Accepted range for HTTP timeouts, in seconds.
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Requested concurrency was zero.
    #[error("invalid thread count {value}: must be at least 1")]
    InvalidThreadCount {
        /// The rejected value.
        value: usize,
    },

    /// A timeout was outside `1..=3600` seconds.
    #[error("invalid value for `{field}`: {value}. Expected range: 1..=3600")]
    InvalidTimeout {
        /// Config key of the timeout.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// The config file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// How file downloads are scheduled across directory levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    /// One pool of `budget` workers for the whole tree, fed while the walk is
    /// still discovering directories.
    #[default]
    Global,
    /// A fresh pool per directory level; each level waits for its own files
    /// before returning to its parent.
    PerDirectory,
}

impl Schedule {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerDirectory => "per-directory",
        }
    }
}

/// Clamps a requested concurrency to [`MAX_BUDGET`].
#[must_use]
pub fn effective_budget(requested: usize) -> usize {
    requested.min(MAX_BUDGET)
}

/// Immutable settings for one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    budget: usize,
    silent: bool,
    schedule: Schedule,
    max_failures: Option<usize>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            silent: false,
            schedule: Schedule::default(),
            max_failures: None,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl ExportConfig {
    /// Creates a config for the requested concurrency, capped at [`MAX_BUDGET`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidThreadCount`] for a request of zero.
    pub fn new(requested_threads: usize) -> Result<Self, ConfigError> {
        if requested_threads == 0 {
            return Err(ConfigError::InvalidThreadCount {
                value: requested_threads,
            });
        }
        let budget = effective_budget(requested_threads);
        if budget < requested_threads {
            debug!(requested_threads, budget, "thread count capped");
        }
        Ok(Self {
            budget,
            ..Self::default()
        })
    }

    /// Sets whether progress and error logging is suppressed.
    #[must_use]
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Sets the download scheduling mode.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the failure count above which the run is reported as unsuccessful.
    ///
    /// `None` keeps the tolerant behavior: the run succeeds whatever failed.
    #[must_use]
    pub fn with_max_failures(mut self, max_failures: Option<usize>) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets HTTP connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeout`] for values outside `1..=3600`.
    pub fn with_timeouts(
        mut self,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        validate_timeout_secs("connect_timeout_secs", connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", read_timeout_secs)?;
        self.connect_timeout_secs = connect_timeout_secs;
        self.read_timeout_secs = read_timeout_secs;
        Ok(self)
    }

    /// Maximum number of downloads in flight at once, across the whole run.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Whether logging is suppressed.
    #[must_use]
    pub fn silent(&self) -> bool {
        self.silent
    }

    /// Download scheduling mode.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Failure threshold, if strict exit status was requested.
    #[must_use]
    pub fn max_failures(&self) -> Option<usize> {
        self.max_failures
    }

    /// HTTP connect timeout in seconds.
    #[must_use]
    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    /// HTTP read timeout in seconds.
    #[must_use]
    pub fn read_timeout_secs(&self) -> u64 {
        self.read_timeout_secs
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if TIMEOUT_RANGE_SECS.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeout { field, value })
    }
}

/// Values read from the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Requested concurrency (capped at [`MAX_BUDGET`]).
    pub thread: Option<usize>,
    /// Suppress progress and error logging.
    pub silent: Option<bool>,
    /// Download scheduling mode.
    pub schedule: Option<Schedule>,
    /// Failure threshold for a non-zero exit status.
    pub max_failures: Option<usize>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Skip the post-export cleanup pass.
    pub skip_cleanup: Option<bool>,
}

impl FileConfig {
    /// Parses config file contents. `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Loads the config file at the default location, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists there but is unreadable or invalid.
    pub fn load_default() -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let Some(path) = resolve_default_config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file");
            return Ok(None);
        }
        let config = Self::load(&path)?;
        Ok(Some((path, config)))
    }
}

/// Resolves the default config path from `XDG_CONFIG_HOME` or `HOME`.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("dirmirror")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("dirmirror")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
