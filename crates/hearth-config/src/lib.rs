//! Shared configuration for the Hearth device lifecycle host.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `HEARTH_*` environment variables, then
//! command-line flags. The daemon loads a [`Config`] once during bootstrap
//! and hands the relevant pieces to telemetry and to the lifecycle manager.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_BINDING_WORKERS, DEFAULT_LOG_FILTER, DEFAULT_STATUS_STORAGE, default_binding_workers,
    default_log_filter, default_log_filter_string, default_log_format, default_status_storage,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HEARTH")]
pub struct Config {
    /// Tracing filter expression, e.g. `info` or `hearth=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Worker count of the caller executing binding side effects.
    #[ortho_config(default = default_binding_workers())]
    pub binding_workers: usize,
    /// Namespace of the device status storage.
    ///
    /// The daemon currently backs this namespace with an in-process
    /// `MemoryStatusStore`, so disabled flags do not survive a restart.
    #[ortho_config(default = default_status_storage())]
    pub status_storage: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            binding_workers: default_binding_workers(),
            status_storage: default_status_storage(),
        }
    }
}

/// Semantic problems detected after the layers have been merged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The caller needs at least one worker.
    #[error("binding_workers must be at least 1")]
    NoBindingWorkers,
    /// The storage namespace may not be blank.
    #[error("status_storage must not be empty")]
    EmptyStatusStorage,
}

impl Config {
    /// Loads the configuration from every layer, reading the process
    /// arguments for the command-line layer.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any layer is malformed.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads the configuration using `args` as the command line. The first
    /// item is the program name.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any layer is malformed.
    pub fn load_from_iter<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator,
        I::Item: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the number of binding workers.
    #[must_use]
    pub const fn binding_workers(&self) -> usize {
        self.binding_workers
    }

    /// Returns the status storage namespace.
    #[must_use]
    pub fn status_storage(&self) -> &str {
        self.status_storage.as_str()
    }

    /// Checks constraints that the layered loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binding_workers == 0 {
            return Err(ConfigError::NoBindingWorkers);
        }
        if self.status_storage.trim().is_empty() {
            return Err(ConfigError::EmptyStatusStorage);
        }
        Ok(())
    }
}
