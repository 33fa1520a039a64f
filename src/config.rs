//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Watchdog configuration for the designated long-running child command.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Whether the watchdog is started at supervisor boot.
    #[serde(default)]
    pub enabled: bool,
    /// Child-worker command line kept alive by the watchdog
    /// (first element is the command name).
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_ipc_name() -> String {
    "procwarden".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Program name used in log output and the status report.
    pub program_name: String,
    /// Named pipe / Unix socket identifier for the control endpoint.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Program launched for child-worker invocations. Defaults to the
    /// supervisor's own executable re-invoked in worker mode.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
    /// Extra arguments prefixed to every child-worker invocation.
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// Watchdog settings.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.program_name.trim().is_empty() {
            return Err(AppError::Config("program_name must not be empty".into()));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        if self.watchdog.enabled && self.watchdog.command.is_empty() {
            return Err(AppError::Config(
                "watchdog.command must not be empty when watchdog.enabled is true".into(),
            ));
        }

        Ok(())
    }
}
