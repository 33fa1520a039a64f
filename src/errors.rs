//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Child process invocation failure.
    Spawn(String),
    /// Signal delivery failure (process may already have exited).
    Signal(String),
    /// Flow subscription or completion-harvest failure.
    Flow(String),
    /// Command dispatch failure (unknown command, missing arguments).
    Dispatch(String),
    /// Watchdog lifecycle failure.
    Watchdog(String),
    /// IPC communication failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Signal(msg) => write!(f, "signal: {msg}"),
            Self::Flow(msg) => write!(f, "flow: {msg}"),
            Self::Dispatch(msg) => write!(f, "dispatch: {msg}"),
            Self::Watchdog(msg) => write!(f, "watchdog: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
