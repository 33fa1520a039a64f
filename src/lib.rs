#![forbid(unsafe_code)]

//! `procwarden` — process-supervision framework.
//!
//! A long-running supervisor dispatches commands to handlers over a local
//! IPC socket, spawns short-lived child worker processes over OS pipes,
//! multiplexes their output through the [`flow`] completion engine, and
//! keeps one designated long-running child alive through the [`watchdog`]
//! restart-with-backoff controller. Live children are tracked in the
//! [`registry`], which performs a best-effort termination sweep at
//! shutdown.

pub mod config;
pub mod errors;
pub mod flow;
pub mod registry;
pub mod spawn;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
