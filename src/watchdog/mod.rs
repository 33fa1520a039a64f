//! Watchdog — restart-with-backoff controller for one designated child.
//!
//! The controller loops invoke → monitor → backoff → invoke, registering
//! and unregistering the child in the shared [`ProcessRegistry`]
//! (crate::registry::ProcessRegistry) the same way command handlers do.

pub mod backoff;
pub mod controller;

pub use backoff::{Backoff, DEFAULT_DELAYS_SECONDS};
pub use controller::{Watchdog, WatchdogState};

/// Reserved literal a child may emit on its monitored stream (optionally
/// padded by blank lines, recognized by prefix match) to reset the
/// watchdog's backoff index. It carries no other payload meaning.
pub const RESET_BACKOFF_TOKEN: &str = "RESET_BACKOFF_INDEX";
