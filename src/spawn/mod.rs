//! Child-worker invocation boundary.
//!
//! Covers process spawning with piped stdio and signal delivery to
//! child processes and process groups.

pub mod signals;
pub mod spawner;

#[cfg(unix)]
pub use signals::NixSignaller;
pub use signals::ProcessSignaller;
pub use spawner::{Invocation, InvocationEx, PipeReader, PipeWriter, Spawn, WorkerSpawner};
