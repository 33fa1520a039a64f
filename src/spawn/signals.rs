//! Signal delivery to child processes and process groups.
//!
//! All four operations are fallible — the target may already have exited.
//! Callers performing a bulk drain swallow these errors; direct callers
//! surface them.

use crate::Result;

/// Seam for delivering termination signals to child processes.
///
/// The production implementation is [`NixSignaller`]; tests inject a
/// recording fake so sweeps can be asserted without touching real pids.
pub trait ProcessSignaller: Send + Sync {
    /// Graceful termination (SIGINT) of a single process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`](crate::AppError::Signal) if delivery fails.
    fn terminate(&self, pid: i32) -> Result<()>;

    /// Hard kill (SIGKILL) of a single process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`](crate::AppError::Signal) if delivery fails.
    fn kill(&self, pid: i32) -> Result<()>;

    /// Graceful termination (SIGINT) of a process group.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`](crate::AppError::Signal) if delivery fails.
    fn terminate_group(&self, pid: i32) -> Result<()>;

    /// Hard kill (SIGKILL) of a process group.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signal`](crate::AppError::Signal) if delivery fails.
    fn kill_group(&self, pid: i32) -> Result<()>;
}

/// Signal delivery via `nix` (`kill`/`killpg`).
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

#[cfg(unix)]
impl NixSignaller {
    fn send(pid: i32, signal: nix::sys::signal::Signal, group: bool) -> Result<()> {
        use crate::AppError;
        use nix::unistd::Pid;

        if pid <= 0 {
            return Err(AppError::Signal(format!("invalid pid {pid}")));
        }

        let target = Pid::from_raw(pid);
        let result = if group {
            nix::sys::signal::killpg(target, signal)
        } else {
            nix::sys::signal::kill(target, signal)
        };

        result.map_err(|err| {
            AppError::Signal(format!(
                "failed to deliver {signal} to {}{pid}: {err}",
                if group { "process group " } else { "pid " }
            ))
        })
    }
}

#[cfg(unix)]
impl ProcessSignaller for NixSignaller {
    fn terminate(&self, pid: i32) -> Result<()> {
        Self::send(pid, nix::sys::signal::Signal::SIGINT, false)
    }

    fn kill(&self, pid: i32) -> Result<()> {
        Self::send(pid, nix::sys::signal::Signal::SIGKILL, false)
    }

    fn terminate_group(&self, pid: i32) -> Result<()> {
        Self::send(pid, nix::sys::signal::Signal::SIGINT, true)
    }

    fn kill_group(&self, pid: i32) -> Result<()> {
        Self::send(pid, nix::sys::signal::Signal::SIGKILL, true)
    }
}
