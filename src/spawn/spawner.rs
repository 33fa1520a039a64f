//! Child-worker process spawner.
//!
//! The invocation boundary of the supervisor: given a command name and
//! argument list, launch one child worker with piped stdio and hand back
//! its pid plus pipe endpoints. Children are placed in their own process
//! group so that group signals never reach the supervisor itself.
//!
//! `kill_on_drop` is deliberately left off — invoked children outlive the
//! `Child` handle and are terminated by signal, not by handle drop. Tokio
//! reaps the orphaned handle in the background once the process exits.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// Boxed read end of a child's output pipe.
pub type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write end of a child's stdin pipe.
pub type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Result of the basic invocation variant: pid plus the stdout read end.
pub struct Invocation {
    /// Opaque process identifier of the invoked child.
    pub pid: i32,
    /// Read end of the child's stdout pipe.
    pub stdout: PipeReader,
}

/// Result of the extended invocation variant: pid plus all three pipe ends.
pub struct InvocationEx {
    /// Opaque process identifier of the invoked child.
    pub pid: i32,
    /// Read end of the child's stdout pipe.
    pub stdout: PipeReader,
    /// Read end of the child's stderr pipe.
    pub stderr: PipeReader,
    /// Write end of the child's stdin pipe.
    pub stdin: PipeWriter,
}

/// Seam for invoking child-worker processes.
///
/// The production implementation is [`WorkerSpawner`]; tests inject fakes
/// that serve scripted pipe content without forking anything.
pub trait Spawn: Send + Sync {
    /// Invoke a child worker, capturing its stdout only.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) on OS spawn failure.
    fn invoke(&self, args: &[String]) -> Result<Invocation>;

    /// Invoke a child worker, capturing stdout, stderr, and stdin.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) on OS spawn failure.
    fn invoke_ex(&self, args: &[String]) -> Result<InvocationEx>;
}

/// Spawns child workers by launching a configured program with piped stdio.
///
/// By default the program is the supervisor's own executable re-entered in
/// worker mode; any program whose stdio follows the worker convention works.
#[derive(Debug, Clone)]
pub struct WorkerSpawner {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl WorkerSpawner {
    /// Create a spawner launching `program` with `prefix_args` prepended to
    /// every invocation's argument list.
    #[must_use]
    pub fn new(program: PathBuf, prefix_args: Vec<String>) -> Self {
        Self {
            program,
            prefix_args,
        }
    }

    /// Create a spawner that re-invokes the current executable in worker
    /// mode (`--worker CMD ARGS...`).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) if the current
    /// executable path cannot be resolved.
    pub fn from_current_exe(extra_args: Vec<String>) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|err| AppError::Spawn(format!("cannot resolve current executable: {err}")))?;
        let mut prefix = vec!["--worker".to_owned()];
        prefix.extend(extra_args);
        Ok(Self::new(exe, prefix))
    }

    fn launch(&self, args: &[String], extended: bool) -> Result<(i32, tokio::process::Child)> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(args)
            .stdout(Stdio::piped())
            .stdin(if extended {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if extended {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(false);

        // Own process group, so terminate_group(pid) targets the child and
        // its descendants without touching the supervisor.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to spawn child worker: {err}")))?;

        let pid = child.id().and_then(|id| i32::try_from(id).ok()).ok_or_else(|| {
            AppError::Spawn("child exited before its pid could be captured".into())
        })?;

        debug!(pid, program = %self.program.display(), ?args, "spawned child worker");
        Ok((pid, child))
    }
}

impl Spawn for WorkerSpawner {
    fn invoke(&self, args: &[String]) -> Result<Invocation> {
        let (pid, mut child) = self.launch(args, false)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture child stdout".into()))?;

        // Dropping the handle detaches the child; tokio reaps it on exit.
        drop(child);

        Ok(Invocation {
            pid,
            stdout: Box::new(stdout),
        })
    }

    fn invoke_ex(&self, args: &[String]) -> Result<InvocationEx> {
        let (pid, mut child) = self.launch(args, true)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture child stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture child stderr".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture child stdin".into()))?;

        drop(child);

        Ok(InvocationEx {
            pid,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            stdin: Box::new(stdin),
        })
    }
}
