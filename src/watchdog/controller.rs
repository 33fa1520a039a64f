//! Watchdog controller — keeps one designated child command alive.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::ProcessRegistry;
use crate::spawn::{ProcessSignaller, Spawn};
use crate::watchdog::backoff::Backoff;
use crate::watchdog::RESET_BACKOFF_TOKEN;
use crate::{AppError, Result};

/// Consecutive failed cycles after which each further restart attempt is
/// logged at warn level.
const NAGGING_CYCLE_THRESHOLD: usize = 5;

/// Watchdog lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Constructed, not yet started.
    Idle,
    /// A restart cycle is invoking the child.
    Starting,
    /// The child is live and its monitored stream is being consumed.
    Running,
    /// The child exited; waiting out the current backoff delay.
    Backoff,
    /// An explicit stop is unwinding the monitor.
    Stopping,
    /// The monitor has unwound; no further restarts.
    Stopped,
}

/// Keeps exactly one instance of a designated long-running child command
/// alive, restarting with increasing delay on failure and fast-resetting
/// the delay when the child emits the [`RESET_BACKOFF_TOKEN`] health signal
/// on its monitored (stderr) stream.
///
/// Spawn and I/O errors inside a cycle are logged, never propagated — the
/// monitor is a background loop that keeps retrying until an explicit
/// [`stop`](Watchdog::stop).
pub struct Watchdog {
    command: Vec<String>,
    spawner: Arc<dyn Spawn>,
    registry: Arc<ProcessRegistry>,
    signaller: Arc<dyn ProcessSignaller>,
    backoff_table: Vec<Duration>,
    state: Mutex<WatchdogState>,
    live_pid: AtomicI32,
    // Single-owner in-flight monitor handle: exactly one of the stop path
    // and the shutdown path takes it and performs wait-and-cleanup.
    monitor: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Watchdog {
    /// Create a watchdog for `command` (first element is the child-worker
    /// command name), using the default backoff table.
    #[must_use]
    pub fn new(
        command: Vec<String>,
        spawner: Arc<dyn Spawn>,
        registry: Arc<ProcessRegistry>,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> Self {
        Self {
            command,
            spawner,
            registry,
            signaller,
            backoff_table: crate::watchdog::backoff::default_table(),
            state: Mutex::new(WatchdogState::Idle),
            live_pid: AtomicI32::new(0),
            monitor: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the backoff delay table. Intended for tests, which run on
    /// millisecond tables.
    #[must_use]
    pub fn with_backoff_table(mut self, table: Vec<Duration>) -> Self {
        self.backoff_table = table;
        self
    }

    /// Tie the monitor to an external shutdown token, so a process-wide
    /// shutdown also unwinds the watchdog without a restart in between.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pid of the currently-live child, or 0 when none.
    #[must_use]
    pub fn live_pid(&self) -> i32 {
        self.live_pid.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: WatchdogState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Start the monitor loop on the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Watchdog`] if the watchdog was already started
    /// or has been stopped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.state();
        if slot.is_some() || state != WatchdogState::Idle {
            let reason = match state {
                WatchdogState::Stopping | WatchdogState::Stopped => "monitor already stopped",
                _ => "monitor already started",
            };
            return Err(AppError::Watchdog(reason.into()));
        }

        self.set_state(WatchdogState::Starting);
        let this = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { this.run_loop().await }));
        info!(command = ?self.command, "watchdog started");
        Ok(())
    }

    /// Stop the watchdog: signal the live child (if any), cancel the
    /// in-flight monitor, and await its unwind.
    ///
    /// Only one caller ever owns the monitor handle; a concurrent stop
    /// finding the slot empty is a no-op.
    pub async fn stop(&self) {
        self.set_state(WatchdogState::Stopping);
        self.cancel.cancel();

        let pid = self.live_pid.load(Ordering::SeqCst);
        if pid != 0 {
            if let Err(err) = self.signaller.terminate_group(pid) {
                warn!(pid, %err, "watchdog stop signal not delivered");
            }
        }

        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(%err, "watchdog monitor task panicked");
            }
            info!("watchdog stopped");
        }
        self.set_state(WatchdogState::Stopped);
    }

    async fn run_loop(self: Arc<Self>) {
        let mut backoff = Backoff::with_table(self.backoff_table.clone());
        let command_line = self.command.join(" ");

        while !self.cancel.is_cancelled() {
            self.set_state(WatchdogState::Starting);

            let invocation = match self.spawner.invoke_ex(&self.command) {
                Ok(invocation) => invocation,
                Err(err) => {
                    warn!(%err, command = %command_line, "watchdog cycle spawn failed");
                    self.set_state(WatchdogState::Backoff);
                    if !self.backoff_sleep(&backoff).await {
                        break;
                    }
                    backoff.advance();
                    continue;
                }
            };

            self.registry.register(invocation.pid, &command_line);
            self.live_pid.store(invocation.pid, Ordering::SeqCst);
            self.set_state(WatchdogState::Running);
            info!(pid = invocation.pid, command = %command_line, "watchdog child running");

            // The child's stdout is not part of the health protocol; drain
            // it so the child can never block on a full pipe.
            let mut stdout = BufReader::new(invocation.stdout).lines();
            let drain = tokio::spawn(async move {
                while let Ok(Some(line)) = stdout.next_line().await {
                    debug!(%line, "watchdog child stdout");
                }
            });

            self.monitor_stream(invocation.stderr, &mut backoff).await;
            drain.abort();

            self.registry.unregister(invocation.pid);
            self.live_pid.store(0, Ordering::SeqCst);

            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(WatchdogState::Backoff);
            if backoff.index() > NAGGING_CYCLE_THRESHOLD {
                warn!(command = %command_line, "watchdog still attempting restart of child worker");
            }
            if !self.backoff_sleep(&backoff).await {
                break;
            }
            backoff.advance();
        }

        self.set_state(WatchdogState::Stopped);
    }

    /// Consume the child's monitored (stderr) stream until it ends or the
    /// watchdog is cancelled, resetting the backoff index whenever the
    /// reset token arrives.
    async fn monitor_stream(&self, stderr: crate::spawn::PipeReader, backoff: &mut Backoff) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                next = lines.next_line() => match next {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line.starts_with(RESET_BACKOFF_TOKEN) {
                            debug!("backoff index reset by child health signal");
                            backoff.reset();
                        } else {
                            debug!(%line, "watchdog child stderr");
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "error reading watchdog child stream");
                        break;
                    }
                },
            }
        }
    }

    async fn backoff_sleep(&self, backoff: &Backoff) -> bool {
        let delay = backoff.current();
        debug!(?delay, index = backoff.index(), "watchdog backing off");
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}
