//! Per-child subscription handle.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::spawn::{PipeWriter, ProcessSignaller};

/// Handle bundling a child's stdin write end with a cancel operation.
///
/// Cloned into both of the child's consumer tasks; typically a consumer
/// callback calls [`cancel`](Subscription::cancel) when it detects an
/// unrecoverable stream condition, to avoid orphaning the child.
#[derive(Clone)]
pub struct Subscription {
    pid: i32,
    stdin: Arc<Mutex<Option<PipeWriter>>>,
    signaller: Arc<dyn ProcessSignaller>,
}

impl Subscription {
    pub(super) fn new(
        pid: i32,
        stdin: PipeWriter,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> Self {
        Self {
            pid,
            stdin: Arc::new(Mutex::new(Some(stdin))),
            signaller,
        }
    }

    /// Pid of the child this subscription is bound to.
    #[must_use]
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Send a graceful termination signal to the owning child's process
    /// group. Delivery failure (the child already exited) is logged, not
    /// surfaced — cancel is a best-effort operation invoked from consumer
    /// callbacks.
    pub fn cancel(&self) {
        if let Err(err) = self.signaller.terminate_group(self.pid) {
            warn!(pid = self.pid, %err, "subscription cancel signal not delivered");
        }
    }

    /// Take exclusive ownership of the write end of the child's stdin pipe.
    ///
    /// Returns `None` if another caller has already taken it.
    #[must_use]
    pub fn request_stream(&self) -> Option<PipeWriter> {
        self.stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
