//! Completion harvesting for a started Flow session.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::AppError;

/// Error raised inside one consumer task, carried to harvest time.
///
/// Failures are isolated per task: a failed consumer never aborts its
/// sibling tasks.
#[derive(Debug)]
pub struct TaskError {
    /// Pid of the child whose consumer task failed.
    pub pid: i32,
    /// The underlying failure.
    pub source: AppError,
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer task for pid {} failed: {}", self.pid, self.source)
    }
}

impl std::error::Error for TaskError {}

/// Outcome of one consumer task: the child's pid on success (for audit
/// correlation against the set of pids actually invoked), or the per-task
/// error.
pub type TaskOutcome = std::result::Result<i32, TaskError>;

/// Ordered multiplexed queue over all tasks of one Flow session.
///
/// Results arrive in real finish order — whichever task finishes first is
/// harvested first, regardless of registration order. Exactly
/// [`count`](CompletionQueue::count) results can be harvested; afterwards
/// the queue is permanently exhausted and every method returns `None`.
#[derive(Debug)]
pub struct CompletionQueue {
    receiver: mpsc::Receiver<TaskOutcome>,
    count: usize,
}

impl CompletionQueue {
    pub(super) fn new(receiver: mpsc::Receiver<TaskOutcome>, count: usize) -> Self {
        Self { receiver, count }
    }

    /// Number of tasks submitted at session start.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Retrieve and remove the next completed task outcome, or `None` if
    /// none has finished yet (or the queue is exhausted).
    pub fn poll(&mut self) -> Option<TaskOutcome> {
        self.receiver.try_recv().ok()
    }

    /// Retrieve and remove the next completed task outcome, waiting up to
    /// `timeout` if none is present yet. Returns `None` on timeout or when
    /// the queue is exhausted.
    pub async fn poll_timeout(&mut self, timeout: Duration) -> Option<TaskOutcome> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Retrieve and remove the next completed task outcome, waiting if none
    /// is present yet. Returns `None` once the queue is exhausted.
    pub async fn take(&mut self) -> Option<TaskOutcome> {
        self.receiver.recv().await
    }
}
