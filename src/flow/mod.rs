//! Stream-subscription/completion engine ("Flow").
//!
//! Runs two independent consumer tasks per invoked child (stdout, stderr)
//! on the shared tokio runtime, letting the caller harvest per-child
//! completions in real arrival order, correlated by pid.
//!
//! A session starts from one child's invocation handle via
//! [`Flow::subscribe`]; additional children fold into the same session via
//! [`Subscriber::subscribe`]. Exactly one stdout consumer and one stderr
//! consumer must be registered per child before the session can advance;
//! [`Subscriber::start`] submits all accumulated tasks and returns the
//! [`CompletionQueue`] bound to the snapshotted task count.
//!
//! The builder methods consume `self`, so no further children can be added
//! after `start()` — the session is closed by ownership.

mod completion;
mod subscription;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::spawn::{InvocationEx, PipeReader, ProcessSignaller};
use crate::{AppError, Result};

pub use completion::{CompletionQueue, TaskError, TaskOutcome};
pub use subscription::Subscription;

/// Boxed consumer callback for one of a child's output streams.
pub type Consumer = Box<dyn FnOnce(PipeReader, Subscription) -> BoxFuture<'static, Result<()>> + Send>;

struct PendingTask {
    consumer: Consumer,
    stream: PipeReader,
    subscription: Subscription,
}

/// Entry point for building a Flow session.
pub struct Flow;

impl Flow {
    /// Open a session over the first child's invocation handle.
    ///
    /// `signaller` backs [`Subscription::cancel`] for every child in the
    /// session.
    #[must_use]
    pub fn subscribe(handle: InvocationEx, signaller: Arc<dyn ProcessSignaller>) -> Subscriber {
        Subscriber::over(Vec::new(), handle, signaller)
    }
}

/// Per-child callback registration, chained into one session's task set.
pub struct Subscriber {
    sealed: Vec<PendingTask>,
    pid: i32,
    stdout: PipeReader,
    stderr: PipeReader,
    subscription: Subscription,
    on_output: Option<Consumer>,
    on_error: Option<Consumer>,
    signaller: Arc<dyn ProcessSignaller>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Subscriber {
    fn over(
        sealed: Vec<PendingTask>,
        handle: InvocationEx,
        signaller: Arc<dyn ProcessSignaller>,
    ) -> Self {
        let subscription = Subscription::new(handle.pid, handle.stdin, Arc::clone(&signaller));
        Self {
            sealed,
            pid: handle.pid,
            stdout: handle.stdout,
            stderr: handle.stderr,
            subscription,
            on_output: None,
            on_error: None,
            signaller,
        }
    }

    /// Register the consumer callback for this child's stdout stream.
    #[must_use]
    pub fn on_output<F, Fut>(mut self, consumer: F) -> Self
    where
        F: FnOnce(PipeReader, Subscription) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_output = Some(Box::new(move |stream, sub| Box::pin(consumer(stream, sub))));
        self
    }

    /// Register the consumer callback for this child's stderr stream.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, consumer: F) -> Self
    where
        F: FnOnce(PipeReader, Subscription) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_error = Some(Box::new(move |stream, sub| Box::pin(consumer(stream, sub))));
        self
    }

    /// Seal this child's two consumer tasks into the session task set.
    ///
    /// Calling `subscribe` or `start` with either callback unset is a
    /// programming error, reported as [`AppError::Flow`] rather than a
    /// retryable failure.
    fn seal(mut self) -> Result<(Vec<PendingTask>, Arc<dyn ProcessSignaller>)> {
        let on_output = self.on_output.take().ok_or_else(|| {
            AppError::Flow(format!("stdout consumer not registered for pid {}", self.pid))
        })?;
        let on_error = self.on_error.take().ok_or_else(|| {
            AppError::Flow(format!("stderr consumer not registered for pid {}", self.pid))
        })?;

        let mut sealed = self.sealed;
        sealed.push(PendingTask {
            consumer: on_output,
            stream: self.stdout,
            subscription: self.subscription.clone(),
        });
        sealed.push(PendingTask {
            consumer: on_error,
            stream: self.stderr,
            subscription: self.subscription,
        });
        Ok((sealed, self.signaller))
    }

    /// Fold another invoked child into this session, returning a fresh
    /// per-child registration chained into the same task set.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Flow`] if this child's callbacks are not both
    /// registered yet.
    pub fn subscribe(self, handle: InvocationEx) -> Result<Self> {
        let (sealed, signaller) = self.seal()?;
        Ok(Self::over(sealed, handle, signaller))
    }

    /// Submit all accumulated tasks to the tokio runtime, snapshot the task
    /// count, and return the completion queue bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Flow`] if this child's callbacks are not both
    /// registered yet.
    pub fn start(self) -> Result<CompletionQueue> {
        let (tasks, _signaller) = self.seal()?;
        let count = tasks.len();
        let (tx, rx) = mpsc::channel(count.max(1));

        for task in tasks {
            let tx = tx.clone();
            let pid = task.subscription.pid();
            let consumer = task.consumer;
            let stream = task.stream;
            let subscription = task.subscription;
            tokio::spawn(async move {
                let outcome = consumer(stream, subscription)
                    .await
                    .map(|()| pid)
                    .map_err(|source| TaskError { pid, source });
                // Receiver dropped means the caller abandoned the harvest.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        debug!(tasks = count, "flow session started");
        Ok(CompletionQueue::new(rx, count))
    }
}
