//! Command dispatch table and handler-invocation boilerplate.
//!
//! The dispatch table is built by explicit registration calls at startup;
//! lookup is case-insensitive (names are stored uppercased). Every handler
//! receives the parsed argument vector with the command name stripped, plus
//! the three byte-stream channels to the invoking client.
//!
//! A handler may run synchronously, letting the boilerplate's drop of the
//! channel values close them on return, or take exclusive ownership of
//! them for detached asynchronous work by moving them into its own spawned
//! task — in which case they stay open until that task drops them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::Result;

/// Boxed write end of a handler's output or error channel.
pub type CommandOut = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed read end of a handler's input channel.
pub type CommandIn = Box<dyn AsyncRead + Send + Unpin>;

/// The three byte-stream channels between a handler and its invoking
/// client: output, error, and input.
pub struct CommandStreams {
    /// Output channel for processing data/info.
    pub out: CommandOut,
    /// Error channel for errors, health-check info, out-of-band protocol.
    pub err: CommandOut,
    /// Input channel carrying data from the invoker.
    pub input: CommandIn,
}

/// Boxed future returned by a command handler.
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// A registered command handler.
pub type CommandHandler = Arc<dyn Fn(Vec<String>, CommandStreams) -> HandlerFuture + Send + Sync>;

/// Explicit command-name → handler table, built at startup.
#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, CommandHandler>,
}

impl DispatchTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name` (stored uppercased). A second
    /// registration under the same name replaces the first.
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<String>, CommandStreams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: CommandHandler =
            Arc::new(move |args, streams| Box::pin(handler(args, streams)));
        self.handlers.insert(name.to_uppercase(), handler);
    }

    /// Resolve a handler by command name, case-insensitively.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<CommandHandler> {
        self.handlers.get(&name.to_uppercase()).cloned()
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("commands", &self.command_names())
            .finish_non_exhaustive()
    }
}

/// Outermost boilerplate around one command invocation.
///
/// Resolves `args[0]` against `table`, strips it from the vector, and
/// invokes the handler with the stream channels. Dispatch failures
/// (no command, unknown command) and handler errors are written as
/// structured error text to `report` — a second handle to the caller's
/// error channel — and logged; they never propagate to the run-loop.
///
/// Returns the command status code: 0 on success, 1 on any failure.
pub async fn forward_command(
    table: &DispatchTable,
    desc: &str,
    args: Vec<String>,
    streams: CommandStreams,
    mut report: CommandOut,
) -> i32 {
    let Some(command) = args.first().cloned() else {
        let errmsg = format!("{desc} has no command to execute");
        warn!("{errmsg}");
        write_error(&mut report, &errmsg).await;
        return 1;
    };

    let Some(handler) = table.resolve(&command) else {
        let errmsg = format!("{desc} - command '{command}' not implemented");
        warn!("{errmsg}");
        write_error(&mut report, &errmsg).await;
        return 1;
    };

    let stripped = args.get(1..).map(<[String]>::to_vec).unwrap_or_default();
    debug!(command = %command, args = ?stripped, "dispatching command");

    match handler(stripped, streams).await {
        Ok(()) => 0,
        Err(err) => {
            warn!(command = %command, %err, "command handler failed");
            write_error(&mut report, &format!("{command}: {err}")).await;
            1
        }
    }
}

async fn write_error(report: &mut CommandOut, message: &str) {
    let line = format!("ERROR: {message}\n");
    if let Err(err) = report.write_all(line.as_bytes()).await {
        warn!(%err, "failed to write dispatch error to error channel");
    }
    let _ = report.flush().await;
}
