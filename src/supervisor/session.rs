//! Supervisor run-loop and control-endpoint connection handling.
//!
//! The session listens on a local IPC socket for command requests from
//! `procwarden-ctl`. Each connection carries one command: a JSON request
//! line `{"args": [...]}`, optionally followed by `{"channel":"in", ...}`
//! input frames, answered with `out`/`err` frames and a final `exit`
//! frame. Every command executes on its own task; the run-loop itself
//! only waits for the shutdown signal, then performs the registry's
//! termination sweep before returning.

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::registry::ProcessRegistry;
use crate::spawn::{ProcessSignaller, Spawn};
use crate::supervisor::channel::{Channel, ChannelWriter, ClientFrame, Frame, WireFrame};
use crate::supervisor::dispatch::{forward_command, CommandStreams, DispatchTable};
use crate::{AppError, Result};

/// Inbound command request: the first JSON line of a control connection.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Parsed argument vector; the first element is the command name.
    pub args: Vec<String>,
}

/// Explicit context shared by every supervisor component — constructed at
/// startup and passed around instead of global state.
pub struct SupervisorContext {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Registry of live child workers.
    pub registry: Arc<ProcessRegistry>,
    /// Child-worker invocation boundary.
    pub spawner: Arc<dyn Spawn>,
    /// Signal delivery boundary.
    pub signaller: Arc<dyn ProcessSignaller>,
    /// Shutdown signal for the run-loop and every background task.
    pub shutdown: CancellationToken,
}

/// The top-level blocking run-loop.
pub struct SupervisorSession {
    ctx: Arc<SupervisorContext>,
    table: Arc<DispatchTable>,
}

impl SupervisorSession {
    /// Create a session dispatching against `table`.
    #[must_use]
    pub fn new(ctx: Arc<SupervisorContext>, table: DispatchTable) -> Self {
        Self {
            ctx,
            table: Arc::new(table),
        }
    }

    /// Run until the shutdown signal fires, then drain the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Ipc`] if the control listener cannot be created
    /// (fatal startup error — the run-loop is never entered).
    pub async fn run(&self) -> Result<()> {
        let name = self.ctx.config.ipc_name.clone();
        let listener_name = name
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

        let listener = ListenerOptions::new()
            .name(listener_name)
            .create_tokio()
            .map_err(|err| AppError::Ipc(format!("failed to create control listener: {err}")))?;

        info!(ipc_name = %name, "supervisor control endpoint listening");

        loop {
            tokio::select! {
                () = self.ctx.shutdown.cancelled() => {
                    info!("run-loop unblocked by shutdown signal");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok(stream) => {
                            let table = Arc::clone(&self.table);
                            tokio::spawn(handle_connection(stream, table));
                        }
                        Err(err) => {
                            warn!(%err, "control connection accept failed");
                        }
                    }
                }
            }
        }

        let signalled = self.ctx.registry.drain_and_terminate(&[]);
        info!(signalled, "child termination sweep complete");
        Ok(())
    }
}

/// Handle one control connection: read the request, dispatch the command
/// on its own task, pump response frames until every channel writer has
/// been dropped, then send the exit frame.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    table: Arc<DispatchTable>,
) {
    let span = info_span!("control_conn");
    async move {
        let (recv, mut send) = stream.split();
        let mut reader = BufReader::new(recv);

        let mut line = String::new();
        let request = match reader.read_line(&mut line).await {
            Ok(0) => return,
            Ok(_) => match serde_json::from_str::<CommandRequest>(line.trim()) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, "malformed command request");
                    let _ = write_frame(
                        &mut send,
                        &WireFrame {
                            channel: Channel::Err.as_str(),
                            data: Some(format!("ERROR: invalid request: {err}\n")),
                            code: None,
                        },
                    )
                    .await;
                    let _ = write_exit(&mut send, 1).await;
                    return;
                }
            },
            Err(err) => {
                warn!(%err, "control connection read error");
                return;
            }
        };

        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(64);
        let out = ChannelWriter::new(Channel::Out, frame_tx.clone());
        let err = ChannelWriter::new(Channel::Err, frame_tx.clone());
        let report = ChannelWriter::new(Channel::Err, frame_tx.clone());
        drop(frame_tx);

        let (mut input_writer, input_reader) = tokio::io::duplex(8 * 1024);
        let streams = CommandStreams {
            out: Box::new(out),
            err: Box::new(err),
            input: Box::new(input_reader),
        };

        let dispatch = tokio::spawn(async move {
            forward_command(&table, "supervisor", request.args, streams, Box::new(report)).await
        });

        // Forward any client input frames into the handler's input channel;
        // dropping the writer on client EOF closes that channel.
        let input_task = tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ClientFrame>(trimmed) {
                            Ok(frame) if frame.channel == "in" => {
                                if input_writer.write_all(frame.data.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            Ok(frame) => {
                                warn!(channel = %frame.channel, "unexpected client frame channel");
                            }
                            Err(err) => {
                                warn!(%err, "malformed client frame");
                            }
                        }
                    }
                    Err(err) => {
                        warn!(%err, "control connection input read error");
                        break;
                    }
                }
            }
        });

        while let Some(frame) = frame_rx.recv().await {
            let wire = WireFrame {
                channel: frame.channel.as_str(),
                data: Some(String::from_utf8_lossy(&frame.data).into_owned()),
                code: None,
            };
            if write_frame(&mut send, &wire).await.is_err() {
                warn!("client went away mid-response");
                break;
            }
        }

        // If the pump broke out early the handler may still be writing;
        // closing the frame channel turns those writes into BrokenPipe so
        // the dispatch task can finish instead of pending on a full channel.
        drop(frame_rx);

        let status = dispatch.await.unwrap_or(1);
        let _ = write_exit(&mut send, status).await;
        input_task.abort();

        info!(status, "control connection closed");
    }
    .instrument(span)
    .await;
}

async fn write_frame(
    send: &mut (impl tokio::io::AsyncWrite + Unpin),
    frame: &WireFrame<'_>,
) -> std::io::Result<()> {
    let mut line = serde_json::to_string(frame)
        .unwrap_or_else(|_| r#"{"channel":"err","data":"ERROR: frame serialization failed\n"}"#.to_owned());
    line.push('\n');
    send.write_all(line.as_bytes()).await
}

async fn write_exit(
    send: &mut (impl tokio::io::AsyncWrite + Unpin),
    code: i32,
) -> std::io::Result<()> {
    write_frame(
        send,
        &WireFrame {
            channel: "exit",
            data: None,
            code: Some(code),
        },
    )
    .await
}
