//! Byte-stream channels between a command handler and the invoking client.
//!
//! A handler's output and error channels are [`ChannelWriter`]s: `AsyncWrite`
//! adapters that frame written bytes onto the connection's frame queue. The
//! connection pump serializes frames as newline-delimited JSON toward the
//! client. The wire surface is text-oriented (handlers write lines of
//! UTF-8), matching the command/response character of the protocol.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Which response channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Handler output (processing data/info).
    Out,
    /// Handler errors, health-check info, out-of-band protocol.
    Err,
}

impl Channel {
    /// Wire name of the channel.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::Err => "err",
        }
    }
}

/// One chunk of handler output bound for the client.
#[derive(Debug)]
pub struct Frame {
    /// Channel the bytes were written to.
    pub channel: Channel,
    /// Raw bytes as written by the handler.
    pub data: Vec<u8>,
}

/// Response frame as serialized onto the IPC socket.
#[derive(Debug, Serialize)]
pub struct WireFrame<'a> {
    /// Channel name: `out`, `err`, or `exit`.
    pub channel: &'a str,
    /// Frame payload (absent on the exit frame).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Command status code (exit frame only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

/// Frame sent by the client after the request line: forwarded input bytes
/// for the handler's input channel.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    /// Must be `in`.
    pub channel: String,
    /// Input payload.
    pub data: String,
}

/// `AsyncWrite` half of one response channel.
///
/// Cloneable: the dispatch boilerplate keeps its own handle to the error
/// channel while the handler owns the primary pair. The connection closes
/// once every writer for it has been dropped or shut down.
#[derive(Clone)]
pub struct ChannelWriter {
    channel: Channel,
    sender: PollSender<Frame>,
}

impl ChannelWriter {
    /// Create a writer framing bytes onto `sender` under `channel`.
    #[must_use]
    pub fn new(channel: Channel, sender: mpsc::Sender<Frame>) -> Self {
        Self {
            channel,
            sender: PollSender::new(sender),
        }
    }
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match ready!(self.sender.poll_reserve(cx)) {
            Ok(()) => {
                let frame = Frame {
                    channel: self.channel,
                    data: buf.to_vec(),
                };
                if self.sender.send_item(frame).is_err() {
                    return Poll::Ready(Err(std::io::Error::from(
                        std::io::ErrorKind::BrokenPipe,
                    )));
                }
                Poll::Ready(Ok(buf.len()))
            }
            Err(_) => Poll::Ready(Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.sender.close();
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
