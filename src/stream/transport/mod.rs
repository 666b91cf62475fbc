//! Transport abstraction for the connection manager.
//!
//! A [`Transport`] turns an endpoint into a [`TransportLink`]: an outbound
//! text writer plus a stream of inbound lifecycle events. The manager never
//! touches sockets directly, which keeps the state machine testable with a
//! scripted peer.

use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::capture::EncodedFrame;
use crate::error::StreamError;
use crate::telemetry::DropReason;

mod websocket;

pub use websocket::WebSocketTransport;

/// Event surfaced by the inbound half of a link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One complete text message
    Text(String),
    /// The peer closed the socket
    Closed,
    /// The socket failed; treated like a close
    Error(String),
}

/// Message the client puts on the wire.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Encoded frame, sent as its data URL text
    Frame(EncodedFrame),
    /// Heartbeat control envelope `{"type":"ping"}`
    Ping,
}

impl OutboundMessage {
    pub fn into_text(self) -> String {
        match self {
            OutboundMessage::Frame(frame) => frame.into_string(),
            OutboundMessage::Ping => json!({ "type": "ping" }).to_string(),
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, OutboundMessage::Frame(_))
    }
}

/// Factory for socket connections.
pub trait Transport: Send + Sync {
    /// Open a connection. Resolving `Ok` is the "open" event.
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<TransportLink, StreamError>>;
}

/// Write half of an open link.
///
/// Writes never wait: the outbound channel is bounded and a full channel
/// drops the message. Dropping the writer trips the link's shutdown token,
/// which closes the socket without flushing anything still queued.
#[derive(Debug)]
pub struct LinkWriter {
    tx: mpsc::Sender<String>,
    _shutdown: DropGuard,
}

impl LinkWriter {
    /// Queue `text` for the socket, or report why it was dropped.
    pub fn try_send(&self, text: String) -> Result<(), DropReason> {
        self.tx.try_send(text).map_err(|err| match err {
            TrySendError::Full(_) => DropReason::Backpressure,
            TrySendError::Closed(_) => DropReason::TransportClosed,
        })
    }
}

/// Read half of an open link. Dropping it detaches the inbound handler.
#[derive(Debug)]
pub struct LinkReader {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl LinkReader {
    /// Next inbound event; a vanished peer task reads as `Closed`.
    pub async fn next_event(&mut self) -> TransportEvent {
        self.rx.recv().await.unwrap_or(TransportEvent::Closed)
    }
}

/// An open connection as handed to the manager.
#[derive(Debug)]
pub struct TransportLink {
    writer: LinkWriter,
    reader: LinkReader,
}

impl TransportLink {
    /// `shutdown` is cancelled when the writer half is dropped; the socket
    /// tasks behind the link must stop on it.
    pub fn new(
        outbound: mpsc::Sender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            writer: LinkWriter {
                tx: outbound,
                _shutdown: shutdown.drop_guard(),
            },
            reader: LinkReader { rx: inbound },
        }
    }

    pub fn split(self) -> (LinkWriter, LinkReader) {
        (self.writer, self.reader)
    }
}
