//! WebSocket transport backed by tokio-tungstenite.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use log::debug;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportEvent, TransportLink};
use crate::error::StreamError;

/// One message may wait while another is on the wire; anything more is dropped
const OUTBOUND_CAPACITY: usize = 1;

/// How long a clean close handshake may take before the socket is dropped
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Production transport: one WebSocket per `connect` call.
///
/// Each link runs a writer task and a reader task. Dropping the link's writer
/// stops both: the writer discards its queue and sends a close frame, the
/// reader exits without waiting for the peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<TransportLink, StreamError>> {
        let endpoint = endpoint.to_string();
        async move {
            let (socket, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
                .await
                .map_err(|err| match err {
                    WsError::Url(_) | WsError::HttpFormat(_) => StreamError::TransportUnavailable {
                        endpoint: endpoint.clone(),
                        reason: err.to_string(),
                    },
                    other => StreamError::ConnectFailed {
                        reason: other.to_string(),
                    },
                })?;

            let (mut sink, mut stream) = socket.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
            let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();
            let shutdown = CancellationToken::new();

            let writer_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let text = tokio::select! {
                        biased;
                        _ = writer_shutdown.cancelled() => break,
                        next = out_rx.recv() => match next {
                            Some(text) => text,
                            None => break,
                        },
                    };
                    tokio::select! {
                        biased;
                        // A half-written frame is abandoned with the socket
                        _ = writer_shutdown.cancelled() => return,
                        sent = sink.send(Message::Text(text)) => {
                            if let Err(err) = sent {
                                debug!("[WebSocket] Write failed: {}", err);
                                return;
                            }
                        }
                    }
                }
                // Anything still queued is discarded, never flushed
                out_rx.close();
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
            });

            let reader_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        biased;
                        _ = reader_shutdown.cancelled() => return,
                        frame = stream.next() => frame,
                    };
                    let event = match frame {
                        None => {
                            let _ = in_tx.send(TransportEvent::Closed);
                            return;
                        }
                        Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => TransportEvent::Text(text),
                            Err(_) => {
                                debug!("[WebSocket] Ignoring non-UTF-8 binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(_))) => {
                            let _ = in_tx.send(TransportEvent::Closed);
                            return;
                        }
                        // Protocol-level ping/pong is answered by tungstenite
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                            return;
                        }
                    };
                    if in_tx.send(event).is_err() {
                        return;
                    }
                }
            });

            Ok(TransportLink::new(out_tx, in_rx, shutdown))
        }
        .boxed()
    }
}
