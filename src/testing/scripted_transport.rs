//! In-memory transport whose peers are driven by the test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::{Transport, TransportEvent, TransportLink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Plan {
    Refuse,
    Defer(oneshot::Receiver<()>),
}

/// Server side of one scripted connection.
pub struct ScriptedPeer {
    endpoint: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: Mutex<mpsc::Receiver<String>>,
    sent: Mutex<Vec<String>>,
    shutdown: CancellationToken,
}

impl ScriptedPeer {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Deliver a text message to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Text(text.into()));
    }

    /// Simulate the server closing the socket.
    pub fn close(&self) {
        let _ = self.to_client.send(TransportEvent::Closed);
    }

    /// Simulate a socket error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(reason.into()));
    }

    /// Take everything the client has written so far.
    ///
    /// Like a real socket, messages still queued when the client closed the
    /// link are discarded rather than delivered.
    pub fn drain_sent(&self) -> Vec<String> {
        let mut rx = lock(&self.from_client);
        let mut sent = lock(&self.sent);
        if self.shutdown.is_cancelled() {
            rx.close();
            while rx.try_recv().is_ok() {}
        } else {
            while let Ok(text) = rx.try_recv() {
                sent.push(text);
            }
        }
        std::mem::take(&mut *sent)
    }

    /// Whether the client dropped its writer, i.e. closed the socket.
    pub fn client_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Held by a test to release a deferred connect.
pub struct ConnectGate {
    tx: Option<oneshot::Sender<()>>,
}

impl ConnectGate {
    pub fn release(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Outbound slots per scripted link unless overridden
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Transport that hands out in-memory links and records every attempt.
pub struct ScriptedTransport {
    attempts: AtomicUsize,
    plans: Mutex<VecDeque<Plan>>,
    peers: Mutex<Vec<Arc<ScriptedPeer>>>,
    outbound_capacity: usize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            plans: Mutex::new(VecDeque::new()),
            peers: Mutex::new(Vec::new()),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links whose outbound channel holds only `capacity` unread messages.
    pub fn with_outbound_capacity(capacity: usize) -> Self {
        Self {
            outbound_capacity: capacity.max(1),
            ..Self::default()
        }
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        let mut plans = lock(&self.plans);
        for _ in 0..count {
            plans.push_back(Plan::Refuse);
        }
    }

    /// Hold the next connection attempt open until the gate is released.
    pub fn defer_next(&self) -> ConnectGate {
        let (tx, rx) = oneshot::channel();
        lock(&self.plans).push_back(Plan::Defer(rx));
        ConnectGate { tx: Some(tx) }
    }

    pub fn peers(&self) -> Vec<Arc<ScriptedPeer>> {
        lock(&self.peers).clone()
    }

    pub fn last_peer(&self) -> Option<Arc<ScriptedPeer>> {
        lock(&self.peers).last().cloned()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<TransportLink, StreamError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = lock(&self.plans).pop_front();

        if let Some(Plan::Refuse) = plan {
            let reason = format!("connection to {} refused", endpoint);
            return async move { Err(StreamError::ConnectFailed { reason }) }.boxed();
        }

        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        lock(&self.peers).push(Arc::new(ScriptedPeer {
            endpoint: endpoint.to_string(),
            to_client: in_tx,
            from_client: Mutex::new(out_rx),
            sent: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        }));
        let link = TransportLink::new(out_tx, in_rx, shutdown);

        match plan {
            Some(Plan::Defer(gate)) => async move {
                let _ = gate.await;
                Ok(link)
            }
            .boxed(),
            _ => async move { Ok(link) }.boxed(),
        }
    }
}
