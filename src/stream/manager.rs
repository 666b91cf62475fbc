//! ConnectionManager: owns the socket lifecycle.
//!
//! A single supervisor task per instance drives the state machine:
//! `Disconnected -> Connecting -> Connected -> Disconnected -> (delay) -> Connecting ...`
//! Heartbeat, inbound dispatch and the reconnect delay all live inside that
//! task, so aborting it after cancelling the lifecycle token tears every
//! timer down in one step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use super::state::{ConnectionState, LifecycleToken};
use super::transport::{LinkReader, LinkWriter, OutboundMessage, Transport, TransportEvent};
use crate::config::StreamConfig;
use crate::error::{log_stream_error, StreamError};
use crate::telemetry::{self, DropReason};

/// Callback for connection state changes
pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Callback for raw inbound text messages
pub type MessageCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Result of a `send` call. Sending never errors; it either goes out or is
/// dropped with a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

impl SendOutcome {
    pub fn is_sent(self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

#[derive(Default)]
struct LinkSlot {
    state: ConnectionState,
    writer: Option<LinkWriter>,
}

fn lock(slot: &Mutex<LinkSlot>) -> MutexGuard<'_, LinkSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Manages one logical connection to the inference service.
///
/// Instances are single-use: after [`stop`](Self::stop) the manager refuses
/// to start again and a fresh instance must be created.
pub struct ConnectionManager {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    token: LifecycleToken,
    slot: Arc<Mutex<LinkSlot>>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_token(config, transport, LifecycleToken::new())
    }

    /// Create a manager bound to an externally owned lifecycle token.
    pub fn with_token(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        token: LifecycleToken,
    ) -> Self {
        Self {
            config,
            transport,
            token,
            slot: Arc::new(Mutex::new(LinkSlot::default())),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Begin connecting to `endpoint`.
    ///
    /// Must be called from within a tokio runtime. `on_state` fires once per
    /// actual transition; `on_message` receives every inbound text message in
    /// arrival order. Neither fires after [`stop`](Self::stop).
    ///
    /// # Errors
    /// - `Stopped` if the manager was already torn down
    /// - `AlreadyStarted` on a second call
    /// - `TransportUnavailable` if no runtime is available
    pub fn start(
        &self,
        endpoint: &str,
        on_state: StateCallback,
        on_message: MessageCallback,
    ) -> Result<(), StreamError> {
        if !self.token.is_live() {
            return Err(StreamError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StreamError::AlreadyStarted);
        }

        let runtime = Handle::try_current().map_err(|err| {
            self.started.store(false, Ordering::SeqCst);
            let err = StreamError::TransportUnavailable {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            };
            log_stream_error(&err, "start");
            err
        })?;

        info!("[ConnectionManager] Starting connection to {}", endpoint);
        let supervisor = Supervisor {
            endpoint: endpoint.to_string(),
            transport: Arc::clone(&self.transport),
            token: self.token.clone(),
            slot: Arc::clone(&self.slot),
            on_state,
            on_message,
            reconnect_delay_ms: self.config.reconnect_delay_ms,
            heartbeat_interval: self.config.heartbeat_interval(),
        };
        let handle = runtime.spawn(supervisor.run());
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Transmit a message if and only if the link is currently connected.
    pub fn send(&self, message: OutboundMessage) -> SendOutcome {
        let is_frame = message.is_frame();
        let outcome = send_on_slot(&self.slot, &self.token, message);
        if is_frame {
            if let SendOutcome::Dropped(reason) = outcome {
                telemetry::hub().record_frame_dropped(reason);
            }
        }
        outcome
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.slot).state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether this instance has not been stopped.
    pub fn is_live(&self) -> bool {
        self.token.is_live()
    }

    pub fn token(&self) -> &LifecycleToken {
        &self.token
    }

    /// Tear down the connection. Idempotent, safe before `start` completes.
    ///
    /// Order matters: the token is cancelled before anything is closed so that
    /// the close cannot feed back into the reconnect schedule or callbacks.
    pub fn stop(&self) {
        let first = self.token.cancel();

        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let mut slot = lock(&self.slot);
        // Dropping the writer closes the socket and discards its queue
        slot.writer.take();
        slot.state = ConnectionState::Disconnected;
        drop(slot);

        if first {
            info!("[ConnectionManager] Stopped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_on_slot(
    slot: &Mutex<LinkSlot>,
    token: &LifecycleToken,
    message: OutboundMessage,
) -> SendOutcome {
    if !token.is_live() {
        return SendOutcome::Dropped(DropReason::Stopped);
    }
    let guard = lock(slot);
    let writer = match (guard.state, guard.writer.as_ref()) {
        (ConnectionState::Connected, Some(writer)) => writer,
        _ => return SendOutcome::Dropped(DropReason::NotConnected),
    };

    let frame_len = match &message {
        OutboundMessage::Frame(frame) => Some(frame.len()),
        OutboundMessage::Ping => None,
    };
    match writer.try_send(message.into_text()) {
        Ok(()) => {
            if let Some(bytes) = frame_len {
                telemetry::hub().record_frame_sent(bytes);
            }
            SendOutcome::Sent
        }
        Err(reason) => {
            debug!("[ConnectionManager] Outbound message dropped: {:?}", reason);
            SendOutcome::Dropped(reason)
        }
    }
}

/// State owned by the supervisor task.
struct Supervisor {
    endpoint: String,
    transport: Arc<dyn Transport>,
    token: LifecycleToken,
    slot: Arc<Mutex<LinkSlot>>,
    on_state: StateCallback,
    on_message: MessageCallback,
    reconnect_delay_ms: u64,
    heartbeat_interval: Duration,
}

impl Supervisor {
    async fn run(self) {
        loop {
            self.transition(ConnectionState::Connecting);

            let connect = self.transport.connect(&self.endpoint);
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                result = connect => result,
            };
            if !self.token.is_live() {
                // Resolved after teardown; the stale link is dropped here
                return;
            }

            match result {
                Ok(link) => {
                    let (writer, reader) = link.split();
                    lock(&self.slot).writer = Some(writer);
                    self.transition(ConnectionState::Connected);
                    self.drive_session(reader).await;
                    lock(&self.slot).writer.take();
                }
                Err(err) => {
                    log_stream_error(&err, "connect");
                    telemetry::hub().record_error(&err, "connect");
                }
            }

            if !self.token.is_live() {
                return;
            }
            self.transition(ConnectionState::Disconnected);

            telemetry::hub().record_reconnect_scheduled(self.reconnect_delay_ms);
            info!(
                "[ConnectionManager] Reconnecting in {} ms",
                self.reconnect_delay_ms
            );
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = sleep(Duration::from_millis(self.reconnect_delay_ms)) => {}
            }
        }
    }

    /// Pump heartbeat and inbound events until the link closes or the token
    /// is cancelled.
    async fn drive_session(&self, mut reader: LinkReader) {
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = heartbeat.tick() => {
                    if send_on_slot(&self.slot, &self.token, OutboundMessage::Ping).is_sent() {
                        telemetry::hub().record_heartbeat();
                    }
                }
                event = reader.next_event() => match event {
                    TransportEvent::Text(text) => {
                        tracing::debug!("[ConnectionManager] Inbound message ({} bytes)", text.len());
                        if self.token.is_live() {
                            (self.on_message)(text);
                        }
                    }
                    TransportEvent::Closed => {
                        info!("[ConnectionManager] Connection closed by peer");
                        return;
                    }
                    TransportEvent::Error(reason) => {
                        warn!("[ConnectionManager] Connection error: {}", reason);
                        return;
                    }
                },
            }
        }
    }

    /// Apply a transition; repeated states are swallowed so consumers never
    /// see duplicates. The callback runs outside the lock.
    fn transition(&self, next: ConnectionState) {
        {
            let mut slot = lock(&self.slot);
            if slot.state == next {
                return;
            }
            slot.state = next;
        }
        if !self.token.is_live() {
            return;
        }
        debug!("[ConnectionManager] State -> {:?}", next);
        telemetry::hub().record_transition(next);
        (self.on_state)(next);
    }
}
