//! Diagnostics telemetry collector and helpers.
//!
//! The collector multiplexes connection transitions, frame flow, routing
//! outcomes, and errors into a bounded history plus an async broadcast stream.
//! Running counters are kept separately so that a snapshot stays meaningful
//! after the history has wrapped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::ErrorCode;
use crate::stream::ConnectionState;

pub mod events;

pub use events::{DropReason, MetricEvent, RouteKind};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Monotonic counters exposed alongside the event history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryCounters {
    pub transitions: u64,
    pub reconnects_scheduled: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub heartbeats_sent: u64,
    pub results_routed: u64,
    pub messages_filtered: u64,
    pub messages_malformed: u64,
    pub emergencies: u64,
    pub errors: u64,
}

/// Snapshot of collector state for HTTP/CLI reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
    pub counters: TelemetryCounters,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    /// Forward the broadcast stream into an unbounded channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<MetricEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }

    fn recent(&self) -> Vec<MetricEvent> {
        lock(&self.history).iter().cloned().collect()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window over encoded payload sizes.
struct PayloadTracker {
    samples: VecDeque<usize>,
    max_samples: usize,
}

impl PayloadTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, bytes: usize) -> (f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(bytes);

        let count = self.samples.len();
        let sum: usize = self.samples.iter().sum();
        let max = self.samples.iter().copied().max().unwrap_or(0);
        (sum as f32 / count as f32, max)
    }
}

/// Top-level hub wrapping the collector plus derived counters.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    payloads: Mutex<PayloadTracker>,
    counters: Mutex<TelemetryCounters>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, payload_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            payloads: Mutex::new(PayloadTracker::new(payload_window)),
            counters: Mutex::new(TelemetryCounters::default()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            recent: self.collector.recent(),
            total_events: self.collector.total_events.load(Ordering::Relaxed),
            dropped_events: self.collector.dropped_history.load(Ordering::Relaxed),
            counters: self.counters(),
        }
    }

    pub fn counters(&self) -> TelemetryCounters {
        lock(&self.counters).clone()
    }

    fn bump(&self, update: impl FnOnce(&mut TelemetryCounters)) {
        update(&mut lock(&self.counters));
    }

    pub fn record_transition(&self, state: ConnectionState) {
        self.bump(|c| c.transitions += 1);
        self.collector.publish(MetricEvent::ConnectionTransition {
            state,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_reconnect_scheduled(&self, delay_ms: u64) {
        self.bump(|c| c.reconnects_scheduled += 1);
        self.collector
            .publish(MetricEvent::ReconnectScheduled { delay_ms });
    }

    pub fn record_frame_sent(&self, bytes: usize) {
        self.bump(|c| c.frames_sent += 1);
        let (avg_bytes, max_bytes) = lock(&self.payloads).observe(bytes);
        self.collector.publish(MetricEvent::FrameSent {
            bytes,
            avg_bytes,
            max_bytes,
        });
    }

    pub fn record_frame_dropped(&self, reason: DropReason) {
        self.bump(|c| c.frames_dropped += 1);
        self.collector.publish(MetricEvent::FrameDropped { reason });
    }

    pub fn record_heartbeat(&self) {
        self.bump(|c| c.heartbeats_sent += 1);
        self.collector.publish(MetricEvent::HeartbeatSent);
    }

    pub fn record_route(&self, kind: RouteKind) {
        self.bump(|c| match kind {
            RouteKind::Result => c.results_routed += 1,
            RouteKind::Control | RouteKind::ServerError => c.messages_filtered += 1,
            RouteKind::Malformed => c.messages_malformed += 1,
        });
        self.collector.publish(MetricEvent::MessageRouted { kind });
    }

    pub fn record_emergency(&self, explicit: bool) {
        self.bump(|c| c.emergencies += 1);
        self.collector.publish(MetricEvent::Emergency { explicit });
    }

    pub fn record_error(&self, err: &dyn ErrorCode, context: impl Into<String>) {
        self.bump(|c| c.errors += 1);
        self.collector.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(MetricEvent::HeartbeatSent);
        collector.publish(MetricEvent::FrameDropped {
            reason: DropReason::NotConnected,
        });
        collector.publish(MetricEvent::ReconnectScheduled { delay_ms: 2000 });

        let recent = collector.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0], MetricEvent::HeartbeatSent);
        assert!(matches!(
            recent[2],
            MetricEvent::ReconnectScheduled { delay_ms: 2000 }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let hub = TelemetryHub::new(8, 2, 4);
        hub.record_heartbeat();
        hub.record_heartbeat();
        hub.record_frame_dropped(DropReason::Stopped);

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.total_events, 3);
        // Counters survive history eviction
        assert_eq!(snapshot.counters.heartbeats_sent, 2);
        assert_eq!(snapshot.counters.frames_dropped, 1);
    }

    #[test]
    fn payload_tracker_reports_rolling_average() {
        let hub = TelemetryHub::new(8, 8, 2);
        hub.record_frame_sent(100);
        hub.record_frame_sent(300);
        hub.record_frame_sent(500);

        let last = hub.snapshot().recent.pop().unwrap();
        match last {
            MetricEvent::FrameSent {
                bytes,
                avg_bytes,
                max_bytes,
            } => {
                assert_eq!(bytes, 500);
                // Window of two: (300 + 500) / 2
                assert!((avg_bytes - 400.0).abs() < f32::EPSILON);
                assert_eq!(max_bytes, 500);
            }
            other => panic!("Expected FrameSent, got {:?}", other),
        }
    }

    #[test]
    fn route_kinds_map_to_counters() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_route(RouteKind::Result);
        hub.record_route(RouteKind::Control);
        hub.record_route(RouteKind::ServerError);
        hub.record_route(RouteKind::Malformed);
        hub.record_error(&StreamError::Stopped, "test");

        let counters = hub.counters();
        assert_eq!(counters.results_routed, 1);
        assert_eq!(counters.messages_filtered, 2);
        assert_eq!(counters.messages_malformed, 1);
        assert_eq!(counters.errors, 1);
    }

    #[test]
    fn metric_events_serialize_with_type_tag() {
        let json = serde_json::to_value(MetricEvent::ConnectionTransition {
            state: ConnectionState::Connected,
            timestamp_ms: 7,
        })
        .unwrap();
        assert_eq!(json["type"], "connection_transition");
        assert_eq!(json["payload"]["state"], "connected");
    }
}
