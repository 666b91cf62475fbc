//! Core telemetry event types describing diagnostics data exposed to the
//! CLI and the debug HTTP surface.

use serde::{Deserialize, Serialize};

use crate::stream::ConnectionState;

/// Why an outbound frame never reached the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Connection state was not `Connected`
    NotConnected,
    /// Socket writer went away between the state check and the write
    TransportClosed,
    /// The previous write had not reached the socket yet
    Backpressure,
    /// The manager was torn down
    Stopped,
}

/// Classification of an inbound message, as seen by the router.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Control,
    ServerError,
    Result,
    Malformed,
}

/// Metric events covering connection lifecycle, frame flow, and routing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    ConnectionTransition {
        state: ConnectionState,
        timestamp_ms: u64,
    },
    ReconnectScheduled {
        delay_ms: u64,
    },
    FrameSent {
        bytes: usize,
        avg_bytes: f32,
        max_bytes: usize,
    },
    FrameDropped {
        reason: DropReason,
    },
    HeartbeatSent,
    MessageRouted {
        kind: RouteKind,
    },
    Emergency {
        explicit: bool,
    },
    Error {
        code: i32,
        context: String,
    },
}
