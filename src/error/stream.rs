// Streaming connection error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a stream error with structured context
///
/// Transport failures are expected during reconnect cycles, so callers on the
/// reconnect path usually prefer `warn!`; this helper is for failures that
/// reach an API boundary.
pub fn log_stream_error(err: &StreamError, context: &str) {
    error!(
        "Stream error in {}: code={}, component=ConnectionManager, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Connection-related errors
///
/// These errors cover socket creation, the manager lifecycle, and outbound
/// transmission. None of them is fatal: transport failures resolve into the
/// `Disconnected` state plus a scheduled retry.
///
/// Error code range: 1001-1004
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The transport could not be created for this endpoint (bad URL, no runtime)
    TransportUnavailable { endpoint: String, reason: String },

    /// The transport was created but the handshake failed
    ConnectFailed { reason: String },

    /// `start()` was already called on this manager instance
    AlreadyStarted,

    /// The manager was torn down and cannot be reused
    Stopped,
}

impl ErrorCode for StreamError {
    fn code(&self) -> i32 {
        match self {
            StreamError::TransportUnavailable { .. } => 1001,
            StreamError::ConnectFailed { .. } => 1002,
            StreamError::AlreadyStarted => 1003,
            StreamError::Stopped => 1004,
        }
    }

    fn message(&self) -> String {
        match self {
            StreamError::TransportUnavailable { endpoint, reason } => {
                format!("Transport unavailable for {}: {}", endpoint, reason)
            }
            StreamError::ConnectFailed { reason } => format!("Connect failed: {}", reason),
            StreamError::AlreadyStarted => {
                "Connection manager already started. Create a new instance to reconnect."
                    .to_string()
            }
            StreamError::Stopped => {
                "Connection manager was stopped and cannot be restarted".to_string()
            }
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StreamError {}
