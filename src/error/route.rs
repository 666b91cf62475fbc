// Inbound message routing error types

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Log a routing error
///
/// Malformed inbound messages are dropped; the next message is independent,
/// so no recovery action follows the diagnostic.
pub fn log_route_error(err: &RouteError, context: &str) {
    warn!(
        "Route error in {}: code={}, component=MessageRouter, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Inbound message errors
///
/// Error code range: 4001-4002
#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    /// Payload is not valid JSON or a field has the wrong type
    Malformed { reason: String },

    /// Payload is valid JSON but not an object envelope
    UnsupportedShape { reason: String },
}

impl ErrorCode for RouteError {
    fn code(&self) -> i32 {
        match self {
            RouteError::Malformed { .. } => 4001,
            RouteError::UnsupportedShape { .. } => 4002,
        }
    }

    fn message(&self) -> String {
        match self {
            RouteError::Malformed { reason } => format!("Malformed message: {}", reason),
            RouteError::UnsupportedShape { reason } => {
                format!("Unsupported message shape: {}", reason)
            }
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RouteError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RouteError {}
