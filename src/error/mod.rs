// Error types for the guardian link client
//
// This module defines structured error types for the streaming connection,
// the capture device, frame encoding, inbound message routing, and
// configuration. Every error carries a numeric code so that telemetry and
// renderers can react to failures without matching on message text.

mod config;
mod device;
mod frame;
mod route;
mod stream;

pub use config::{log_config_error, ConfigError};
pub use device::{log_device_error, DeviceError};
pub use frame::{log_frame_error, FrameError};
pub use route::{log_route_error, RouteError};
pub use stream::{log_stream_error, StreamError};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent reporting through the
/// telemetry hub and the renderer channels.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
