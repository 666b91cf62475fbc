// Capture device error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a device error with structured context
pub fn log_device_error(err: &DeviceError, context: &str) {
    error!(
        "Device error in {}: code={}, component=FrameSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Camera acquisition errors
///
/// A device error is terminal for the capture side of a session: the frame
/// loop stops, while the socket layer keeps connecting.
///
/// Error code range: 2001-2005
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No capture device or source file could be found
    NotFound { device: String },

    /// Camera permission denied
    PermissionDenied,

    /// Another instance already holds this device
    Busy { device: String },

    /// The capture handle was already released
    Released,

    /// Underlying I/O or decode failure while opening the source
    Io { details: String },
}

impl ErrorCode for DeviceError {
    fn code(&self) -> i32 {
        match self {
            DeviceError::NotFound { .. } => 2001,
            DeviceError::PermissionDenied => 2002,
            DeviceError::Busy { .. } => 2003,
            DeviceError::Released => 2004,
            DeviceError::Io { .. } => 2005,
        }
    }

    fn message(&self) -> String {
        match self {
            DeviceError::NotFound { device } => format!("Capture device not found: {}", device),
            DeviceError::PermissionDenied => "Camera permission denied".to_string(),
            DeviceError::Busy { device } => {
                format!("Capture device {} is held by another session", device)
            }
            DeviceError::Released => "Capture handle already released".to_string(),
            DeviceError::Io { details } => format!("Capture I/O error: {}", details),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DeviceError {}

/// Convert from std::io::Error to DeviceError
impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
            _ => DeviceError::Io {
                details: err.to_string(),
            },
        }
    }
}
