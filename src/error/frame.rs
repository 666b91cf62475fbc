// Frame encoding error types

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Log a frame error
///
/// Encoding failures only cost one frame, so they are logged at warn level.
pub fn log_frame_error(err: &FrameError, context: &str) {
    warn!(
        "Frame error in {}: code={}, component=FrameEncoder, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Frame encode/decode errors
///
/// Error code range: 3001-3003
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Source frame has zero width or height
    EmptyFrame,

    /// JPEG encoding failed
    Encode { reason: String },

    /// Payload could not be parsed back into an image
    Decode { reason: String },
}

impl ErrorCode for FrameError {
    fn code(&self) -> i32 {
        match self {
            FrameError::EmptyFrame => 3001,
            FrameError::Encode { .. } => 3002,
            FrameError::Decode { .. } => 3003,
        }
    }

    fn message(&self) -> String {
        match self {
            FrameError::EmptyFrame => "Source frame is empty".to_string(),
            FrameError::Encode { reason } => format!("Frame encode failed: {}", reason),
            FrameError::Decode { reason } => format!("Frame decode failed: {}", reason),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_codes() {
        assert_eq!(FrameError::EmptyFrame.code(), 3001);
        assert_eq!(
            FrameError::Encode {
                reason: "x".to_string()
            }
            .code(),
            3002
        );
        assert_eq!(
            FrameError::Decode {
                reason: "x".to_string()
            }
            .code(),
            3003
        );
    }
}
