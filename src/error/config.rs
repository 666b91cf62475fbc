// Configuration validation errors

use crate::error::ErrorCode;
use log::error;
use std::fmt;

pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Invalid configuration values
///
/// Error code range: 5001-5004
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A timer period is zero (tokio intervals reject zero periods)
    ZeroInterval { field: &'static str },

    /// JPEG quality outside the supported range
    QualityOutOfRange { quality: f32 },

    /// Target resolution has a zero dimension
    InvalidResolution { width: u32, height: u32 },

    /// No endpoint configured
    EmptyEndpoint,
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::ZeroInterval { .. } => 5001,
            ConfigError::QualityOutOfRange { .. } => 5002,
            ConfigError::InvalidResolution { .. } => 5003,
            ConfigError::EmptyEndpoint => 5004,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::ZeroInterval { field } => format!("{} must be greater than 0", field),
            ConfigError::QualityOutOfRange { quality } => {
                format!("JPEG quality must be within 0.1..=0.9 (got {})", quality)
            }
            ConfigError::InvalidResolution { width, height } => {
                format!("Target resolution must be non-zero (got {}x{})", width, height)
            }
            ConfigError::EmptyEndpoint => "Stream endpoint is empty".to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}
