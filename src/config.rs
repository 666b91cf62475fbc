//! Configuration management for the streaming client
//!
//! This module provides runtime configuration loading from JSON files so that
//! the endpoint, timer cadences, and encoder settings can be tuned without
//! recompilation. The two observed panel variants (operator dashboard and
//! vision panel) are captured as [`DeploymentProfile`] presets rather than as
//! duplicated components.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::{FacingMode, FitMode};
use crate::error::ConfigError;

/// Default inference service endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8005/ws/stream";

/// Supported JPEG quality range on a 0-1 scale
pub const QUALITY_RANGE: std::ops::RangeInclusive<f32> = 0.1..=0.9;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

/// Connection manager parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint of the inference service
    pub endpoint: String,
    /// Fixed delay before the single reconnect attempt after a close
    pub reconnect_delay_ms: u64,
    /// Heartbeat period while connected
    pub heartbeat_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_delay_ms: 2000,
            heartbeat_interval_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "reconnect_delay_ms",
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "heartbeat_interval_ms",
            });
        }
        Ok(())
    }
}

/// Frame capture loop and encoder parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frame loop period
    pub cadence_ms: u64,
    /// Encoded output width in pixels
    pub width: u32,
    /// Encoded output height in pixels
    pub height: u32,
    /// Lossy JPEG quality on a 0-1 scale
    pub quality: f32,
    /// How frames with a different aspect ratio are fitted to the target
    #[serde(default)]
    pub fit: FitMode,
    /// Preferred camera orientation, forwarded to the device
    #[serde(default)]
    pub facing: FacingMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 1000,
            width: 640,
            height: 480,
            quality: 0.6,
            fit: FitMode::default(),
            facing: FacingMode::User,
        }
    }
}

impl CaptureConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cadence_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "cadence_ms",
            });
        }
        validate_encoder_settings(self.width, self.height, self.quality)
    }
}

/// Shared by [`CaptureConfig::validate`] and `FrameEncoder::new`.
pub(crate) fn validate_encoder_settings(
    width: u32,
    height: u32,
    quality: f32,
) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::InvalidResolution { width, height });
    }
    if !QUALITY_RANGE.contains(&quality) {
        return Err(ConfigError::QualityOutOfRange { quality });
    }
    Ok(())
}

/// Local emergency fallback heuristic parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Enables the local gesture heuristic (test/simulation mode)
    pub simulation_mode: bool,
    /// Gesture tag that counts as a help signal (exact match)
    pub help_signal: String,
    /// Probability the help gesture must exceed
    pub help_threshold: f32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            simulation_mode: false,
            help_signal: "Help".to_string(),
            help_threshold: 0.8,
        }
    }
}

/// Deployment presets for the two panel variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentProfile {
    /// Operator dashboard: 1 fps, quality 0.6, front camera, 2 s reconnect
    #[default]
    Dashboard,
    /// Vision panel: 5 fps, quality 0.8, rear camera, 3 s reconnect
    VisionPanel,
}

impl AppConfig {
    /// Build the configuration for a deployment profile
    pub fn for_profile(profile: DeploymentProfile) -> Self {
        let mut config = Self::default();
        match profile {
            DeploymentProfile::Dashboard => {}
            DeploymentProfile::VisionPanel => {
                config.stream.reconnect_delay_ms = 3000;
                config.capture.cadence_ms = 200;
                config.capture.quality = 0.8;
                config.capture.facing = FacingMode::Environment;
            }
        }
        config
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the default configuration if the file
    /// doesn't exist or the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/guardian_config.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.capture.validate()
    }
}
