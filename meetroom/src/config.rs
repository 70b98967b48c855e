//! Configuration types and defaults

use crate::error::SetupError;
use meetroom_media::VideoResolution;
use serde::{Deserialize, Serialize};

/// Setup screen configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Camera intent once devices are enumerated
    pub initial_camera_enabled: bool,
    /// Microphone intent once devices are enumerated
    pub initial_mic_enabled: bool,
    /// Ideal preview resolution, `None` leaves it to the platform
    pub preview_resolution: Option<VideoResolution>,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    /// Wrap the platform in a handle audit
    pub audit_handles: bool,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            initial_camera_enabled: true,
            initial_mic_enabled: true,
            preview_resolution: Some(VideoResolution::HD),
            event_buffer: 100,
            audit_handles: false,
            debug_logging: false,
        }
    }
}

impl SetupConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, SetupError> {
        let config: Self = serde_json::from_str(json).map_err(|e| SetupError::Config {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.event_buffer == 0 {
            return Err(SetupError::Config {
                reason: "event_buffer must be greater than zero".to_string(),
            });
        }
        if let Some(resolution) = self.preview_resolution {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(SetupError::Config {
                    reason: format!(
                        "preview_resolution {}x{} has a zero dimension",
                        resolution.width, resolution.height
                    ),
                });
            }
        }
        Ok(())
    }
}
