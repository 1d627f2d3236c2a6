//! Playback session configuration types

use std::time::Duration;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Device types the playback session protocol accepts
const SUPPORTED_DEVICE_TYPES: &[&str] = &["web", "android", "ios"];

/// Multi-device playback session configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Human-readable device name announced in `playback.hello`
    pub device_name: String,

    /// Device type announced in `playback.hello` (web, android, ios)
    pub device_type: String,

    /// Interval of the periodic state+queue broadcast while audio device
    pub broadcast_interval_ms: u64,

    /// Client-side backstop for a stuck ownership transfer
    pub transfer_timeout_ms: u64,

    /// Frame interval of the remote progress interpolation loop
    pub interpolation_frame_ms: u64,
}

impl PlaybackConfig {
    /// Load playback configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let device_type = get_env_or_default("RESONANCE_DEVICE_TYPE", "web").to_lowercase();
        if !SUPPORTED_DEVICE_TYPES.contains(&device_type.as_str()) {
            return Err(ConfigError::InvalidValue(
                "RESONANCE_DEVICE_TYPE".to_string(),
                format!("expected one of {:?}, got '{}'", SUPPORTED_DEVICE_TYPES, device_type),
            ));
        }

        let config = Self {
            device_name: get_env_or_default("RESONANCE_DEVICE_NAME", "Resonance Companion"),
            device_type,
            broadcast_interval_ms: parse_env("RESONANCE_BROADCAST_INTERVAL_MS", 5_000)?,
            transfer_timeout_ms: parse_env("RESONANCE_TRANSFER_TIMEOUT_MS", 15_000)?,
            interpolation_frame_ms: parse_env("RESONANCE_INTERPOLATION_FRAME_MS", 250)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.device_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device name cannot be empty".to_string(),
            ));
        }
        if self.broadcast_interval_ms == 0 || self.interpolation_frame_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timer intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn interpolation_frame(&self) -> Duration {
        Duration::from_millis(self.interpolation_frame_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_name: "Resonance Companion".to_string(),
            device_type: "web".to_string(),
            broadcast_interval_ms: 5_000,
            transfer_timeout_ms: 15_000,
            interpolation_frame_ms: 250,
        }
    }
}
