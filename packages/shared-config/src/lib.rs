//! Shared configuration types for Resonance clients
//!
//! This crate provides the configuration consumed by the client-side sync
//! and playback session services, ensuring every client loads it the same way.

mod error;
mod playback;
mod server;

pub use error::{ConfigError, ConfigResult};
pub use playback::PlaybackConfig;
pub use server::ServerConfig;

use std::env;
use std::path::PathBuf;

/// Common configuration shared by all client processes
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote service endpoints
    pub server: ServerConfig,

    /// Playback session settings
    pub playback: PlaybackConfig,

    /// File holding persisted client state (sync cursor, join preference)
    pub state_path: PathBuf,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl ClientConfig {
    /// Load client configuration from environment variables
    ///
    /// In production the API must be reached over TLS and an auth token
    /// must be present.
    pub fn from_env() -> ConfigResult<Self> {
        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .parse()
            .unwrap_or_default();

        let server = ServerConfig::from_env()?;
        if environment.is_production() {
            if !server.api_url.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "RESONANCE_API_URL must use https in production".to_string(),
                ));
            }
            if server.auth_token.is_none() {
                return Err(ConfigError::MissingEnvVar(
                    "RESONANCE_AUTH_TOKEN".to_string(),
                ));
            }
        }

        Ok(Self {
            server,
            playback: PlaybackConfig::from_env()?,
            state_path: PathBuf::from(get_env_or_default(
                "RESONANCE_STATE_PATH",
                "./resonance-client-state.json",
            )),
            environment,
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
