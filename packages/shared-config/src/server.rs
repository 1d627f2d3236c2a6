//! Server endpoint configuration types

use url::Url;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Default REST API base URL
const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Path of the WebSocket endpoint relative to the API host
const WS_PATH: &str = "/v1/ws";

/// Remote catalog/user service endpoints
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// REST API base URL (e.g., https://music.example.com)
    pub api_url: String,

    /// WebSocket URL used for sync pushes and the playback session protocol
    pub ws_url: String,

    /// Bearer token for authenticated requests (optional)
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl ServerConfig {
    /// Load server configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let api_url = get_env_or_default("RESONANCE_API_URL", DEFAULT_API_URL);
        validate_url("RESONANCE_API_URL", &api_url, &["http", "https"])?;

        let ws_url = match std::env::var("RESONANCE_WS_URL") {
            Ok(url) if !url.is_empty() => {
                validate_url("RESONANCE_WS_URL", &url, &["ws", "wss"])?;
                url
            }
            _ => derive_ws_url(&api_url)?,
        };

        Ok(Self {
            api_url,
            ws_url,
            auth_token: std::env::var("RESONANCE_AUTH_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            request_timeout_secs: parse_env("RESONANCE_REQUEST_TIMEOUT", 10)?,
            connect_timeout_secs: parse_env("RESONANCE_CONNECT_TIMEOUT", 5)?,
        })
    }

    /// Create a configuration with a custom API URL (useful for testing)
    pub fn with_url(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        let ws_url = derive_ws_url(&api_url).unwrap_or_else(|_| api_url.clone());
        Self {
            api_url,
            ws_url,
            ..Self::default()
        }
    }

    /// Full URL of the sync state endpoint
    pub fn sync_state_url(&self) -> String {
        format!("{}/v1/sync/state", self.api_url.trim_end_matches('/'))
    }

    /// Full URL of the sync events endpoint
    pub fn sync_events_url(&self) -> String {
        format!("{}/v1/sync/events", self.api_url.trim_end_matches('/'))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: format!("ws://localhost:3001{}", WS_PATH),
            auth_token: None,
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

fn validate_url(name: &str, value: &str, schemes: &[&str]) -> ConfigResult<Url> {
    let url =
        Url::parse(value).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl(
            name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Derive the WebSocket URL from the REST base URL (http -> ws, https -> wss)
fn derive_ws_url(api_url: &str) -> ConfigResult<String> {
    let mut url = validate_url("RESONANCE_API_URL", api_url, &["http", "https"])?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| {
        ConfigError::InvalidUrl(
            "RESONANCE_API_URL".to_string(),
            "cannot derive ws url".to_string(),
        )
    })?;
    url.set_path(WS_PATH);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.api_url, "http://localhost:3001");
        assert_eq!(config.ws_url, "ws://localhost:3001/v1/ws");
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_with_url_derives_secure_ws() {
        let config = ServerConfig::with_url("https://music.example.com");
        assert_eq!(config.ws_url, "wss://music.example.com/v1/ws");
    }

    #[test]
    fn test_sync_urls_trim_trailing_slash() {
        let config = ServerConfig::with_url("http://localhost:9000/");
        assert_eq!(config.sync_state_url(), "http://localhost:9000/v1/sync/state");
        assert_eq!(config.sync_events_url(), "http://localhost:9000/v1/sync/events");
    }

    #[test]
    fn test_from_env_rejects_bad_scheme() {
        temp_env::with_vars(
            [
                ("RESONANCE_API_URL", Some("http://localhost:3001")),
                ("RESONANCE_WS_URL", Some("http://localhost:3001/v1/ws")),
            ],
            || {
                let result = ServerConfig::from_env();
                assert!(matches!(
                    result,
                    Err(ConfigError::InvalidUrl(name, _)) if name == "RESONANCE_WS_URL"
                ));
            },
        );
    }

    #[test]
    fn test_from_env_reads_token() {
        temp_env::with_vars(
            [
                ("RESONANCE_API_URL", Some("https://api.example.com")),
                ("RESONANCE_WS_URL", None),
                ("RESONANCE_AUTH_TOKEN", Some("secret")),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.auth_token.as_deref(), Some("secret"));
                assert_eq!(config.ws_url, "wss://api.example.com/v1/ws");
            },
        );
    }
}
