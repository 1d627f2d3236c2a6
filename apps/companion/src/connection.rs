//! WebSocket connection to the Resonance server

use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, instrument};

use resonance_session_sync::ClientMessage;
use resonance_shared_config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Initial reconnect delay
const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnect delay
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, reset after a successful connect
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_DELAY, MAX_DELAY)
    }
}

/// Open the WebSocket, authenticating with the bearer token if one is set
#[instrument(skip(config), fields(url = %config.ws_url))]
pub async fn connect(config: &ServerConfig) -> anyhow::Result<WsStream> {
    let mut request = config
        .ws_url
        .as_str()
        .into_client_request()
        .context("Invalid WebSocket URL")?;
    if let Some(token) = &config.auth_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Auth token is not a valid header value")?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let (stream, response) =
        tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .context("WebSocket connect timed out")?
            .context("WebSocket connect failed")?;

    info!(status = %response.status(), "WebSocket connected");
    Ok(stream)
}

/// Encode an outgoing message as a text frame
pub fn encode(msg: &ClientMessage) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(msg.to_json()?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(4));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_encode_ping() {
        let frame = encode(&ClientMessage::Ping).unwrap();
        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "ping");
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let mut config = ServerConfig::with_url("http://localhost:3001");
        config.ws_url = "not a url".to_string();
        assert!(connect(&config).await.is_err());
    }
}
