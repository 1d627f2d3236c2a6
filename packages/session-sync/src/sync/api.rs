//! Sync HTTP API

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use resonance_shared_config::ServerConfig;

use super::events::{EventsPage, FullState};
use crate::error::{SyncError, SyncResult};

/// Source of snapshots and event pages
///
/// The engine is generic over this so tests can drive it without a server.
pub trait SyncApi: Send + Sync {
    /// `GET /v1/sync/state`
    fn fetch_state(&self) -> impl Future<Output = SyncResult<FullState>> + Send;

    /// `GET /v1/sync/events?since=N`
    ///
    /// Returns [`SyncError::LogPruned`] when the server no longer retains
    /// events after `since`.
    fn fetch_events_since(&self, since: i64)
        -> impl Future<Output = SyncResult<EventsPage>> + Send;
}

/// reqwest-backed [`SyncApi`]
///
/// Requests are not retried here; the engine records failures and leaves
/// retry policy to its caller.
#[derive(Clone)]
pub struct HttpSyncApi {
    http_client: Client,
    state_url: String,
    events_url: String,
    auth_token: Option<String>,
}

impl fmt::Debug for HttpSyncApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSyncApi")
            .field("state_url", &self.state_url)
            .field("events_url", &self.events_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpSyncApi {
    pub fn new(config: &ServerConfig) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(2)
            .user_agent(concat!("Resonance/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            state_url: config.sync_state_url(),
            events_url: config.sync_events_url(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Replace the bearer token (after re-login)
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        since: Option<i64>,
    ) -> SyncResult<T> {
        let response = self.authorized(request).send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::GONE => {
                let since = since.unwrap_or_default();
                debug!(since, "Sync log pruned past cursor");
                return Err(SyncError::LogPruned { since });
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Sync request rejected by server");
                return Err(SyncError::Unauthorized);
            }
            status => {
                warn!(status = status.as_u16(), "Sync request failed");
                return Err(SyncError::HttpStatus {
                    status: status.as_u16(),
                });
            }
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl SyncApi for HttpSyncApi {
    #[instrument(skip(self))]
    async fn fetch_state(&self) -> SyncResult<FullState> {
        let state: FullState = self
            .get_json(self.http_client.get(&self.state_url), None)
            .await?;
        debug!(seq = state.seq, "Fetched full sync state");
        Ok(state)
    }

    #[instrument(skip(self))]
    async fn fetch_events_since(&self, since: i64) -> SyncResult<EventsPage> {
        let request = self
            .http_client
            .get(&self.events_url)
            .query(&[("since", since)]);
        let page: EventsPage = self.get_json(request, Some(since)).await?;
        debug!(
            count = page.events.len(),
            current_seq = page.current_seq,
            "Fetched sync events"
        );
        Ok(page)
    }
}
