//! Mock sync server for testing the client sync engine
//!
//! Provides a [`MockSyncServer`] that serves `GET /v1/sync/state` and
//! `GET /v1/sync/events?since=N` from an in-memory event log, so tests can
//! append events, prune the log and inject failures between requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::fixtures::{sync_event, StateFixture};

pub const STATE_PATH: &str = "/v1/sync/state";
pub const EVENTS_PATH: &str = "/v1/sync/events";

/// Server-side view of one user's log
#[derive(Debug)]
struct SyncLog {
    /// Retained events, ascending by seq
    events: Vec<Value>,
    head: i64,
    /// `since` values below this are answered with 410 Gone
    pruned_through: i64,
    /// Snapshot body without `seq`
    state: Value,
    /// Serve event pages newest first
    reverse_pages: bool,
    failure: Option<u16>,
    delay: Option<Duration>,
    since_requests: Vec<i64>,
}

impl SyncLog {
    fn apply_delay(&self, response: ResponseTemplate) -> ResponseTemplate {
        match self.delay {
            Some(delay) => response.set_delay(delay),
            None => response,
        }
    }
}

/// Mock Resonance sync server
///
/// This struct wraps a [`wiremock::MockServer`] with both sync endpoints
/// mounted. Responses are computed per request from the shared log, so a
/// test can change the log while a client is running.
///
/// # Example
///
/// ```rust,ignore
/// use resonance_test_utils::{fixtures, MockSyncServer};
///
/// #[tokio::test]
/// async fn test_sync() {
///     let server = MockSyncServer::start().await;
///     server.push_event(fixtures::content_liked("album", "A1"));
///     server.prune_through(1);
///
///     // Configure your sync client with server.url()
/// }
/// ```
pub struct MockSyncServer {
    server: MockServer,
    log: Arc<Mutex<SyncLog>>,
    state_call_count: Arc<AtomicUsize>,
    events_call_count: Arc<AtomicUsize>,
}

impl MockSyncServer {
    /// Start a new mock sync server with an empty log
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let log = Arc::new(Mutex::new(SyncLog {
            events: Vec::new(),
            head: 0,
            pruned_through: 0,
            state: StateFixture::new().body(),
            reverse_pages: false,
            failure: None,
            delay: None,
            since_requests: Vec::new(),
        }));
        let state_call_count = Arc::new(AtomicUsize::new(0));
        let events_call_count = Arc::new(AtomicUsize::new(0));

        Mock::given(method("GET"))
            .and(path(STATE_PATH))
            .respond_with(StateResponder {
                log: log.clone(),
                calls: state_call_count.clone(),
            })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .respond_with(EventsResponder {
                log: log.clone(),
                calls: events_call_count.clone(),
            })
            .mount(&server)
            .await;

        Self {
            server,
            log,
            state_call_count,
            events_call_count,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Append an event body to the log, returning the full event
    ///
    /// The server assigns the next sequence number. The returned value is
    /// what a `sync` WebSocket push would carry.
    pub fn push_event(&self, event: Value) -> Value {
        let mut log = self.log.lock();
        log.head += 1;
        let event = sync_event(log.head, event);
        log.events.push(event.clone());
        event
    }

    /// Highest committed sequence number
    pub fn head(&self) -> i64 {
        self.log.lock().head
    }

    /// Replace the snapshot served at the current head
    pub fn set_state(&self, state: &StateFixture) {
        self.log.lock().state = state.body();
    }

    /// Drop events up to and including `seq`
    ///
    /// Clients asking for events since a cursor below `seq` get 410 Gone.
    pub fn prune_through(&self, seq: i64) {
        let mut log = self.log.lock();
        log.pruned_through = seq;
        log.events
            .retain(|event| event["seq"].as_i64().unwrap_or_default() > seq);
    }

    /// Serve event pages in descending order
    pub fn reverse_pages(&self, reverse: bool) {
        self.log.lock().reverse_pages = reverse;
    }

    /// Answer every request with `status` until cleared
    pub fn fail_with(&self, status: Option<u16>) {
        self.log.lock().failure = status;
    }

    /// Delay every response (to keep a sync in flight)
    pub fn delay_responses(&self, delay: Option<Duration>) {
        self.log.lock().delay = delay;
    }

    /// Number of `/v1/sync/state` requests served
    pub fn state_calls(&self) -> usize {
        self.state_call_count.load(Ordering::SeqCst)
    }

    /// Number of `/v1/sync/events` requests served
    pub fn events_calls(&self) -> usize {
        self.events_call_count.load(Ordering::SeqCst)
    }

    /// `since` values of every events request, in arrival order
    pub fn since_requests(&self) -> Vec<i64> {
        self.log.lock().since_requests.clone()
    }

    /// Get the underlying MockServer for custom mocks
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}

struct StateResponder {
    log: Arc<Mutex<SyncLog>>,
    calls: Arc<AtomicUsize>,
}

impl Respond for StateResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let log = self.log.lock();

        if let Some(status) = log.failure {
            return log.apply_delay(ResponseTemplate::new(status));
        }

        let mut body = log.state.clone();
        body["seq"] = json!(log.head);
        log.apply_delay(ResponseTemplate::new(200).set_body_json(body))
    }
}

struct EventsResponder {
    log: Arc<Mutex<SyncLog>>,
    calls: Arc<AtomicUsize>,
}

impl Respond for EventsResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let since = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "since")
            .and_then(|(_, value)| value.parse::<i64>().ok());

        let mut log = self.log.lock();
        let Some(since) = since else {
            return ResponseTemplate::new(400)
                .set_body_json(json!({"error": "missing since parameter"}));
        };
        log.since_requests.push(since);

        if let Some(status) = log.failure {
            return log.apply_delay(ResponseTemplate::new(status));
        }

        if since < log.pruned_through {
            return log.apply_delay(
                ResponseTemplate::new(410).set_body_json(json!({"error": "events pruned"})),
            );
        }

        let mut events: Vec<Value> = log
            .events
            .iter()
            .filter(|event| event["seq"].as_i64().unwrap_or_default() > since)
            .cloned()
            .collect();
        if log.reverse_pages {
            events.reverse();
        }

        let body = json!({"events": events, "current_seq": log.head});
        log.apply_delay(ResponseTemplate::new(200).set_body_json(body))
    }
}
