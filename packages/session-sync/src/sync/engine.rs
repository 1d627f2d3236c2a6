//! Cursor-based replication of the user event log
//!
//! The engine keeps a local mirror equal to the server state as of the
//! persisted cursor. It pulls a full snapshot when it has nothing to build
//! on, otherwise replays events after the cursor, and applies live pushes
//! that arrive in order. Any discontinuity falls back to a full sync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::api::SyncApi;
use super::cursor::SyncCursor;
use super::events::{EventsPage, SyncEvent};
use super::mirror::{EventApplier, UserStateMirror};
use crate::error::{SyncError, SyncResult};
use crate::store::KeyValueStore;

/// Capacity of the update broadcast channel
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted after each sync outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// Mirror was replaced by a snapshot at `seq`
    FullSyncCompleted { seq: i64 },
    /// Events `from..=to` were applied on top of the mirror
    EventsApplied { from: i64, to: i64 },
    /// A sync attempt failed; the mirror was left as it was
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncKind {
    Initialize,
    FullSync,
    CatchUp,
}

struct EngineState<M> {
    mirror: M,
    cursor: i64,
    /// Mirror and persisted cursor may disagree; only a snapshot fixes that
    needs_full_sync: bool,
    last_error: Option<String>,
}

enum PushOutcome {
    Stale,
    Applied,
    Behind,
}

enum PageOutcome {
    UpToDate,
    Applied { from: i64, to: i64 },
    Gap { expected: i64, actual: i64 },
}

/// Clears the in-flight flag when a sync run ends, including on cancellation
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replicates the server's user event log into a local [`EventApplier`]
///
/// All operations take `&self`; share the engine through an `Arc`. At most
/// one network sync runs at a time. Callers that arrive while one is in
/// flight return immediately, and pushes that could not be applied in that
/// window schedule one more catch-up once the current run finishes.
pub struct SyncEngine<A, M = UserStateMirror> {
    api: A,
    cursor_store: SyncCursor,
    state: Mutex<EngineState<M>>,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    updates: broadcast::Sender<SyncUpdate>,
}

impl<A, M> SyncEngine<A, M>
where
    A: SyncApi,
    M: EventApplier,
{
    /// Create an engine, loading the persisted cursor from `store`
    ///
    /// An unreadable cursor is treated as "never synced".
    pub fn new(api: A, mirror: M, store: Arc<dyn KeyValueStore>) -> Self {
        let cursor_store = SyncCursor::new(store);
        let cursor = cursor_store.load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable sync cursor");
            0
        });
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Self {
            api,
            cursor_store,
            state: Mutex::new(EngineState {
                mirror,
                cursor,
                needs_full_sync: false,
                last_error: None,
            }),
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            updates,
        }
    }

    /// Current cursor
    pub fn cursor(&self) -> i64 {
        self.state.lock().cursor
    }

    /// Whether a network sync is running
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Message of the most recent failed sync, cleared by the next success
    pub fn last_sync_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Receive [`SyncUpdate`]s
    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    /// Read the mirror
    pub fn with_mirror<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.state.lock().mirror)
    }

    /// Mutate the mirror outside of replication (draining work queues)
    pub fn with_mirror_mut<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.state.lock().mirror)
    }

    /// Bring the mirror up to date at startup or after reconnecting
    ///
    /// Pulls a full snapshot when there is no cursor or nothing mirrored,
    /// otherwise catches up from the cursor. No-op while a sync is running.
    pub async fn initialize(&self) -> SyncResult<()> {
        self.run_exclusive(SyncKind::Initialize, false).await
    }

    /// Replace the mirror with a fresh server snapshot
    pub async fn full_sync(&self) -> SyncResult<()> {
        self.run_exclusive(SyncKind::FullSync, false).await
    }

    /// Replay events after the cursor
    pub async fn catch_up(&self) -> SyncResult<()> {
        self.run_exclusive(SyncKind::CatchUp, false).await
    }

    /// Handle an event pushed over the WebSocket
    ///
    /// The next expected event is applied immediately. Anything older is
    /// ignored, anything newer triggers a catch-up. While a sync is running
    /// nothing is applied directly; the push schedules one more catch-up so
    /// a snapshot fetched before it cannot move the cursor backwards.
    #[instrument(skip(self, event), fields(seq = event.seq, event_type = event.event.event_type()))]
    pub async fn handle_push(&self, event: SyncEvent) -> SyncResult<()> {
        let outcome = {
            let mut state = self.state.lock();
            if event.seq <= state.cursor {
                PushOutcome::Stale
            } else if event.seq == state.cursor + 1
                && !state.needs_full_sync
                && state.mirror.has_state()
                && !self.is_syncing()
            {
                state.mirror.apply(&event);
                state.cursor = event.seq;
                if let Err(e) = self.cursor_store.save(event.seq) {
                    state.needs_full_sync = true;
                    drop(state);
                    return Err(self.fail(e.into()));
                }
                state.last_error = None;
                PushOutcome::Applied
            } else {
                PushOutcome::Behind
            }
        };

        match outcome {
            PushOutcome::Stale => {
                debug!("Ignoring already applied sync event");
                Ok(())
            }
            PushOutcome::Applied => {
                debug!("Applied pushed sync event");
                self.emit(SyncUpdate::EventsApplied {
                    from: event.seq,
                    to: event.seq,
                });
                Ok(())
            }
            PushOutcome::Behind => {
                debug!("Pushed event is ahead of cursor, catching up");
                self.run_exclusive(SyncKind::CatchUp, true).await
            }
        }
    }

    /// Forget all mirrored state and the persisted cursor
    pub fn logout(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.mirror.clear();
        state.cursor = 0;
        state.needs_full_sync = false;
        state.last_error = None;
        self.cursor_store.clear()?;
        info!("Cleared sync state");
        Ok(())
    }

    async fn run_exclusive(&self, mut kind: SyncKind, coalesce: bool) -> SyncResult<()> {
        loop {
            let Some(guard) = InFlight::acquire(&self.in_flight) else {
                if coalesce {
                    self.rerun.store(true, Ordering::Release);
                }
                debug!(?kind, "Sync already in flight");
                return Ok(());
            };

            loop {
                self.rerun.store(false, Ordering::Release);
                let result = match kind {
                    SyncKind::Initialize => self.run_initialize().await,
                    SyncKind::FullSync => self.run_full_sync().await,
                    SyncKind::CatchUp => self.run_catch_up().await,
                };
                if let Err(e) = result {
                    return Err(self.fail(e));
                }
                self.state.lock().last_error = None;

                if !self.rerun.swap(false, Ordering::AcqRel) {
                    break;
                }
                kind = SyncKind::CatchUp;
            }
            drop(guard);

            // a push may have been coalesced between the last check and release
            if !self.rerun.load(Ordering::Acquire) {
                return Ok(());
            }
            kind = SyncKind::CatchUp;
        }
    }

    async fn run_initialize(&self) -> SyncResult<()> {
        let needs_snapshot = {
            let state = self.state.lock();
            state.cursor == 0 || state.needs_full_sync || !state.mirror.has_state()
        };
        if needs_snapshot {
            self.run_full_sync().await
        } else {
            self.run_catch_up().await
        }
    }

    #[instrument(skip(self))]
    async fn run_full_sync(&self) -> SyncResult<()> {
        let snapshot = self.api.fetch_state().await?;
        let seq = snapshot.seq;

        {
            let mut state = self.state.lock();
            state.mirror.reset(&snapshot);
            state.cursor = seq;
            if let Err(e) = self.cursor_store.save(seq) {
                state.needs_full_sync = true;
                return Err(e.into());
            }
            state.needs_full_sync = false;
        }

        info!(seq, "Full sync completed");
        self.emit(SyncUpdate::FullSyncCompleted { seq });
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_catch_up(&self) -> SyncResult<()> {
        let since = {
            let state = self.state.lock();
            if state.needs_full_sync || !state.mirror.has_state() {
                None
            } else {
                Some(state.cursor)
            }
        };
        let Some(since) = since else {
            debug!("No usable local state, catching up with a full sync");
            return self.run_full_sync().await;
        };

        let page = match self.api.fetch_events_since(since).await {
            Ok(page) => page,
            Err(SyncError::LogPruned { .. }) => {
                info!(since, "Server pruned events past cursor, running full sync");
                return self.run_full_sync().await;
            }
            Err(e) => return Err(e),
        };

        match self.apply_page(page)? {
            PageOutcome::UpToDate => {
                debug!(cursor = self.cursor(), "Already up to date");
                Ok(())
            }
            PageOutcome::Applied { from, to } => {
                info!(from, to, "Caught up on sync events");
                self.emit(SyncUpdate::EventsApplied { from, to });
                Ok(())
            }
            PageOutcome::Gap { expected, actual } => {
                let gap = SyncError::SequenceGap { expected, actual };
                warn!(error = %gap, "Event log is not contiguous, running full sync");
                self.run_full_sync().await
            }
        }
    }

    /// Validate then apply a page of events, persisting after each one
    fn apply_page(&self, page: EventsPage) -> SyncResult<PageOutcome> {
        let mut state = self.state.lock();

        // pushes may have advanced the cursor while the request was running
        let mut events: Vec<SyncEvent> = page
            .events
            .into_iter()
            .filter(|e| e.seq > state.cursor)
            .collect();
        events.sort_by_key(|e| e.seq);

        let mut expected = state.cursor + 1;
        for event in &events {
            if event.seq != expected {
                return Ok(PageOutcome::Gap {
                    expected,
                    actual: event.seq,
                });
            }
            expected += 1;
        }

        let mut applied = None;
        for event in &events {
            state.mirror.apply(event);
            state.cursor = event.seq;
            if let Err(e) = self.cursor_store.save(event.seq) {
                state.needs_full_sync = true;
                return Err(e.into());
            }
            let from = applied.map(|(from, _)| from).unwrap_or(event.seq);
            applied = Some((from, event.seq));
        }

        // the log may hold events this client never receives
        if page.current_seq > state.cursor {
            state.cursor = page.current_seq;
            if let Err(e) = self.cursor_store.save(page.current_seq) {
                state.needs_full_sync = true;
                return Err(e.into());
            }
        }

        Ok(match applied {
            Some((from, to)) => PageOutcome::Applied { from, to },
            None => PageOutcome::UpToDate,
        })
    }

    fn fail(&self, error: SyncError) -> SyncError {
        warn!(error = %error, retryable = error.is_retryable(), "Sync failed");
        let message = error.to_string();
        self.state.lock().last_error = Some(message.clone());
        self.emit(SyncUpdate::Failed { error: message });
        error
    }

    fn emit(&self, update: SyncUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl<A, M> std::fmt::Debug for SyncEngine<A, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SyncEngine")
            .field("cursor", &state.cursor)
            .field("needs_full_sync", &state.needs_full_sync)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
