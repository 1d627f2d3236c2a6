//! Event loop tying the connection, sync engine and playback session together

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};

use resonance_session_sync::messages::{PlaybackTrack, ServerMessage};
use resonance_session_sync::outlet::{LocalOutlet, OutletManager, Progress, RemoteOutlet};
use resonance_session_sync::playback::{
    CoordinatorTick, PlaybackEngine, PlaybackSessionCoordinator, SessionEvent,
};
use resonance_session_sync::sync::{
    HttpSyncApi, LikedContentType, SyncEngine, SyncEvent, SyncUpdate,
};
use resonance_session_sync::{ClientMessage, KeyValueStore, Outbox, ProtocolError};
use resonance_shared_config::ClientConfig;

use crate::commands::{Command, HELP};
use crate::connection::{self, Backoff, WsStream};
use crate::engine::{EngineEvent, HeadlessEngine};

/// Keepalive period while connected
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How often the headless engine checks for a finished track
const CLOCK_INTERVAL: Duration = Duration::from_millis(250);

type UserSync = SyncEngine<HttpSyncApi>;

/// Work for the sync task
#[derive(Debug)]
enum SyncJob {
    Initialize,
    Push(SyncEvent),
}

/// Where an inbound text frame goes
#[derive(Debug)]
enum Inbound {
    Sync(SyncEvent),
    Session(ServerMessage),
}

fn route(text: &str) -> Result<Inbound, ProtocolError> {
    Ok(match ServerMessage::decode(text)? {
        ServerMessage::Sync { event } => Inbound::Sync(event),
        msg => Inbound::Session(msg),
    })
}

/// Run sync jobs one after another so pushes are applied in arrival order
fn spawn_sync_worker(sync: Arc<UserSync>) -> (mpsc::UnboundedSender<SyncJob>, JoinHandle<()>) {
    let (jobs, mut rx) = mpsc::unbounded_channel::<SyncJob>();
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = match job {
                SyncJob::Initialize => sync.initialize().await,
                SyncJob::Push(event) => sync.handle_push(event).await,
            };
            if let Err(e) = result {
                warn!(error = %e, retryable = e.is_retryable(), "Sync failed");
            }
        }
    });
    (jobs, handle)
}

/// Forward stdin lines until EOF
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

async fn next_frame(ws: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match ws {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Headless client process
pub struct App {
    config: ClientConfig,
    engine: Arc<HeadlessEngine>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    coordinator: PlaybackSessionCoordinator<HeadlessEngine>,
    ticks: mpsc::UnboundedReceiver<CoordinatorTick>,
    outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    outlets: OutletManager<HeadlessEngine>,
    session_events: broadcast::Receiver<SessionEvent>,
    progress: watch::Receiver<Progress>,
    sync: Arc<UserSync>,
    sync_updates: broadcast::Receiver<SyncUpdate>,
    sync_jobs: mpsc::UnboundedSender<SyncJob>,
    sync_worker: JoinHandle<()>,
}

impl App {
    pub fn new(config: ClientConfig, sync: Arc<UserSync>, store: Arc<dyn KeyValueStore>) -> Self {
        let (engine, engine_events) = HeadlessEngine::new();
        let engine = Arc::new(engine);
        let (outbox, outgoing) = Outbox::channel();
        let (coordinator, ticks) = PlaybackSessionCoordinator::new(
            engine.clone(),
            outbox.clone(),
            store,
            &config.playback,
        );

        let remote = RemoteOutlet::new(
            outbox,
            coordinator.watch_remote_state(),
            config.playback.interpolation_frame(),
        );
        let progress = remote.watch_progress();
        let outlets = OutletManager::new(LocalOutlet::new(engine.clone()), remote);
        let session_events = coordinator.subscribe();

        let sync_updates = sync.subscribe();
        let (sync_jobs, sync_worker) = spawn_sync_worker(sync.clone());

        Self {
            config,
            engine,
            engine_events,
            coordinator,
            ticks,
            outgoing,
            outlets,
            session_events,
            progress,
            sync,
            sync_updates,
            sync_jobs,
            sync_worker,
        }
    }

    /// Run until Ctrl-C
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut commands = spawn_stdin_reader();
        let mut stdin_open = true;

        let mut backoff = Backoff::default();
        let mut ws: Option<WsStream> = None;
        let reconnect = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_pending = true;

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock = tokio::time::interval(CLOCK_INTERVAL);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            device = %self.config.playback.device_name,
            "Companion running, type `help` for commands"
        );

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Shutting down");
                    break;
                }

                () = &mut reconnect, if ws.is_none() && reconnect_pending => {
                    reconnect_pending = false;
                    match connection::connect(&self.config.server).await {
                        Ok(stream) => {
                            backoff.reset();
                            ws = Some(stream);
                            self.on_connected();
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            warn!(
                                error = %e,
                                delay_secs = delay.as_secs(),
                                "Connect failed, retrying"
                            );
                            reconnect.as_mut().reset(Instant::now() + delay);
                            reconnect_pending = true;
                        }
                    }
                }

                frame = next_frame(&mut ws) => {
                    let closed = match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(text.as_str());
                            false
                        }
                        Some(Ok(Message::Close(reason))) => {
                            info!(?reason, "Server closed the connection");
                            true
                        }
                        Some(Ok(_)) => false,
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            true
                        }
                        None => true,
                    };
                    if closed {
                        ws = None;
                        self.on_disconnected();
                        let delay = backoff.next_delay();
                        reconnect.as_mut().reset(Instant::now() + delay);
                        reconnect_pending = true;
                    }
                }

                Some(msg) = self.outgoing.recv(), if ws.is_some() => {
                    let frame = match connection::encode(&msg) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(
                                error = %e,
                                msg_type = msg.message_type(),
                                "Failed to encode message"
                            );
                            continue;
                        }
                    };
                    trace!(msg_type = msg.message_type(), "Sending");
                    if let Some(stream) = ws.as_mut() {
                        if let Err(e) = stream.send(frame).await {
                            warn!(error = %e, "Failed to send, reconnecting");
                            ws = None;
                            self.on_disconnected();
                            reconnect.as_mut().reset(Instant::now() + backoff.next_delay());
                            reconnect_pending = true;
                        }
                    }
                }

                Some(tick) = self.ticks.recv() => {
                    self.coordinator.handle_tick(tick);
                }

                Some(event) = self.engine_events.recv() => {
                    match event {
                        EngineEvent::Started => self.coordinator.on_local_playback_started(),
                        EngineEvent::StateChanged => self.coordinator.on_local_state_changed(),
                    }
                }

                event = self.session_events.recv() => {
                    match event {
                        Ok(event) => self.on_session_event(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed session events, resyncing outlet");
                            let snapshot = self.engine.snapshot();
                            self.outlets.on_role_changed(self.coordinator.role(), &snapshot);
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }

                Ok(()) = self.progress.changed() => {
                    let progress = *self.progress.borrow_and_update();
                    trace!(
                        position = progress.position,
                        duration = progress.duration,
                        playing = progress.is_playing,
                        "Remote progress"
                    );
                }

                update = self.sync_updates.recv() => {
                    match update {
                        Ok(update) => self.on_sync_update(update),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Missed sync updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }

                line = commands.recv(), if stdin_open => {
                    match line {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => match line.parse::<Command>() {
                            Ok(command) => self.execute(command),
                            Err(e) => println!("{}", e),
                        },
                        None => {
                            debug!("stdin closed");
                            stdin_open = false;
                        }
                    }
                }

                _ = clock.tick() => {
                    self.engine.poll_track_end();
                }

                _ = ping.tick(), if ws.is_some() => {
                    self.coordinator.outbox().send(ClientMessage::Ping);
                }
            }
        }

        if let Some(mut stream) = ws.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "Failed to close WebSocket cleanly");
            }
        }
        self.sync_worker.abort();
        Ok(())
    }

    fn on_connected(&mut self) {
        // anything queued for the previous connection is stale
        while self.outgoing.try_recv().is_ok() {}
        self.coordinator.on_connected();
        if self.sync_jobs.send(SyncJob::Initialize).is_err() {
            warn!("Sync worker stopped");
        }
    }

    fn on_disconnected(&mut self) {
        self.coordinator.on_disconnected();
        while self.outgoing.try_recv().is_ok() {}
    }

    fn handle_text(&mut self, text: &str) {
        match route(text) {
            Ok(Inbound::Sync(event)) => {
                if self.sync_jobs.send(SyncJob::Push(event)).is_err() {
                    warn!("Sync worker stopped");
                }
            }
            Ok(Inbound::Session(msg)) => self.coordinator.handle_message(msg),
            Err(e) => warn!(error = %e, "Ignoring inbound frame"),
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        self.outlets.handle_session_event(&event);
        match &event {
            SessionEvent::RoleChanged { role, .. } => info!(%role, "Session role changed"),
            SessionEvent::SessionAvailable { audio_device_id } => {
                println!(
                    "Another device ({}) is playing, type `join` to control it",
                    audio_device_id.map_or_else(|| "unknown".to_string(), |id| id.to_string())
                );
            }
            SessionEvent::SessionEnded { reason } => info!(%reason, "Session ended"),
            SessionEvent::TransferStarted { transfer_id } => {
                info!(%transfer_id, "Transfer started");
            }
            SessionEvent::TransferFailed {
                transfer_id,
                reason,
            } => {
                println!("Transfer {} failed: {}", transfer_id, reason);
            }
            SessionEvent::DevicesChanged { devices } => {
                debug!(count = devices.len(), "Device list changed");
            }
            SessionEvent::RemoteStateUpdated(_) | SessionEvent::RemoteQueueUpdated(_) => {}
        }
    }

    fn on_sync_update(&mut self, update: SyncUpdate) {
        match update {
            SyncUpdate::FullSyncCompleted { seq } => info!(seq, "User state synced"),
            SyncUpdate::EventsApplied { from, to } => debug!(from, to, "Applied sync events"),
            SyncUpdate::Failed { error } => warn!(%error, "User state sync failed"),
        }
        let invalidated = self.sync.with_mirror_mut(|mirror| mirror.take_invalidated());
        if !invalidated.is_empty() {
            info!(?invalidated, "Catalog caches invalidated");
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Play => self.outlets.play(),
            Command::Pause => self.outlets.pause(),
            Command::Next => self.outlets.skip_next(),
            Command::Prev => self.outlets.skip_previous(),
            Command::Seek(position) => self.outlets.seek(position),
            Command::SeekPercent(percent) => self.outlets.seek_to_percentage(percent),
            Command::Volume(volume) => self.outlets.set_volume(volume),
            Command::Mute(muted) => self.outlets.set_muted(muted),
            Command::Forward => self.outlets.forward_10_sec(),
            Command::Rewind => self.outlets.rewind_10_sec(),
            Command::Load { id, duration } => {
                let track = PlaybackTrack {
                    title: id.clone(),
                    id,
                    artist_id: String::new(),
                    artist_name: String::new(),
                    album_id: String::new(),
                    album_title: String::new(),
                    duration,
                    track_number: None,
                    image_id: None,
                };
                if let Err(e) = self.outlets.load_track(track) {
                    println!("{}", e);
                }
            }
            Command::Join => {
                if !self.coordinator.enter_remote_mode() {
                    println!("No other device is playing");
                }
            }
            Command::Leave => self.coordinator.exit_remote_mode(),
            Command::Takeover => match self.coordinator.request_takeover() {
                Some(transfer_id) => println!("Requested takeover {}", transfer_id),
                None => println!("Join a session before taking it over"),
            },
            Command::Release => {
                if !self.coordinator.unregister() {
                    println!("This device is not playing for the session");
                }
            }
            Command::Prefer(preference) => {
                match self.coordinator.set_join_preference(preference) {
                    Ok(()) => println!("Join preference: {}", preference.as_str()),
                    Err(e) => println!("Failed to save preference: {}", e),
                }
            }
            Command::Status => self.print_status(),
            Command::Logout => match self.sync.logout() {
                Ok(()) => println!("Cleared synced state"),
                Err(e) => println!("Logout failed: {}", e),
            },
            Command::Help => println!("{}", HELP),
        }
    }

    fn print_status(&self) {
        let progress = self.outlets.progress();
        println!(
            "role: {}  device: {}  devices online: {}",
            self.coordinator.role(),
            self.coordinator
                .device_id()
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            self.coordinator.devices().len(),
        );
        println!(
            "progress: {:.1}/{:.1}s {}",
            progress.position,
            progress.duration,
            if progress.is_playing { "playing" } else { "paused" },
        );
        let (liked, playlists, unread) = self.sync.with_mirror(|mirror| {
            (
                mirror.liked(LikedContentType::Track).len(),
                mirror.playlists().count(),
                mirror.unread_notifications(),
            )
        });
        println!(
            "sync cursor: {}  liked tracks: {}  playlists: {}  unread: {}{}",
            self.sync.cursor(),
            liked,
            playlists,
            unread,
            self.sync
                .last_sync_error()
                .map(|e| format!("  last error: {}", e))
                .unwrap_or_default(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_route_sync_push() {
        let text = r#"{"type":"sync","payload":{"event":{"seq":7,"type":"notification_read","payload":{"notification_id":"n1","read_at":1700000000},"server_timestamp":1700000000}}}"#;
        assert_matches!(route(text), Ok(Inbound::Sync(event)) if event.seq == 7);
    }

    #[test]
    fn test_route_session_message() {
        let text = r#"{"type":"connected","payload":{"device_id":3}}"#;
        assert_matches!(
            route(text),
            Ok(Inbound::Session(ServerMessage::Connected { device_id: 3 }))
        );
    }

    #[test]
    fn test_route_rejects_unknown_type() {
        assert_matches!(
            route(r#"{"type":"mystery","payload":{}}"#),
            Err(ProtocolError::UnknownType(_))
        );
    }
}
