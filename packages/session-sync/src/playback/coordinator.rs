//! Multi-device playback session state machine
//!
//! Each connected device is `Idle`, the session's `AudioDevice`, or a
//! `Remote` controller of another device's playback. The server arbitrates
//! who renders audio; this side only ever becomes `AudioDevice` after a
//! positive `register_ack` or a `become_audio_device` for a transfer it
//! started itself.
//!
//! The coordinator is driven from a single task: inbound frames go to
//! [`handle_message`](PlaybackSessionCoordinator::handle_message), timer
//! ticks to [`handle_tick`](PlaybackSessionCoordinator::handle_tick), and
//! outgoing messages leave through the [`Outbox`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use resonance_shared_config::PlaybackConfig;

use super::engine::{PlaybackEngine, PlaybackSnapshot};
use super::interpolation::{interpolate_position, now_millis};
use super::preference::RemoteJoinPreference;
use super::registry::DeviceRegistry;
use crate::error::StoreResult;
use crate::messages::{
    ClientMessage, ConnectedDevice, DeviceListChangedPayload, DeviceType, PlaybackCommand,
    PlaybackErrorPayload, PlaybackState, PrepareTransferPayload, QueueSnapshot,
    RegisterAckPayload, ServerMessage, TransferSnapshot, WelcomePayload,
};
use crate::outbox::Outbox;
use crate::store::KeyValueStore;
use crate::timer::ScheduledTask;

/// Capacity of the session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Role of this device in the account's playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    #[default]
    Idle,
    AudioDevice,
    Remote,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AudioDevice => write!(f, "audio_device"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Correlates the messages of one ownership transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTicket {
    pub transfer_id: String,
    /// Device that asked for the transfer
    pub initiator_device_id: Option<usize>,
}

impl TransferTicket {
    fn generate(initiator_device_id: Option<usize>) -> Self {
        Self {
            transfer_id: Uuid::new_v4().to_string(),
            initiator_device_id,
        }
    }
}

/// Timer events fed back into the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorTick {
    /// Periodic state+queue broadcast
    Broadcast,
    /// A transfer handshake ran past its deadline
    TransferTimeout { transfer_id: String },
}

/// Notification for UI layers and outlets
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Role changed; `snapshot` is the state the new role starts from
    RoleChanged {
        role: SessionRole,
        snapshot: PlaybackSnapshot,
    },
    RemoteStateUpdated(PlaybackState),
    RemoteQueueUpdated(QueueSnapshot),
    /// Another device is playing and this one could join
    SessionAvailable { audio_device_id: Option<usize> },
    SessionEnded { reason: String },
    TransferStarted { transfer_id: String },
    TransferFailed { transfer_id: String, reason: String },
    DevicesChanged { devices: Vec<ConnectedDevice> },
}

/// What this device knows about the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub exists: bool,
    pub audio_device_id: Option<usize>,
    pub reclaimable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRegistration {
    Register,
    Reclaim,
}

/// Transfer this device asked for
struct OutgoingTransfer {
    ticket: TransferTicket,
    _timeout: ScheduledTask,
}

/// Transfer away from this device
struct IncomingTransfer {
    ticket: TransferTicket,
    resume_on_abort: bool,
    _timeout: ScheduledTask,
}

/// Playback session coordinator for one device
pub struct PlaybackSessionCoordinator<E: PlaybackEngine> {
    engine: Arc<E>,
    outbox: Outbox,
    store: Arc<dyn KeyValueStore>,
    device_name: String,
    device_type: DeviceType,
    broadcast_interval: Duration,
    transfer_timeout: Duration,

    role: SessionRole,
    device_id: Option<usize>,
    registry: DeviceRegistry,
    session: SessionView,
    remote_state: Option<PlaybackState>,
    remote_queue: Option<QueueSnapshot>,
    pending_registration: Option<PendingRegistration>,
    outgoing_transfer: Option<OutgoingTransfer>,
    incoming_transfer: Option<IncomingTransfer>,
    broadcast_timer: Option<ScheduledTask>,
    last_broadcast_queue_version: Option<u64>,

    ticks: mpsc::UnboundedSender<CoordinatorTick>,
    role_tx: watch::Sender<SessionRole>,
    remote_state_tx: watch::Sender<Option<PlaybackState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl<E: PlaybackEngine> PlaybackSessionCoordinator<E> {
    /// Create a coordinator and the tick receiver its owner must drain
    pub fn new(
        engine: Arc<E>,
        outbox: Outbox,
        store: Arc<dyn KeyValueStore>,
        config: &PlaybackConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorTick>) {
        let device_type = config.device_type.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to web device type");
            DeviceType::Web
        });
        let (ticks, tick_rx) = mpsc::unbounded_channel();
        let (role_tx, _) = watch::channel(SessionRole::Idle);
        let (remote_state_tx, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let coordinator = Self {
            engine,
            outbox,
            store,
            device_name: config.device_name.clone(),
            device_type,
            broadcast_interval: config.broadcast_interval(),
            transfer_timeout: config.transfer_timeout(),
            role: SessionRole::Idle,
            device_id: None,
            registry: DeviceRegistry::new(),
            session: SessionView::default(),
            remote_state: None,
            remote_queue: None,
            pending_registration: None,
            outgoing_transfer: None,
            incoming_transfer: None,
            broadcast_timer: None,
            last_broadcast_queue_version: None,
            ticks,
            role_tx,
            remote_state_tx,
            events,
        };
        (coordinator, tick_rx)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Server-assigned id of this connection
    pub fn device_id(&self) -> Option<usize> {
        self.device_id
    }

    pub fn session(&self) -> &SessionView {
        &self.session
    }

    pub fn devices(&self) -> &[ConnectedDevice] {
        self.registry.devices()
    }

    pub fn remote_state(&self) -> Option<&PlaybackState> {
        self.remote_state.as_ref()
    }

    pub fn remote_queue(&self) -> Option<&QueueSnapshot> {
        self.remote_queue.as_ref()
    }

    /// Id of the takeover this device is waiting on
    pub fn pending_transfer_id(&self) -> Option<&str> {
        self.outgoing_transfer
            .as_ref()
            .map(|t| t.ticket.transfer_id.as_str())
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcast_timer.is_some()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch_role(&self) -> watch::Receiver<SessionRole> {
        self.role_tx.subscribe()
    }

    /// Latest state pushed by the audio device, `None` without a session
    pub fn watch_remote_state(&self) -> watch::Receiver<Option<PlaybackState>> {
        self.remote_state_tx.subscribe()
    }

    pub fn join_preference(&self) -> RemoteJoinPreference {
        RemoteJoinPreference::load(self.store.as_ref())
    }

    pub fn set_join_preference(&self, preference: RemoteJoinPreference) -> StoreResult<()> {
        preference.save(self.store.as_ref())
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// A WebSocket connection was (re)established
    ///
    /// Nothing from a previous connection survives; the device starts `Idle`
    /// and announces itself.
    pub fn on_connected(&mut self) {
        self.reset();
        info!(device_name = %self.device_name, "Sending playback hello");
        self.outbox.send(ClientMessage::Hello {
            device_name: self.device_name.clone(),
            device_type: self.device_type,
        });
    }

    /// The WebSocket connection was lost
    pub fn on_disconnected(&mut self) {
        info!(role = %self.role, "Playback connection lost");
        self.reset();
    }

    fn reset(&mut self) {
        self.broadcast_timer = None;
        self.outgoing_transfer = None;
        if let Some(incoming) = self.incoming_transfer.take() {
            if incoming.resume_on_abort {
                self.engine.play();
            }
        }
        self.pending_registration = None;
        self.device_id = None;
        self.registry.clear();
        self.session = SessionView::default();
        self.last_broadcast_queue_version = None;
        self.set_role(SessionRole::Idle);
        self.clear_remote();
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    /// Dispatch one decoded server message
    pub fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connected { device_id } => {
                debug!(device_id, "WebSocket connected");
                self.device_id = Some(device_id);
            }
            ServerMessage::Pong => {}
            ServerMessage::Error(e) => {
                warn!(code = %e.code, message = %e.message, "Server reported error");
            }
            ServerMessage::Sync { event } => {
                // sync pushes belong to the sync engine
                debug!(seq = event.seq, "Ignoring sync push in playback coordinator");
            }
            ServerMessage::Welcome(welcome) => self.handle_welcome(welcome),
            ServerMessage::RegisterAck(ack) => self.handle_register_ack(ack),
            ServerMessage::State(state) => self.handle_remote_state(state),
            ServerMessage::QueueSync(queue) => self.handle_queue_sync(queue),
            ServerMessage::Command(command) => self.handle_command(command),
            ServerMessage::DeviceListChanged(payload) => self.handle_device_list_changed(payload),
            ServerMessage::SessionEnded { reason } => self.handle_session_ended(reason),
            ServerMessage::PrepareTransfer(payload) => self.handle_prepare_transfer(payload),
            ServerMessage::BecomeAudioDevice(snapshot) => self.handle_become_audio_device(snapshot),
            ServerMessage::TransferComplete { transfer_id } => {
                self.handle_transfer_complete(transfer_id)
            }
            ServerMessage::TransferAborted {
                transfer_id,
                reason,
            } => self.handle_transfer_aborted(transfer_id, reason),
            ServerMessage::PlaybackError(payload) => self.handle_playback_error(payload),
        }
    }

    #[instrument(skip(self, welcome), fields(device_id = welcome.device_id))]
    fn handle_welcome(&mut self, welcome: WelcomePayload) {
        let WelcomePayload {
            device_id,
            session,
            devices,
        } = welcome;

        self.device_id = Some(device_id);
        self.registry.replace(devices);
        self.session = SessionView {
            exists: session.exists,
            audio_device_id: session.audio_device_id,
            reclaimable: session.reclaimable.unwrap_or(false),
        };
        if let Some(state) = session.state {
            self.store_remote_state(state);
        }
        if let Some(queue) = session.queue {
            let queue_version = self
                .remote_state
                .as_ref()
                .map(|s| s.queue_version)
                .unwrap_or_default();
            self.remote_queue = Some(QueueSnapshot {
                queue,
                queue_version,
            });
        }

        info!(
            session_exists = self.session.exists,
            audio_device_id = ?self.session.audio_device_id,
            devices = self.registry.len(),
            "Received playback welcome"
        );

        if !self.session.exists {
            // still playing from before the reconnect
            if self.engine.is_playing() {
                self.register();
            }
            return;
        }

        if self.session.audio_device_id == Some(device_id) {
            return;
        }

        if self.session.reclaimable && self.engine.has_track() {
            self.reclaim();
            return;
        }

        self.offer_session();
    }

    /// Act on a session found while idle, as the join preference says
    fn offer_session(&mut self) {
        match self.join_preference() {
            RemoteJoinPreference::Always => {
                self.enter_remote_mode();
            }
            RemoteJoinPreference::Ask => self.emit(SessionEvent::SessionAvailable {
                audio_device_id: self.session.audio_device_id,
            }),
            RemoteJoinPreference::Never => {
                debug!("Session exists, join preference is never");
            }
        }
    }

    fn handle_register_ack(&mut self, ack: RegisterAckPayload) {
        let Some(kind) = self.pending_registration.take() else {
            debug!("Ignoring unsolicited register ack");
            return;
        };

        if ack.success {
            info!(?kind, "Registered as audio device");
            self.become_audio_device();
        } else {
            warn!(?kind, error = ?ack.error, "Audio device registration rejected");
        }
    }

    fn handle_remote_state(&mut self, state: PlaybackState) {
        if self.role == SessionRole::AudioDevice {
            debug!("Ignoring relayed state while audio device");
            return;
        }
        if let Some(held) = &self.remote_state {
            if state.timestamp < held.timestamp {
                debug!(
                    held = held.timestamp,
                    received = state.timestamp,
                    "Ignoring stale remote state"
                );
                return;
            }
        }

        let queue_stale = self
            .remote_queue
            .as_ref()
            .map_or(true, |q| q.queue_version < state.queue_version);
        let newly_discovered = !self.session.exists;
        self.session.exists = true;
        self.store_remote_state(state.clone());

        match self.role {
            SessionRole::Remote => {
                self.emit(SessionEvent::RemoteStateUpdated(state));
                if queue_stale {
                    debug!("Remote queue is stale, requesting queue");
                    self.outbox.send(ClientMessage::RequestQueue);
                }
            }
            SessionRole::Idle if newly_discovered => self.offer_session(),
            _ => {}
        }
    }

    fn handle_queue_sync(&mut self, queue: QueueSnapshot) {
        if self.role == SessionRole::AudioDevice {
            debug!("Ignoring relayed queue while audio device");
            return;
        }
        if let Some(held) = &self.remote_queue {
            if queue.queue_version < held.queue_version {
                debug!(
                    held = held.queue_version,
                    received = queue.queue_version,
                    "Ignoring stale remote queue"
                );
                return;
            }
        }

        self.remote_queue = Some(queue.clone());
        if self.role == SessionRole::Remote {
            self.emit(SessionEvent::RemoteQueueUpdated(queue));
        }
    }

    fn handle_command(&mut self, command: PlaybackCommand) {
        if self.role != SessionRole::AudioDevice {
            debug!(command = command.name(), "Ignoring command while not audio device");
            return;
        }

        debug!(command = command.name(), "Applying remote command");
        match command {
            PlaybackCommand::Play => self.engine.play(),
            PlaybackCommand::Pause => self.engine.pause(),
            PlaybackCommand::Seek { position } => self.engine.seek(position),
            PlaybackCommand::SetVolume { volume } => self.engine.set_volume(volume),
            PlaybackCommand::SetMuted { muted } => self.engine.set_muted(muted),
            PlaybackCommand::Next => self.engine.skip_next(),
            PlaybackCommand::Prev => self.engine.skip_previous(),
            PlaybackCommand::SetShuffle { shuffle } => self.engine.set_shuffle(shuffle),
            PlaybackCommand::SetRepeat { repeat } => self.engine.set_repeat(repeat),
        }
        self.broadcast_state(false);
    }

    fn handle_device_list_changed(&mut self, payload: DeviceListChangedPayload) {
        debug!(
            change = ?payload.change.change_type,
            device_id = payload.change.device_id,
            "Device list changed"
        );
        self.registry.replace(payload.devices);

        let newly_discovered = !self.session.exists;
        if let Some(audio) = self.registry.audio_device().map(|d| d.id) {
            self.session.exists = true;
            self.session.audio_device_id = Some(audio);
        } else {
            self.session.audio_device_id = None;
        }

        if self.role == SessionRole::Idle
            && newly_discovered
            && self.session.exists
            && self.session.audio_device_id != self.device_id
        {
            self.offer_session();
        }
        self.emit(SessionEvent::DevicesChanged {
            devices: self.registry.devices().to_vec(),
        });
    }

    fn handle_session_ended(&mut self, reason: String) {
        info!(%reason, role = %self.role, "Playback session ended");
        self.broadcast_timer = None;
        self.outgoing_transfer = None;
        self.incoming_transfer = None;
        self.session = SessionView::default();
        self.last_broadcast_queue_version = None;
        // the role change hands the last remote state to the local outlet
        self.set_role(SessionRole::Idle);
        self.clear_remote();
        self.emit(SessionEvent::SessionEnded { reason });
    }

    #[instrument(skip(self, payload), fields(transfer_id = %payload.transfer_id))]
    fn handle_prepare_transfer(&mut self, payload: PrepareTransferPayload) {
        if self.role != SessionRole::AudioDevice {
            warn!("Prepare transfer received while not audio device");
            return;
        }
        if let Some(current) = &self.incoming_transfer {
            warn!(
                current = %current.ticket.transfer_id,
                "Transfer already being prepared"
            );
            return;
        }

        let snapshot = self.local_snapshot();
        let resume_on_abort = snapshot.state.is_playing;
        self.engine.pause();

        info!(
            target_device = %payload.target_device_name,
            "Handing playback over"
        );
        self.outbox
            .send(ClientMessage::TransferReady(TransferSnapshot {
                transfer_id: payload.transfer_id.clone(),
                state: snapshot.state,
                queue: snapshot.queue,
            }));

        let timeout = self.schedule_transfer_timeout(&payload.transfer_id);
        self.incoming_transfer = Some(IncomingTransfer {
            ticket: TransferTicket {
                transfer_id: payload.transfer_id.clone(),
                initiator_device_id: Some(payload.target_device_id),
            },
            resume_on_abort,
            _timeout: timeout,
        });
        self.emit(SessionEvent::TransferStarted {
            transfer_id: payload.transfer_id,
        });
    }

    #[instrument(skip(self, snapshot), fields(transfer_id = %snapshot.transfer_id))]
    fn handle_become_audio_device(&mut self, snapshot: TransferSnapshot) {
        let expected = self
            .outgoing_transfer
            .as_ref()
            .is_some_and(|t| t.ticket.transfer_id == snapshot.transfer_id);
        if !expected {
            debug!("Ignoring become_audio_device for unknown or abandoned transfer");
            return;
        }
        self.outgoing_transfer = None;

        let TransferSnapshot {
            transfer_id,
            mut state,
            queue,
        } = snapshot;
        // cover the time the handover spent in flight
        state.position = interpolate_position(&state, now_millis());
        self.engine.restore(&PlaybackSnapshot::new(state, queue));

        self.outbox
            .send(ClientMessage::TransferComplete { transfer_id });
        info!("Took over playback");
        self.become_audio_device();
    }

    fn handle_transfer_complete(&mut self, transfer_id: String) {
        let expected = self
            .incoming_transfer
            .as_ref()
            .is_some_and(|t| t.ticket.transfer_id == transfer_id);
        if !expected {
            debug!(%transfer_id, "Ignoring completion of unknown transfer");
            return;
        }
        let Some(incoming) = self.incoming_transfer.take() else {
            return;
        };

        self.engine.stop();
        self.broadcast_timer = None;
        self.last_broadcast_queue_version = None;
        self.session = SessionView {
            exists: true,
            audio_device_id: incoming.ticket.initiator_device_id,
            reclaimable: false,
        };
        info!(%transfer_id, "Playback transferred away");
        self.set_role(SessionRole::Idle);
        self.emit(SessionEvent::SessionAvailable {
            audio_device_id: self.session.audio_device_id,
        });
    }

    fn handle_transfer_aborted(&mut self, transfer_id: String, reason: String) {
        if self.is_outgoing(&transfer_id) {
            self.fail_outgoing(reason);
        } else if self.is_incoming(&transfer_id) {
            self.abort_incoming(reason);
        } else {
            debug!(%transfer_id, "Ignoring abort of unknown transfer");
        }
    }

    fn handle_playback_error(&mut self, payload: PlaybackErrorPayload) {
        let context = payload.context.unwrap_or_default();
        warn!(
            code = %payload.code,
            message = %payload.message,
            command = ?context.command,
            transfer_id = ?context.transfer_id,
            "Playback error from server"
        );

        // a rejected takeover would otherwise wait for the timeout
        if let Some(transfer_id) = context.transfer_id {
            if self.is_outgoing(&transfer_id) {
                self.fail_outgoing(payload.code);
            }
        }
    }

    /// Handle a timer tick
    pub fn handle_tick(&mut self, tick: CoordinatorTick) {
        match tick {
            CoordinatorTick::Broadcast => {
                if self.role == SessionRole::AudioDevice {
                    self.broadcast_state(true);
                }
            }
            CoordinatorTick::TransferTimeout { transfer_id } => {
                if self.is_outgoing(&transfer_id) {
                    warn!(%transfer_id, "Takeover timed out");
                    self.fail_outgoing("timeout".to_string());
                } else if self.is_incoming(&transfer_id) {
                    warn!(%transfer_id, "Transfer handover timed out");
                    self.abort_incoming("timeout".to_string());
                }
            }
        }
    }

    // =========================================================================
    // Local triggers
    // =========================================================================

    /// Local playback started
    ///
    /// Claims the audio device role when nobody holds the session.
    pub fn on_local_playback_started(&mut self) {
        match self.role {
            SessionRole::AudioDevice => self.broadcast_state(false),
            SessionRole::Idle if !self.session.exists => {
                self.register();
            }
            _ => {}
        }
    }

    /// Local playback state changed (track, position, volume, queue)
    pub fn on_local_state_changed(&mut self) {
        match self.role {
            SessionRole::AudioDevice => self.broadcast_state(false),
            SessionRole::Idle if self.engine.is_playing() => self.on_local_playback_started(),
            _ => {}
        }
    }

    /// Start controlling the session's audio device
    ///
    /// Returns whether the device is `Remote` afterwards. Refused while this
    /// device renders audio; it has to unregister or transfer playback first.
    pub fn enter_remote_mode(&mut self) -> bool {
        match self.role {
            SessionRole::Remote => return true,
            SessionRole::AudioDevice => {
                warn!("Cannot enter remote mode while rendering audio");
                return false;
            }
            SessionRole::Idle => {}
        }
        if !self.session.exists
            || (self.device_id.is_some() && self.session.audio_device_id == self.device_id)
        {
            debug!("No remote session to join");
            return false;
        }

        if self.engine.is_playing() {
            self.engine.pause();
        }

        let queue_stale = match (&self.remote_queue, &self.remote_state) {
            (None, _) => true,
            (Some(queue), Some(state)) => queue.queue_version < state.queue_version,
            (Some(_), None) => false,
        };
        if queue_stale {
            self.outbox.send(ClientMessage::RequestQueue);
        }

        info!(audio_device_id = ?self.session.audio_device_id, "Entering remote mode");
        self.set_role(SessionRole::Remote);
        true
    }

    /// Stop controlling the remote device
    pub fn exit_remote_mode(&mut self) {
        if self.role != SessionRole::Remote {
            return;
        }
        self.outgoing_transfer = None;
        info!("Leaving remote mode");
        self.set_role(SessionRole::Idle);
    }

    /// Ask to move audio output to this device
    ///
    /// Returns the transfer id, or `None` when not in remote mode.
    pub fn request_takeover(&mut self) -> Option<String> {
        if self.role != SessionRole::Remote {
            warn!(role = %self.role, "Takeover requires remote mode");
            return None;
        }
        if let Some(pending) = &self.outgoing_transfer {
            return Some(pending.ticket.transfer_id.clone());
        }

        let ticket = TransferTicket::generate(self.device_id);
        let transfer_id = ticket.transfer_id.clone();
        info!(%transfer_id, "Requesting playback takeover");
        self.outbox.send(ClientMessage::RequestTakeover {
            transfer_id: transfer_id.clone(),
        });
        self.outgoing_transfer = Some(OutgoingTransfer {
            ticket,
            _timeout: self.schedule_transfer_timeout(&transfer_id),
        });
        self.emit(SessionEvent::TransferStarted {
            transfer_id: transfer_id.clone(),
        });
        Some(transfer_id)
    }

    /// Give up the audio device role and stop local playback
    pub fn unregister(&mut self) -> bool {
        if self.role != SessionRole::AudioDevice {
            return false;
        }
        info!("Unregistering audio device");
        self.outbox.send(ClientMessage::UnregisterAudioDevice);
        self.broadcast_timer = None;
        self.incoming_transfer = None;
        self.last_broadcast_queue_version = None;
        self.engine.stop();
        self.session = SessionView::default();
        self.set_role(SessionRole::Idle);
        true
    }

    /// Send a command to the audio device while in remote mode
    pub fn send_command(&self, command: PlaybackCommand) -> bool {
        if self.role != SessionRole::Remote {
            debug!(command = command.name(), "Not in remote mode, command dropped");
            return false;
        }
        self.outbox.send(ClientMessage::Command(command))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn register(&mut self) -> bool {
        if self.pending_registration.is_some() || self.device_id.is_none() {
            return false;
        }
        debug!("Registering as audio device");
        self.pending_registration = Some(PendingRegistration::Register);
        self.outbox.send(ClientMessage::RegisterAudioDevice)
    }

    fn reclaim(&mut self) {
        if self.pending_registration.is_some() {
            return;
        }
        info!("Reclaiming audio device role");
        let snapshot = self.local_snapshot();
        self.pending_registration = Some(PendingRegistration::Reclaim);
        self.outbox
            .send(ClientMessage::ReclaimAudioDevice(snapshot.state));
    }

    fn become_audio_device(&mut self) {
        self.session = SessionView {
            exists: true,
            audio_device_id: self.device_id,
            reclaimable: false,
        };
        self.clear_remote();

        let ticks = self.ticks.clone();
        self.broadcast_timer = Some(ScheduledTask::every(self.broadcast_interval, move || {
            ticks.send(CoordinatorTick::Broadcast).is_ok()
        }));
        self.set_role(SessionRole::AudioDevice);
        self.broadcast_state(true);
    }

    /// Send current state, and the queue when forced or changed
    fn broadcast_state(&mut self, include_queue: bool) {
        let snapshot = self.local_snapshot();
        let queue_version = snapshot.state.queue_version;
        self.outbox.send(ClientMessage::State(snapshot.state));

        if include_queue || self.last_broadcast_queue_version != Some(queue_version) {
            self.outbox.send(ClientMessage::QueueUpdate(QueueSnapshot {
                queue: snapshot.queue,
                queue_version,
            }));
            self.last_broadcast_queue_version = Some(queue_version);
        }
    }

    fn local_snapshot(&self) -> PlaybackSnapshot {
        let mut snapshot = self.engine.snapshot();
        snapshot.state.timestamp = now_millis();
        snapshot
    }

    fn remote_snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.remote_state.clone().unwrap_or_default(),
            queue: self
                .remote_queue
                .as_ref()
                .map(|q| q.queue.clone())
                .unwrap_or_default(),
        }
    }

    /// Where a device leaving remote mode picks up: the last remote state,
    /// with the position it has reached by now
    fn handover_snapshot(&self) -> PlaybackSnapshot {
        let Some(state) = &self.remote_state else {
            return self.engine.snapshot();
        };
        let now = now_millis();
        let mut snapshot = self.remote_snapshot();
        snapshot.state.position = interpolate_position(state, now);
        snapshot.state.timestamp = now;
        snapshot
    }

    fn store_remote_state(&mut self, state: PlaybackState) {
        self.remote_state = Some(state.clone());
        self.remote_state_tx.send_replace(Some(state));
    }

    fn clear_remote(&mut self) {
        self.remote_state = None;
        self.remote_queue = None;
        self.remote_state_tx.send_replace(None);
    }

    fn is_outgoing(&self, transfer_id: &str) -> bool {
        self.outgoing_transfer
            .as_ref()
            .is_some_and(|t| t.ticket.transfer_id == transfer_id)
    }

    fn is_incoming(&self, transfer_id: &str) -> bool {
        self.incoming_transfer
            .as_ref()
            .is_some_and(|t| t.ticket.transfer_id == transfer_id)
    }

    fn fail_outgoing(&mut self, reason: String) {
        let Some(outgoing) = self.outgoing_transfer.take() else {
            return;
        };
        warn!(transfer_id = %outgoing.ticket.transfer_id, %reason, "Takeover failed");
        self.emit(SessionEvent::TransferFailed {
            transfer_id: outgoing.ticket.transfer_id,
            reason,
        });
    }

    fn abort_incoming(&mut self, reason: String) {
        let Some(incoming) = self.incoming_transfer.take() else {
            return;
        };
        warn!(transfer_id = %incoming.ticket.transfer_id, %reason, "Transfer away aborted");
        if incoming.resume_on_abort {
            self.engine.play();
        }
        if self.role == SessionRole::AudioDevice {
            self.broadcast_state(false);
        }
        self.emit(SessionEvent::TransferFailed {
            transfer_id: incoming.ticket.transfer_id,
            reason,
        });
    }

    fn schedule_transfer_timeout(&self, transfer_id: &str) -> ScheduledTask {
        let ticks = self.ticks.clone();
        let transfer_id = transfer_id.to_string();
        ScheduledTask::after(self.transfer_timeout, move || {
            let _ = ticks.send(CoordinatorTick::TransferTimeout { transfer_id });
        })
    }

    fn set_role(&mut self, role: SessionRole) {
        if self.role == role {
            return;
        }
        debug!(from = %self.role, to = %role, "Playback role changed");
        let previous = std::mem::replace(&mut self.role, role);
        self.role_tx.send_replace(role);

        let snapshot = match role {
            SessionRole::Remote => self.remote_snapshot(),
            SessionRole::Idle if previous == SessionRole::Remote => self.handover_snapshot(),
            SessionRole::Idle | SessionRole::AudioDevice => self.engine.snapshot(),
        };
        self.emit(SessionEvent::RoleChanged { role, snapshot });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl<E: PlaybackEngine> fmt::Debug for PlaybackSessionCoordinator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSessionCoordinator")
            .field("role", &self.role)
            .field("device_id", &self.device_id)
            .field("session", &self.session)
            .field("pending_transfer", &self.pending_transfer_id())
            .finish_non_exhaustive()
    }
}
