//! Mock audio engine and in-process session server

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use resonance_session_sync::messages::{
    ClientMessage, ConnectedDevice, DeviceChange, DeviceChangeType, DeviceListChangedPayload,
    DeviceType, ErrorContext, PlaybackErrorPayload, PlaybackState, PlaybackTrack,
    PrepareTransferPayload, QueueSnapshot, RegisterAckPayload, RepeatMode,
    ServerMessage, SessionInfo, WelcomePayload,
};
use resonance_session_sync::outbox::Outbox;
use resonance_session_sync::playback::{
    CoordinatorTick, PlaybackEngine, PlaybackSessionCoordinator, PlaybackSnapshot, SessionRole,
};
use resonance_session_sync::store::MemoryStore;
use resonance_shared_config::PlaybackConfig;

use super::fixtures::queue;

// ============================================================================
// Mock audio engine
// ============================================================================

/// Audio engine that only records state
#[derive(Default)]
pub struct MockPlaybackEngine {
    snapshot: Mutex<PlaybackSnapshot>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockPlaybackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine already playing `track` at `position`
    pub fn playing(track: PlaybackTrack, position: f64) -> Self {
        let engine = Self::default();
        {
            let mut s = engine.snapshot.lock();
            s.state.current_track = Some(track);
            s.state.position = position;
            s.state.is_playing = true;
            s.state.queue_version = 1;
            s.queue = queue(&["track-1", "track-2"]);
        }
        engine
    }

    pub fn state(&self) -> PlaybackState {
        self.snapshot.lock().state.clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

impl PlaybackEngine for MockPlaybackEngine {
    fn play(&self) {
        self.record("play");
        self.snapshot.lock().state.is_playing = true;
    }

    fn pause(&self) {
        self.record("pause");
        self.snapshot.lock().state.is_playing = false;
    }

    fn seek(&self, position: f64) {
        self.record("seek");
        self.snapshot.lock().state.position = position;
    }

    fn set_volume(&self, volume: f64) {
        self.record("set_volume");
        self.snapshot.lock().state.volume = volume;
    }

    fn set_muted(&self, muted: bool) {
        self.record("set_muted");
        self.snapshot.lock().state.muted = muted;
    }

    fn set_shuffle(&self, shuffle: bool) {
        self.record("set_shuffle");
        self.snapshot.lock().state.shuffle = shuffle;
    }

    fn set_repeat(&self, repeat: RepeatMode) {
        self.record("set_repeat");
        self.snapshot.lock().state.repeat = repeat;
    }

    fn skip_next(&self) {
        self.record("skip_next");
        self.snapshot.lock().state.queue_position += 1;
    }

    fn skip_previous(&self) {
        self.record("skip_previous");
        let mut s = self.snapshot.lock();
        s.state.queue_position = s.state.queue_position.saturating_sub(1);
    }

    fn load_track(&self, track: PlaybackTrack) {
        self.record("load_track");
        let mut s = self.snapshot.lock();
        s.state.current_track = Some(track);
        s.state.position = 0.0;
        s.state.is_playing = true;
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.lock().clone()
    }

    fn restore(&self, snapshot: &PlaybackSnapshot) {
        self.record("restore");
        *self.snapshot.lock() = snapshot.clone();
    }

    fn stop(&self) {
        self.record("stop");
        *self.snapshot.lock() = PlaybackSnapshot::default();
    }
}

// ============================================================================
// In-process session server
// ============================================================================

/// One connected device: a coordinator and the ends of its channels
pub struct TestDevice {
    pub id: usize,
    pub name: String,
    pub coordinator: PlaybackSessionCoordinator<MockPlaybackEngine>,
    pub engine: Arc<MockPlaybackEngine>,
    pub store: MemoryStore,
    outbox: UnboundedReceiver<ClientMessage>,
    ticks: UnboundedReceiver<CoordinatorTick>,
}

struct PendingTransfer {
    transfer_id: String,
    source: usize,
    target: usize,
}

/// How the server treats `playback.transfer_ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferBehavior {
    #[default]
    Complete,
    /// Abort the transfer on both sides
    Abort,
    /// Never answer, leaving both sides to time out
    Swallow,
}

/// Session server for one account, holding every device in process
///
/// Messages are exchanged by [`FakeSessionServer::pump`], which drains
/// every outbox and delivers replies until nothing is left in flight. The
/// server arbitrates registration and transfers with a single audio device
/// slot, like the real one.
#[derive(Default)]
pub struct FakeSessionServer {
    devices: Vec<TestDevice>,
    audio_device: Option<usize>,
    state: Option<PlaybackState>,
    queue: Option<QueueSnapshot>,
    pending_transfer: Option<PendingTransfer>,
    pub transfer_behavior: TransferBehavior,
    pub reject_takeovers: bool,
    /// Every client message seen, as `(device id, message)`
    pub received: Vec<(usize, ClientMessage)>,
}

impl FakeSessionServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a device with an idle engine
    pub fn connect(&mut self, name: &str) -> usize {
        self.connect_with(name, MockPlaybackEngine::new())
    }

    /// Connect a device and run the hello/welcome exchange
    pub fn connect_with(&mut self, name: &str, engine: MockPlaybackEngine) -> usize {
        let id = self.devices.len() + 1;
        let engine = Arc::new(engine);
        let store = MemoryStore::new();
        let (outbox, outbox_rx) = Outbox::channel();
        let config = PlaybackConfig {
            device_name: name.to_string(),
            ..PlaybackConfig::default()
        };
        let (mut coordinator, ticks) = PlaybackSessionCoordinator::new(
            engine.clone(),
            outbox,
            Arc::new(store.clone()),
            &config,
        );
        coordinator.handle_message(ServerMessage::Connected { device_id: id });
        coordinator.on_connected();

        self.devices.push(TestDevice {
            id,
            name: name.to_string(),
            coordinator,
            engine,
            store,
            outbox: outbox_rx,
            ticks,
        });
        self.pump();
        id
    }

    pub fn device(&self, id: usize) -> &TestDevice {
        &self.devices[id - 1]
    }

    pub fn device_mut(&mut self, id: usize) -> &mut TestDevice {
        &mut self.devices[id - 1]
    }

    pub fn coordinator(&mut self, id: usize) -> &mut PlaybackSessionCoordinator<MockPlaybackEngine> {
        &mut self.device_mut(id).coordinator
    }

    pub fn role(&self, id: usize) -> SessionRole {
        self.device(id).coordinator.role()
    }

    pub fn audio_device(&self) -> Option<usize> {
        self.audio_device
    }

    pub fn session_state(&self) -> Option<&PlaybackState> {
        self.state.as_ref()
    }

    /// Devices currently claiming the audio device role
    pub fn audio_devices(&self) -> Vec<usize> {
        self.devices
            .iter()
            .filter(|d| d.coordinator.role() == SessionRole::AudioDevice)
            .map(|d| d.id)
            .collect()
    }

    /// Deliver coordinator timer ticks that have fired, then pump
    pub fn pump_ticks(&mut self) {
        for device in &mut self.devices {
            while let Ok(tick) = device.ticks.try_recv() {
                device.coordinator.handle_tick(tick);
            }
        }
        self.pump();
    }

    /// Exchange messages until every outbox is empty
    pub fn pump(&mut self) {
        loop {
            let mut inbound = Vec::new();
            for device in &mut self.devices {
                while let Ok(msg) = device.outbox.try_recv() {
                    inbound.push((device.id, msg));
                }
            }
            if inbound.is_empty() {
                return;
            }

            let mut outbound = VecDeque::new();
            for (from, msg) in inbound {
                self.received.push((from, msg.clone()));
                self.handle(from, msg, &mut outbound);
            }
            while let Some((to, msg)) = outbound.pop_front() {
                self.device_mut(to).coordinator.handle_message(msg);
            }
        }
    }

    fn handle(&mut self, from: usize, msg: ClientMessage, out: &mut VecDeque<(usize, ServerMessage)>) {
        match msg {
            ClientMessage::Hello { .. } => {
                out.push_back((from, ServerMessage::Welcome(self.welcome_for(from))));
                self.device_list_changed(from, DeviceChangeType::Connected, out);
            }
            ClientMessage::RegisterAudioDevice | ClientMessage::ReclaimAudioDevice(_) => {
                if self.audio_device.map_or(true, |id| id == from) {
                    self.audio_device = Some(from);
                    out.push_back((
                        from,
                        ServerMessage::RegisterAck(RegisterAckPayload {
                            success: true,
                            error: None,
                        }),
                    ));
                    self.device_list_changed(from, DeviceChangeType::BecameAudioDevice, out);
                } else {
                    out.push_back((
                        from,
                        ServerMessage::RegisterAck(RegisterAckPayload {
                            success: false,
                            error: Some(serde_json::json!({"code": "audio_device_taken"})),
                        }),
                    ));
                }
            }
            ClientMessage::UnregisterAudioDevice => {
                if self.audio_device == Some(from) {
                    self.audio_device = None;
                    self.state = None;
                    self.queue = None;
                    for other in self.other_ids(from) {
                        out.push_back((
                            other,
                            ServerMessage::SessionEnded {
                                reason: "audio_device_unregistered".to_string(),
                            },
                        ));
                    }
                }
            }
            ClientMessage::State(state) => {
                if self.audio_device == Some(from) {
                    self.state = Some(state.clone());
                    for other in self.other_ids(from) {
                        out.push_back((other, ServerMessage::State(state.clone())));
                    }
                }
            }
            ClientMessage::QueueUpdate(queue) => {
                if self.audio_device == Some(from) {
                    self.queue = Some(queue.clone());
                    for other in self.other_ids(from) {
                        out.push_back((other, ServerMessage::QueueSync(queue.clone())));
                    }
                }
            }
            ClientMessage::RequestQueue => {
                if let Some(queue) = &self.queue {
                    out.push_back((from, ServerMessage::QueueSync(queue.clone())));
                }
            }
            ClientMessage::Command(command) => {
                if let Some(audio) = self.audio_device.filter(|id| *id != from) {
                    out.push_back((audio, ServerMessage::Command(command)));
                }
            }
            ClientMessage::RequestTakeover { transfer_id } => {
                let source = self.audio_device.filter(|id| *id != from);
                match source {
                    Some(source) if !self.reject_takeovers && self.pending_transfer.is_none() => {
                        let target_device_name = self.device(from).name.clone();
                        self.pending_transfer = Some(PendingTransfer {
                            transfer_id: transfer_id.clone(),
                            source,
                            target: from,
                        });
                        out.push_back((
                            source,
                            ServerMessage::PrepareTransfer(PrepareTransferPayload {
                                transfer_id,
                                target_device_id: from,
                                target_device_name,
                            }),
                        ));
                    }
                    _ => out.push_back((
                        from,
                        ServerMessage::PlaybackError(PlaybackErrorPayload {
                            code: "transfer_rejected".to_string(),
                            message: "No audio device to take over from".to_string(),
                            context: Some(ErrorContext {
                                command: None,
                                transfer_id: Some(transfer_id),
                            }),
                        }),
                    )),
                }
            }
            ClientMessage::TransferReady(snapshot) => {
                let Some((source, target)) = self
                    .pending_transfer
                    .as_ref()
                    .filter(|p| p.transfer_id == snapshot.transfer_id && p.source == from)
                    .map(|p| (p.source, p.target))
                else {
                    return;
                };
                match self.transfer_behavior {
                    TransferBehavior::Complete => {
                        out.push_back((target, ServerMessage::BecomeAudioDevice(snapshot)));
                    }
                    TransferBehavior::Abort => {
                        self.pending_transfer = None;
                        for id in [source, target] {
                            out.push_back((
                                id,
                                ServerMessage::TransferAborted {
                                    transfer_id: snapshot.transfer_id.clone(),
                                    reason: "target_disconnected".to_string(),
                                },
                            ));
                        }
                    }
                    TransferBehavior::Swallow => {}
                }
            }
            ClientMessage::TransferComplete { transfer_id } => {
                let Some(pending) = self.pending_transfer.take() else {
                    return;
                };
                if pending.transfer_id != transfer_id || pending.target != from {
                    self.pending_transfer = Some(pending);
                    return;
                }
                self.audio_device = Some(pending.target);
                out.push_back((pending.source, ServerMessage::TransferComplete { transfer_id }));
                self.device_list_changed(from, DeviceChangeType::BecameAudioDevice, out);
            }
            ClientMessage::Ping => out.push_back((from, ServerMessage::Pong)),
        }
    }

    fn welcome_for(&self, id: usize) -> WelcomePayload {
        WelcomePayload {
            device_id: id,
            session: SessionInfo {
                exists: self.audio_device.is_some(),
                state: self.state.clone(),
                queue: self.queue.as_ref().map(|q| q.queue.clone()),
                audio_device_id: self.audio_device,
                reclaimable: None,
            },
            devices: self.connected_devices(),
        }
    }

    fn connected_devices(&self) -> Vec<ConnectedDevice> {
        self.devices
            .iter()
            .map(|d| ConnectedDevice {
                id: d.id,
                name: d.name.clone(),
                device_type: DeviceType::Web,
                is_audio_device: self.audio_device == Some(d.id),
                connected_at: d.id as u64,
            })
            .collect()
    }

    fn device_list_changed(
        &self,
        device_id: usize,
        change_type: DeviceChangeType,
        out: &mut VecDeque<(usize, ServerMessage)>,
    ) {
        let devices = self.connected_devices();
        for other in self.other_ids(device_id) {
            out.push_back((
                other,
                ServerMessage::DeviceListChanged(DeviceListChangedPayload {
                    devices: devices.clone(),
                    change: DeviceChange {
                        change_type,
                        device_id,
                    },
                }),
            ));
        }
    }

    fn other_ids(&self, id: usize) -> Vec<usize> {
        self.devices
            .iter()
            .map(|d| d.id)
            .filter(|other| *other != id)
            .collect()
    }
}
