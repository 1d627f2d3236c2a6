//! WebSocket message types for sync pushes and the playback session
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`. Outgoing
//! messages serialize straight from [`ClientMessage`]; incoming frames go
//! through [`ServerMessage::decode`], which tells malformed frames, unknown
//! types and bad payloads apart so callers can log and carry on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::sync::SyncEvent;

// =============================================================================
// Shared playback types
// =============================================================================

/// Track information carried in playback state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTrack {
    pub id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: String,
    pub album_title: String,
    /// Seconds
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

/// Point-in-time sample of the audio device's playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_track: Option<PlaybackTrack>,
    pub queue_position: usize,
    pub queue_version: u64,
    /// Seconds into the current track when the sample was taken
    pub position: f64,
    pub is_playing: bool,
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    /// Wall-clock capture time in epoch milliseconds
    pub timestamp: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            queue_position: 0,
            queue_version: 0,
            position: 0.0,
            is_playing: false,
            volume: 1.0,
            muted: false,
            shuffle: false,
            repeat: RepeatMode::Off,
            timestamp: 0,
        }
    }
}

impl PlaybackState {
    /// Duration of the current track, if any
    pub fn duration(&self) -> Option<f64> {
        self.current_track.as_ref().map(|t| t.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

/// Queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub added_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Android,
    Ios,
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(format!("unknown device type '{}'", other)),
        }
    }
}

/// A device connected to the user's session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub id: usize,
    pub name: String,
    pub device_type: DeviceType,
    pub is_audio_device: bool,
    pub connected_at: u64,
}

/// Command forwarded from a remote controller to the audio device
///
/// On the wire this is `{"command": "seek", "payload": {"position": 42.0}}`;
/// the payload is omitted for commands without arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCommand", into = "RawCommand")]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek { position: f64 },
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
    Next,
    Prev,
    SetShuffle { shuffle: bool },
    SetRepeat { repeat: RepeatMode },
}

impl PlaybackCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek { .. } => "seek",
            Self::SetVolume { .. } => "set_volume",
            Self::SetMuted { .. } => "set_muted",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::SetShuffle { .. } => "set_shuffle",
            Self::SetRepeat { .. } => "set_repeat",
        }
    }
}

/// Untyped command shape; tolerates missing, null or empty payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct SeekArgs {
    position: f64,
}

#[derive(Deserialize)]
struct VolumeArgs {
    volume: f64,
}

#[derive(Deserialize)]
struct MutedArgs {
    muted: bool,
}

#[derive(Deserialize)]
struct ShuffleArgs {
    shuffle: bool,
}

#[derive(Deserialize)]
struct RepeatArgs {
    repeat: RepeatMode,
}

impl TryFrom<RawCommand> for PlaybackCommand {
    type Error = String;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        fn args<T: DeserializeOwned>(command: &str, payload: serde_json::Value) -> Result<T, String> {
            serde_json::from_value(payload)
                .map_err(|e| format!("invalid payload for command '{}': {}", command, e))
        }

        let RawCommand { command, payload } = raw;
        Ok(match command.as_str() {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "next" => Self::Next,
            "prev" => Self::Prev,
            "seek" => {
                let SeekArgs { position } = args(&command, payload)?;
                Self::Seek { position }
            }
            "set_volume" => {
                let VolumeArgs { volume } = args(&command, payload)?;
                Self::SetVolume { volume }
            }
            "set_muted" => {
                let MutedArgs { muted } = args(&command, payload)?;
                Self::SetMuted { muted }
            }
            "set_shuffle" => {
                let ShuffleArgs { shuffle } = args(&command, payload)?;
                Self::SetShuffle { shuffle }
            }
            "set_repeat" => {
                let RepeatArgs { repeat } = args(&command, payload)?;
                Self::SetRepeat { repeat }
            }
            other => return Err(format!("unknown command '{}'", other)),
        })
    }
}

impl From<PlaybackCommand> for RawCommand {
    fn from(command: PlaybackCommand) -> Self {
        let payload = match &command {
            PlaybackCommand::Seek { position } => serde_json::json!({ "position": position }),
            PlaybackCommand::SetVolume { volume } => serde_json::json!({ "volume": volume }),
            PlaybackCommand::SetMuted { muted } => serde_json::json!({ "muted": muted }),
            PlaybackCommand::SetShuffle { shuffle } => serde_json::json!({ "shuffle": shuffle }),
            PlaybackCommand::SetRepeat { repeat } => serde_json::json!({ "repeat": repeat }),
            PlaybackCommand::Play
            | PlaybackCommand::Pause
            | PlaybackCommand::Next
            | PlaybackCommand::Prev => serde_json::Value::Null,
        };
        Self {
            command: command.name().to_string(),
            payload,
        }
    }
}

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from this client to the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Announce the device after every connect
    #[serde(rename = "playback.hello")]
    Hello {
        device_name: String,
        device_type: DeviceType,
    },

    /// Ask to become the session's audio device
    #[serde(rename = "playback.register_audio_device")]
    RegisterAudioDevice,

    /// Give up the audio device role
    #[serde(rename = "playback.unregister_audio_device")]
    UnregisterAudioDevice,

    /// Ask for the audio device role back after a reconnect
    #[serde(rename = "playback.reclaim_audio_device")]
    ReclaimAudioDevice(PlaybackState),

    /// State broadcast from the audio device
    #[serde(rename = "playback.state")]
    State(PlaybackState),

    /// Queue broadcast from the audio device
    #[serde(rename = "playback.queue_update")]
    QueueUpdate(QueueSnapshot),

    /// Remote asks for the current queue
    #[serde(rename = "playback.request_queue")]
    RequestQueue,

    /// Remote command for the audio device
    #[serde(rename = "playback.command")]
    Command(PlaybackCommand),

    /// Remote asks to take over audio output
    #[serde(rename = "playback.request_takeover")]
    RequestTakeover { transfer_id: String },

    /// Source device has paused and hands over its snapshot
    #[serde(rename = "playback.transfer_ready")]
    TransferReady(TransferSnapshot),

    /// Target device has assumed the snapshot
    #[serde(rename = "playback.transfer_complete")]
    TransferComplete { transfer_id: String },

    /// Keepalive
    #[serde(rename = "ping")]
    Ping,
}

impl ClientMessage {
    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Hello { .. } => msg_types::PLAYBACK_HELLO,
            Self::RegisterAudioDevice => msg_types::PLAYBACK_REGISTER_AUDIO_DEVICE,
            Self::UnregisterAudioDevice => msg_types::PLAYBACK_UNREGISTER_AUDIO_DEVICE,
            Self::ReclaimAudioDevice(_) => msg_types::PLAYBACK_RECLAIM_AUDIO_DEVICE,
            Self::State(_) => msg_types::PLAYBACK_STATE,
            Self::QueueUpdate(_) => msg_types::PLAYBACK_QUEUE_UPDATE,
            Self::RequestQueue => msg_types::PLAYBACK_REQUEST_QUEUE,
            Self::Command(_) => msg_types::PLAYBACK_COMMAND,
            Self::RequestTakeover { .. } => msg_types::PLAYBACK_REQUEST_TAKEOVER,
            Self::TransferReady(_) => msg_types::PLAYBACK_TRANSFER_READY,
            Self::TransferComplete { .. } => msg_types::PLAYBACK_TRANSFER_COMPLETE,
            Self::Ping => msg_types::PING,
        }
    }
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected { device_id: usize },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error(ErrorPayload),

    /// Committed user state mutation
    #[serde(rename = "sync")]
    Sync { event: SyncEvent },

    #[serde(rename = "playback.welcome")]
    Welcome(WelcomePayload),

    #[serde(rename = "playback.register_ack")]
    RegisterAck(RegisterAckPayload),

    /// State broadcast relayed from the audio device
    #[serde(rename = "playback.state")]
    State(PlaybackState),

    #[serde(rename = "playback.queue_sync")]
    QueueSync(QueueSnapshot),

    /// Command relayed to the audio device
    #[serde(rename = "playback.command")]
    Command(PlaybackCommand),

    #[serde(rename = "playback.device_list_changed")]
    DeviceListChanged(DeviceListChangedPayload),

    #[serde(rename = "playback.session_ended")]
    SessionEnded { reason: String },

    /// Sent to the audio device when another device asks to take over
    #[serde(rename = "playback.prepare_transfer")]
    PrepareTransfer(PrepareTransferPayload),

    /// Sent to the requester once the source is ready
    #[serde(rename = "playback.become_audio_device")]
    BecomeAudioDevice(TransferSnapshot),

    /// Sent to the source once the target has taken over
    #[serde(rename = "playback.transfer_complete")]
    TransferComplete { transfer_id: String },

    #[serde(rename = "playback.transfer_aborted")]
    TransferAborted { transfer_id: String, reason: String },

    #[serde(rename = "playback.error")]
    PlaybackError(PlaybackErrorPayload),
}

/// Raw `{type, payload}` envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl ServerMessage {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let Envelope { msg_type, payload } =
            serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        fn parse<T: DeserializeOwned>(
            msg_type: &str,
            payload: serde_json::Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload {
                msg_type: msg_type.to_string(),
                source,
            })
        }

        #[derive(Deserialize)]
        struct DeviceIdArgs {
            device_id: usize,
        }
        #[derive(Deserialize)]
        struct SyncArgs {
            event: SyncEvent,
        }
        #[derive(Deserialize)]
        struct ReasonArgs {
            reason: String,
        }
        #[derive(Deserialize)]
        struct TransferIdArgs {
            transfer_id: String,
        }
        #[derive(Deserialize)]
        struct AbortArgs {
            transfer_id: String,
            reason: String,
        }

        let t = msg_type.as_str();
        Ok(match t {
            msg_types::CONNECTED => {
                let DeviceIdArgs { device_id } = parse(t, payload)?;
                Self::Connected { device_id }
            }
            msg_types::PONG => Self::Pong,
            msg_types::ERROR => Self::Error(parse(t, payload)?),
            msg_types::SYNC => {
                let SyncArgs { event } = parse(t, payload)?;
                Self::Sync { event }
            }
            msg_types::PLAYBACK_WELCOME => Self::Welcome(parse(t, payload)?),
            msg_types::PLAYBACK_REGISTER_ACK => Self::RegisterAck(parse(t, payload)?),
            msg_types::PLAYBACK_STATE => Self::State(parse(t, payload)?),
            msg_types::PLAYBACK_QUEUE_SYNC => Self::QueueSync(parse(t, payload)?),
            msg_types::PLAYBACK_COMMAND => Self::Command(parse(t, payload)?),
            msg_types::PLAYBACK_DEVICE_LIST_CHANGED => {
                Self::DeviceListChanged(parse(t, payload)?)
            }
            msg_types::PLAYBACK_SESSION_ENDED => {
                let ReasonArgs { reason } = parse(t, payload)?;
                Self::SessionEnded { reason }
            }
            msg_types::PLAYBACK_PREPARE_TRANSFER => Self::PrepareTransfer(parse(t, payload)?),
            msg_types::PLAYBACK_BECOME_AUDIO_DEVICE => {
                Self::BecomeAudioDevice(parse(t, payload)?)
            }
            msg_types::PLAYBACK_TRANSFER_COMPLETE => {
                let TransferIdArgs { transfer_id } = parse(t, payload)?;
                Self::TransferComplete { transfer_id }
            }
            msg_types::PLAYBACK_TRANSFER_ABORTED => {
                let AbortArgs {
                    transfer_id,
                    reason,
                } = parse(t, payload)?;
                Self::TransferAborted {
                    transfer_id,
                    reason,
                }
            }
            msg_types::PLAYBACK_ERROR => Self::PlaybackError(parse(t, payload)?),
            _ => return Err(ProtocolError::UnknownType(msg_type)),
        })
    }

    /// Whether this message belongs to the playback session protocol
    pub fn is_playback(&self) -> bool {
        !matches!(
            self,
            Self::Connected { .. } | Self::Pong | Self::Error(_) | Self::Sync { .. }
        )
    }
}

// =============================================================================
// Payload Types
// =============================================================================

/// Versioned queue snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueItem>,
    pub queue_version: u64,
}

/// State and queue handed over during a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub transfer_id: String,
    pub state: PlaybackState,
    pub queue: Vec<QueueItem>,
}

/// Payload of the system `error` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// Payload of `playback.welcome`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomePayload {
    pub device_id: usize,
    pub session: SessionInfo,
    #[serde(default)]
    pub devices: Vec<ConnectedDevice>,
}

/// Session summary in the welcome message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlaybackState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<Vec<QueueItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_device_id: Option<usize>,
    /// The previous audio device vanished and the role can be reclaimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaimable: Option<bool>,
}

/// Payload of `playback.register_ack`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAckPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Payload of `playback.device_list_changed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceListChangedPayload {
    pub devices: Vec<ConnectedDevice>,
    pub change: DeviceChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChange {
    #[serde(rename = "type")]
    pub change_type: DeviceChangeType,
    pub device_id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceChangeType {
    Connected,
    Disconnected,
    BecameAudioDevice,
    StoppedAudioDevice,
}

/// Payload of `playback.prepare_transfer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareTransferPayload {
    pub transfer_id: String,
    pub target_device_id: usize,
    pub target_device_name: String,
}

/// Payload of `playback.error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
}

/// Message type identifiers
pub mod msg_types {
    pub const CONNECTED: &str = "connected";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const SYNC: &str = "sync";

    pub const PLAYBACK_HELLO: &str = "playback.hello";
    pub const PLAYBACK_WELCOME: &str = "playback.welcome";
    pub const PLAYBACK_REGISTER_AUDIO_DEVICE: &str = "playback.register_audio_device";
    pub const PLAYBACK_UNREGISTER_AUDIO_DEVICE: &str = "playback.unregister_audio_device";
    pub const PLAYBACK_RECLAIM_AUDIO_DEVICE: &str = "playback.reclaim_audio_device";
    pub const PLAYBACK_REGISTER_ACK: &str = "playback.register_ack";
    pub const PLAYBACK_STATE: &str = "playback.state";
    pub const PLAYBACK_QUEUE_UPDATE: &str = "playback.queue_update";
    pub const PLAYBACK_QUEUE_SYNC: &str = "playback.queue_sync";
    pub const PLAYBACK_REQUEST_QUEUE: &str = "playback.request_queue";
    pub const PLAYBACK_COMMAND: &str = "playback.command";
    pub const PLAYBACK_DEVICE_LIST_CHANGED: &str = "playback.device_list_changed";
    pub const PLAYBACK_SESSION_ENDED: &str = "playback.session_ended";
    pub const PLAYBACK_REQUEST_TAKEOVER: &str = "playback.request_takeover";
    pub const PLAYBACK_PREPARE_TRANSFER: &str = "playback.prepare_transfer";
    pub const PLAYBACK_TRANSFER_READY: &str = "playback.transfer_ready";
    pub const PLAYBACK_BECOME_AUDIO_DEVICE: &str = "playback.become_audio_device";
    pub const PLAYBACK_TRANSFER_COMPLETE: &str = "playback.transfer_complete";
    pub const PLAYBACK_TRANSFER_ABORTED: &str = "playback.transfer_aborted";
    pub const PLAYBACK_ERROR: &str = "playback.error";
}
