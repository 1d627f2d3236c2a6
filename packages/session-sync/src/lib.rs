//! Client-side state sync and multi-device playback coordination
//!
//! Two independent protocols share one WebSocket connection:
//!
//! - [`sync`]: replicates the server's per-user event log (likes, playlists,
//!   settings, permissions, notifications) into a local mirror, using a
//!   persisted cursor, REST catch-up and WebSocket pushes.
//! - [`playback`]: lets the account's devices share one "now playing"
//!   session with exactly one device rendering audio, including the
//!   ownership transfer handshake.
//!
//! [`outlet`] routes user playback commands either to the local engine or
//! to the remote audio device, depending on the session role.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use resonance_session_sync::{
//!     store::JsonFileStore,
//!     sync::{HttpSyncApi, SyncEngine, UserStateMirror},
//! };
//!
//! let store = Arc::new(JsonFileStore::open("state.json")?);
//! let api = HttpSyncApi::new(&config.server)?;
//! let engine = SyncEngine::new(api, UserStateMirror::new(), store);
//! engine.initialize().await?;
//! ```

pub mod error;
pub mod messages;
pub mod outbox;
pub mod outlet;
pub mod playback;
pub mod store;
pub mod sync;
pub mod timer;

pub use error::{OutletError, ProtocolError, StoreError, SyncError, SyncResult};
pub use messages::{ClientMessage, ServerMessage};
pub use outbox::Outbox;
pub use outlet::{LocalOutlet, Outlet, OutletManager, Progress, RemoteOutlet};
pub use playback::{
    PlaybackEngine, PlaybackSessionCoordinator, PlaybackSnapshot, RemoteJoinPreference,
    SessionEvent, SessionRole,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use sync::{EventApplier, HttpSyncApi, SyncApi, SyncEngine, SyncUpdate, UserStateMirror};
