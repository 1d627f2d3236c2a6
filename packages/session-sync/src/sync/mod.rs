//! User state replication

mod api;
mod cursor;
mod engine;
mod events;
mod mirror;

pub use api::{HttpSyncApi, SyncApi};
pub use cursor::{SyncCursor, CURSOR_KEY};
pub use engine::{SyncEngine, SyncUpdate};
pub use events::{
    EventsPage, FullState, LikedContentType, LikesState, Notification, Permission,
    PlaylistState, SyncEvent, UserEvent, UserSetting,
};
pub use mirror::{EventApplier, MirroredPlaylist, UserStateMirror};
