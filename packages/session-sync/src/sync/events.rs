//! Sync wire model
//!
//! Mirrors the server's append-only user event log and its full-state
//! snapshot. Events are adjacently tagged (`{"type": ..., "payload": ...}`)
//! and flattened next to their sequence number.

use serde::{Deserialize, Serialize};

/// Kind of content a like refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikedContentType {
    Artist,
    Album,
    Track,
}

/// A single user setting (`{"key": ..., "value": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSetting {
    pub key: String,
    pub value: serde_json::Value,
}

/// Permission identifiers as sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    AccessCatalog,
    LikeContent,
    OwnPlaylists,
    EditCatalog,
    ManagePermissions,
    ServerAdmin,
    ViewAnalytics,
    RequestContent,
    DownloadManagerAdmin,
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub read_at: Option<i64>,
    pub created_at: i64,
}

/// One committed mutation of server-owned user state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UserEvent {
    // Likes
    ContentLiked {
        content_type: LikedContentType,
        content_id: String,
    },
    ContentUnliked {
        content_type: LikedContentType,
        content_id: String,
    },

    // Settings
    SettingChanged {
        setting: UserSetting,
    },

    // Playlists
    PlaylistCreated {
        playlist_id: String,
        name: String,
    },
    PlaylistRenamed {
        playlist_id: String,
        name: String,
    },
    PlaylistDeleted {
        playlist_id: String,
    },
    PlaylistTracksUpdated {
        playlist_id: String,
        track_ids: Vec<String>,
    },

    // Permissions
    PermissionGranted {
        permission: Permission,
    },
    PermissionRevoked {
        permission: Permission,
    },
    PermissionsReset {
        permissions: Vec<Permission>,
    },

    // Notifications
    NotificationCreated {
        notification: Notification,
    },
    NotificationRead {
        notification_id: String,
        read_at: i64,
    },

    // Cached catalog data that must be refetched
    CatalogInvalidated {
        content_ids: Vec<String>,
    },
}

impl UserEvent {
    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            UserEvent::ContentLiked { .. } => "content_liked",
            UserEvent::ContentUnliked { .. } => "content_unliked",
            UserEvent::SettingChanged { .. } => "setting_changed",
            UserEvent::PlaylistCreated { .. } => "playlist_created",
            UserEvent::PlaylistRenamed { .. } => "playlist_renamed",
            UserEvent::PlaylistDeleted { .. } => "playlist_deleted",
            UserEvent::PlaylistTracksUpdated { .. } => "playlist_tracks_updated",
            UserEvent::PermissionGranted { .. } => "permission_granted",
            UserEvent::PermissionRevoked { .. } => "permission_revoked",
            UserEvent::PermissionsReset { .. } => "permissions_reset",
            UserEvent::NotificationCreated { .. } => "notification_created",
            UserEvent::NotificationRead { .. } => "notification_read",
            UserEvent::CatalogInvalidated { .. } => "catalog_invalidated",
        }
    }
}

/// An event with its position in the user's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub seq: i64,
    #[serde(flatten)]
    pub event: UserEvent,
    pub server_timestamp: i64,
}

/// Liked content ids grouped by type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikesState {
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// A playlist in the full-state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Response of `GET /v1/sync/state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    pub seq: i64,
    #[serde(default)]
    pub likes: LikesState,
    #[serde(default)]
    pub settings: Vec<UserSetting>,
    #[serde(default)]
    pub playlists: Vec<PlaylistState>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Response of `GET /v1/sync/events?since=N`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<SyncEvent>,
    pub current_seq: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_event_flattens_type_and_payload() {
        let json = r#"{
            "seq": 7,
            "type": "content_liked",
            "payload": {"content_type": "album", "content_id": "A123"},
            "server_timestamp": 1700000000
        }"#;
        let event: SyncEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.seq, 7);
        assert_eq!(
            event.event,
            UserEvent::ContentLiked {
                content_type: LikedContentType::Album,
                content_id: "A123".to_string(),
            }
        );
        assert_eq!(event.event.event_type(), "content_liked");
    }

    #[test]
    fn setting_changed_uses_key_value_shape() {
        let json = r#"{
            "seq": 3,
            "type": "setting_changed",
            "payload": {"setting": {"key": "enable_external_search", "value": true}},
            "server_timestamp": 1
        }"#;
        let event: SyncEvent = serde_json::from_str(json).unwrap();
        match event.event {
            UserEvent::SettingChanged { setting } => {
                assert_eq!(setting.key, "enable_external_search");
                assert_eq!(setting.value, serde_json::json!(true));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn permissions_use_server_names() {
        let json = r#"{"seq":1,"type":"permissions_reset","payload":{"permissions":["AccessCatalog","LikeContent"]},"server_timestamp":0}"#;
        let event: SyncEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event.event,
            UserEvent::PermissionsReset {
                permissions: vec![Permission::AccessCatalog, Permission::LikeContent],
            }
        );
    }

    #[test]
    fn full_state_tolerates_missing_collections() {
        let state: FullState = serde_json::from_str(r#"{"seq": 12}"#).unwrap();
        assert_eq!(state.seq, 12);
        assert!(state.playlists.is_empty());
        assert!(state.likes.tracks.is_empty());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let json = r#"{"seq":1,"type":"download_completed","payload":{},"server_timestamp":0}"#;
        assert!(serde_json::from_str::<SyncEvent>(json).is_err());
    }
}
