//! JSON fixtures for the sync protocol
//!
//! Event builders return the `{"type": ..., "payload": ...}` part of an
//! event; [`sync_event`] or [`crate::MockSyncServer::push_event`] attach the
//! sequence number.

use serde_json::{json, Value};

/// Server timestamp used for every fixture event
pub const FIXTURE_TIMESTAMP: i64 = 1_700_000_000;

/// Attach `seq` and a server timestamp to an event body
pub fn sync_event(seq: i64, event: Value) -> Value {
    let mut event = event;
    if let Value::Object(fields) = &mut event {
        fields.insert("seq".to_string(), json!(seq));
        fields.insert("server_timestamp".to_string(), json!(FIXTURE_TIMESTAMP + seq));
    }
    event
}

pub fn content_liked(content_type: &str, content_id: &str) -> Value {
    json!({
        "type": "content_liked",
        "payload": {"content_type": content_type, "content_id": content_id}
    })
}

pub fn content_unliked(content_type: &str, content_id: &str) -> Value {
    json!({
        "type": "content_unliked",
        "payload": {"content_type": content_type, "content_id": content_id}
    })
}

pub fn setting_changed(key: &str, value: Value) -> Value {
    json!({
        "type": "setting_changed",
        "payload": {"setting": {"key": key, "value": value}}
    })
}

pub fn playlist_created(playlist_id: &str, name: &str) -> Value {
    json!({
        "type": "playlist_created",
        "payload": {"playlist_id": playlist_id, "name": name}
    })
}

pub fn playlist_renamed(playlist_id: &str, name: &str) -> Value {
    json!({
        "type": "playlist_renamed",
        "payload": {"playlist_id": playlist_id, "name": name}
    })
}

pub fn playlist_deleted(playlist_id: &str) -> Value {
    json!({
        "type": "playlist_deleted",
        "payload": {"playlist_id": playlist_id}
    })
}

pub fn playlist_tracks_updated(playlist_id: &str, track_ids: &[&str]) -> Value {
    json!({
        "type": "playlist_tracks_updated",
        "payload": {"playlist_id": playlist_id, "track_ids": track_ids}
    })
}

pub fn permission_granted(permission: &str) -> Value {
    json!({
        "type": "permission_granted",
        "payload": {"permission": permission}
    })
}

pub fn permission_revoked(permission: &str) -> Value {
    json!({
        "type": "permission_revoked",
        "payload": {"permission": permission}
    })
}

pub fn notification_created(notification_id: &str, title: &str) -> Value {
    json!({
        "type": "notification_created",
        "payload": {
            "notification": {
                "id": notification_id,
                "notification_type": "info",
                "title": title,
                "created_at": FIXTURE_TIMESTAMP
            }
        }
    })
}

pub fn notification_read(notification_id: &str, read_at: i64) -> Value {
    json!({
        "type": "notification_read",
        "payload": {"notification_id": notification_id, "read_at": read_at}
    })
}

pub fn catalog_invalidated(content_ids: &[&str]) -> Value {
    json!({
        "type": "catalog_invalidated",
        "payload": {"content_ids": content_ids}
    })
}

/// Builder for `GET /v1/sync/state` bodies
///
/// ```rust
/// use resonance_test_utils::fixtures::StateFixture;
///
/// let state = StateFixture::new()
///     .liked("album", "A1")
///     .playlist("P1", "Road trip", &["T1", "T2"])
///     .build(12);
///
/// assert_eq!(state["seq"], 12);
/// assert_eq!(state["likes"]["albums"][0], "A1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateFixture {
    albums: Vec<String>,
    artists: Vec<String>,
    tracks: Vec<String>,
    settings: Vec<Value>,
    playlists: Vec<Value>,
    permissions: Vec<String>,
    notifications: Vec<Value>,
}

impl StateFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a like; `content_type` is `artist`, `album` or `track`
    pub fn liked(mut self, content_type: &str, content_id: &str) -> Self {
        let bucket = match content_type {
            "artist" => &mut self.artists,
            "album" => &mut self.albums,
            _ => &mut self.tracks,
        };
        bucket.push(content_id.to_string());
        self
    }

    pub fn setting(mut self, key: &str, value: Value) -> Self {
        self.settings.push(json!({"key": key, "value": value}));
        self
    }

    pub fn playlist(mut self, id: &str, name: &str, tracks: &[&str]) -> Self {
        self.playlists
            .push(json!({"id": id, "name": name, "tracks": tracks}));
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    pub fn notification(mut self, notification_id: &str, title: &str) -> Self {
        self.notifications.push(json!({
            "id": notification_id,
            "notification_type": "info",
            "title": title,
            "created_at": FIXTURE_TIMESTAMP
        }));
        self
    }

    /// Snapshot body with the snapshot's sequence number
    pub fn build(&self, seq: i64) -> Value {
        let mut body = self.body();
        body["seq"] = json!(seq);
        body
    }

    /// Snapshot body without `seq`, as stored by [`crate::MockSyncServer`]
    pub fn body(&self) -> Value {
        json!({
            "likes": {
                "albums": self.albums,
                "artists": self.artists,
                "tracks": self.tracks
            },
            "settings": self.settings,
            "playlists": self.playlists,
            "permissions": self.permissions,
            "notifications": self.notifications
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_event_attaches_seq() {
        let event = sync_event(4, content_liked("track", "T9"));
        assert_eq!(event["seq"], 4);
        assert_eq!(event["type"], "content_liked");
        assert_eq!(event["payload"]["content_id"], "T9");
        assert_eq!(event["server_timestamp"], FIXTURE_TIMESTAMP + 4);
    }

    #[test]
    fn test_state_fixture_groups_likes() {
        let state = StateFixture::new()
            .liked("artist", "R1")
            .liked("track", "T1")
            .permission("AccessCatalog")
            .build(3);

        assert_eq!(state["likes"]["artists"][0], "R1");
        assert_eq!(state["likes"]["tracks"][0], "T1");
        assert!(state["likes"]["albums"].as_array().unwrap().is_empty());
        assert_eq!(state["permissions"][0], "AccessCatalog");
    }
}
