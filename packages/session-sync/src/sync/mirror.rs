//! Local mirror of server-owned user state

use std::collections::{BTreeMap, BTreeSet};

use super::events::{FullState, LikedContentType, Notification, Permission, SyncEvent, UserEvent};

/// Destination of replicated events
///
/// The sync engine guarantees ordered, exactly-once-effective delivery;
/// implementations only decide what each event means locally.
pub trait EventApplier: Send {
    /// Whether the applier still holds state from a previous sync
    ///
    /// A fresh process with an in-memory mirror returns `false`, which forces
    /// a full sync even when a persisted cursor exists.
    fn has_state(&self) -> bool;

    /// Replace all mirrored state with a server snapshot
    fn reset(&mut self, state: &FullState);

    /// Apply one event on top of the current state
    fn apply(&mut self, event: &SyncEvent);

    /// Drop all mirrored state (logout)
    fn clear(&mut self);
}

/// A playlist as mirrored locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredPlaylist {
    pub name: String,
    pub tracks: Vec<String>,
}

/// In-memory [`EventApplier`] covering every event type
///
/// All mutations use set/map semantics, so re-applying an event leaves the
/// mirror unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserStateMirror {
    loaded: bool,
    likes: BTreeMap<LikedContentType, BTreeSet<String>>,
    settings: BTreeMap<String, serde_json::Value>,
    playlists: BTreeMap<String, MirroredPlaylist>,
    /// Playlist ids in creation order
    playlist_order: Vec<String>,
    permissions: BTreeSet<Permission>,
    notifications: BTreeMap<String, Notification>,
    invalidated_catalog: BTreeSet<String>,
}

impl UserStateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_liked(&self, content_type: LikedContentType, content_id: &str) -> bool {
        self.likes
            .get(&content_type)
            .map(|ids| ids.contains(content_id))
            .unwrap_or(false)
    }

    pub fn liked(&self, content_type: LikedContentType) -> Vec<String> {
        self.likes
            .get(&content_type)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    pub fn playlist(&self, playlist_id: &str) -> Option<&MirroredPlaylist> {
        self.playlists.get(playlist_id)
    }

    /// Playlists in creation order
    pub fn playlists(&self) -> impl Iterator<Item = (&String, &MirroredPlaylist)> {
        self.playlist_order
            .iter()
            .filter_map(|id| self.playlists.get_key_value(id))
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn permissions(&self) -> Vec<Permission> {
        self.permissions.iter().copied().collect()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.values()
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications
            .values()
            .filter(|n| n.read_at.is_none())
            .count()
    }

    /// Drain catalog ids whose cached data went stale
    pub fn take_invalidated(&mut self) -> Vec<String> {
        std::mem::take(&mut self.invalidated_catalog)
            .into_iter()
            .collect()
    }

    fn likes_mut(&mut self, content_type: LikedContentType) -> &mut BTreeSet<String> {
        self.likes.entry(content_type).or_default()
    }
}

impl EventApplier for UserStateMirror {
    fn has_state(&self) -> bool {
        self.loaded
    }

    fn reset(&mut self, state: &FullState) {
        let mut likes = BTreeMap::new();
        likes.insert(
            LikedContentType::Album,
            state.likes.albums.iter().cloned().collect(),
        );
        likes.insert(
            LikedContentType::Artist,
            state.likes.artists.iter().cloned().collect(),
        );
        likes.insert(
            LikedContentType::Track,
            state.likes.tracks.iter().cloned().collect(),
        );

        self.likes = likes;
        self.settings = state
            .settings
            .iter()
            .map(|s| (s.key.clone(), s.value.clone()))
            .collect();
        self.playlists = state
            .playlists
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    MirroredPlaylist {
                        name: p.name.clone(),
                        tracks: p.tracks.clone(),
                    },
                )
            })
            .collect();
        self.playlist_order = state.playlists.iter().map(|p| p.id.clone()).collect();
        self.permissions = state.permissions.iter().copied().collect();
        self.notifications = state
            .notifications
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();
        self.loaded = true;
    }

    fn apply(&mut self, event: &SyncEvent) {
        match &event.event {
            UserEvent::ContentLiked {
                content_type,
                content_id,
            } => {
                self.likes_mut(*content_type).insert(content_id.clone());
            }
            UserEvent::ContentUnliked {
                content_type,
                content_id,
            } => {
                self.likes_mut(*content_type).remove(content_id);
            }
            UserEvent::SettingChanged { setting } => {
                self.settings
                    .insert(setting.key.clone(), setting.value.clone());
            }
            UserEvent::PlaylistCreated { playlist_id, name } => {
                if !self.playlists.contains_key(playlist_id) {
                    self.playlists.insert(
                        playlist_id.clone(),
                        MirroredPlaylist {
                            name: name.clone(),
                            tracks: Vec::new(),
                        },
                    );
                    self.playlist_order.push(playlist_id.clone());
                }
            }
            UserEvent::PlaylistRenamed { playlist_id, name } => {
                if let Some(playlist) = self.playlists.get_mut(playlist_id) {
                    playlist.name = name.clone();
                }
            }
            UserEvent::PlaylistDeleted { playlist_id } => {
                if self.playlists.remove(playlist_id).is_some() {
                    self.playlist_order.retain(|id| id != playlist_id);
                }
            }
            UserEvent::PlaylistTracksUpdated {
                playlist_id,
                track_ids,
            } => {
                if let Some(playlist) = self.playlists.get_mut(playlist_id) {
                    playlist.tracks = track_ids.clone();
                }
            }
            UserEvent::PermissionGranted { permission } => {
                self.permissions.insert(*permission);
            }
            UserEvent::PermissionRevoked { permission } => {
                self.permissions.remove(permission);
            }
            UserEvent::PermissionsReset { permissions } => {
                self.permissions = permissions.iter().copied().collect();
            }
            UserEvent::NotificationCreated { notification } => {
                self.notifications
                    .insert(notification.id.clone(), notification.clone());
            }
            UserEvent::NotificationRead {
                notification_id,
                read_at,
            } => {
                if let Some(notification) = self.notifications.get_mut(notification_id) {
                    notification.read_at = Some(*read_at);
                }
            }
            UserEvent::CatalogInvalidated { content_ids } => {
                self.invalidated_catalog
                    .extend(content_ids.iter().cloned());
            }
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Two mirrors are equal when they hold the same user state; the pending
/// catalog invalidations are a work queue, not state.
impl PartialEq for UserStateMirror {
    fn eq(&self, other: &Self) -> bool {
        let likes_eq = [
            LikedContentType::Album,
            LikedContentType::Artist,
            LikedContentType::Track,
        ]
        .iter()
        .all(|t| self.liked(*t) == other.liked(*t));

        likes_eq
            && self.settings == other.settings
            && self.playlists == other.playlists
            && self.playlist_order == other.playlist_order
            && self.permissions == other.permissions
            && self.notifications == other.notifications
    }
}
