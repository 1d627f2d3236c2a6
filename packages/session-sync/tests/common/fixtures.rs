//! Playback fixtures

use std::sync::Arc;

use resonance_session_sync::messages::{PlaybackState, PlaybackTrack, QueueItem};
use resonance_session_sync::playback::now_millis;
use resonance_session_sync::store::MemoryStore;
use resonance_session_sync::sync::{HttpSyncApi, SyncEngine, UserStateMirror};
use resonance_shared_config::ServerConfig;

pub fn track(id: &str, duration: f64) -> PlaybackTrack {
    PlaybackTrack {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist_id: "artist-1".to_string(),
        artist_name: "Test Artist".to_string(),
        album_id: "album-1".to_string(),
        album_title: "Test Album".to_string(),
        duration,
        track_number: Some(1),
        image_id: None,
    }
}

pub fn queue(ids: &[&str]) -> Vec<QueueItem> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| QueueItem {
            id: id.to_string(),
            added_at: i as u64,
        })
        .collect()
}

/// A playing state sampled at `timestamp`
pub fn playing_state(position: f64, duration: f64, timestamp: u64) -> PlaybackState {
    PlaybackState {
        current_track: Some(track("track-1", duration)),
        position,
        is_playing: true,
        queue_version: 1,
        timestamp,
        ..PlaybackState::default()
    }
}

/// A playing state sampled now
pub fn playing_now(position: f64, duration: f64) -> PlaybackState {
    playing_state(position, duration, now_millis())
}

/// Sync engine talking to `url`, with its own in-memory store
pub fn http_sync_engine(url: &str) -> (Arc<SyncEngine<HttpSyncApi>>, MemoryStore) {
    let store = MemoryStore::new();
    let api = HttpSyncApi::new(&ServerConfig::with_url(url)).expect("http client");
    let engine = SyncEngine::new(api, UserStateMirror::new(), Arc::new(store.clone()));
    (Arc::new(engine), store)
}
