//! Local audio engine boundary

use crate::messages::{PlaybackState, PlaybackTrack, QueueItem, RepeatMode};

/// State and queue captured together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub queue: Vec<QueueItem>,
}

impl PlaybackSnapshot {
    pub fn new(state: PlaybackState, queue: Vec<QueueItem>) -> Self {
        Self { state, queue }
    }
}

/// The device's own audio output
///
/// Decoding and rendering live behind this trait. Methods take `&self`
/// because the engine is shared between the session coordinator and the
/// local outlet; implementations synchronize internally.
pub trait PlaybackEngine: Send + Sync + 'static {
    fn play(&self);

    fn pause(&self);

    /// Seek within the current track, in seconds
    fn seek(&self, position: f64);

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn set_shuffle(&self, shuffle: bool);

    fn set_repeat(&self, repeat: RepeatMode);

    fn skip_next(&self);

    fn skip_previous(&self);

    /// Replace the current track and start playing it
    fn load_track(&self, track: PlaybackTrack);

    /// Capture the current state and queue
    fn snapshot(&self) -> PlaybackSnapshot;

    /// Adopt a snapshot handed over by another device
    ///
    /// Playback resumes at `state.position` if `state.is_playing` is set.
    fn restore(&self, snapshot: &PlaybackSnapshot);

    /// Stop rendering and unload the current track
    fn stop(&self);

    fn has_track(&self) -> bool {
        self.snapshot().state.current_track.is_some()
    }

    fn is_playing(&self) -> bool {
        self.snapshot().state.is_playing
    }
}
