//! Outlet driving the device's own audio engine

use std::sync::Arc;

use tracing::debug;

use super::{Outlet, Progress};
use crate::messages::PlaybackTrack;
use crate::playback::{PlaybackEngine, PlaybackSnapshot};

/// Applies commands to the local [`PlaybackEngine`]
pub struct LocalOutlet<E: PlaybackEngine> {
    engine: Arc<E>,
}

impl<E: PlaybackEngine> LocalOutlet<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn load_track(&self, track: PlaybackTrack) {
        debug!(track_id = %track.id, "Loading track locally");
        self.engine.load_track(track);
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

impl<E: PlaybackEngine> Outlet for LocalOutlet<E> {
    fn play(&self) {
        self.engine.play();
    }

    fn pause(&self) {
        self.engine.pause();
    }

    fn seek(&self, position: f64) {
        self.engine.seek(position);
    }

    fn set_volume(&self, volume: f64) {
        self.engine.set_volume(volume.clamp(0.0, 1.0));
    }

    fn set_muted(&self, muted: bool) {
        self.engine.set_muted(muted);
    }

    fn skip_next(&self) {
        self.engine.skip_next();
    }

    fn skip_previous(&self) {
        self.engine.skip_previous();
    }

    /// Carry volume and mute over from the outlet that was active before
    fn assume_control(&mut self, snapshot: &PlaybackSnapshot) {
        debug!("Local outlet assuming control");
        let current = self.engine.snapshot().state;
        if current.volume != snapshot.state.volume {
            self.engine.set_volume(snapshot.state.volume);
        }
        if current.muted != snapshot.state.muted {
            self.engine.set_muted(snapshot.state.muted);
        }
    }

    fn release_control(&mut self) {
        debug!("Local outlet releasing control");
    }

    fn progress(&self) -> Progress {
        let state = self.engine.snapshot().state;
        Progress {
            position: state.position,
            duration: state.duration().unwrap_or_default(),
            is_playing: state.is_playing,
        }
    }
}
