//! Playback outlets
//!
//! An outlet is where user playback commands go: the local engine, or the
//! session's audio device over the WebSocket. [`OutletManager`] picks one
//! from the coordinator's role.

mod local;
mod manager;
mod remote;

pub use local::LocalOutlet;
pub use manager::OutletManager;
pub use remote::RemoteOutlet;

use crate::messages::PlaybackState;
use crate::playback::{interpolate_position, PlaybackSnapshot};

/// Seconds moved by `forward_10_sec` / `rewind_10_sec`
pub const SKIP_SECONDS: f64 = 10.0;

/// Progress as shown to the user
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub position: f64,
    /// Zero when nothing is loaded
    pub duration: f64,
    pub is_playing: bool,
}

impl Progress {
    /// Progress of `state` at `now_ms`, interpolating if it is playing
    pub fn at(state: &PlaybackState, now_ms: u64) -> Self {
        Self {
            position: interpolate_position(state, now_ms),
            duration: state.duration().unwrap_or_default(),
            is_playing: state.is_playing,
        }
    }

    /// Keep `position` within the current track
    pub fn clamp(&self, position: f64) -> f64 {
        if self.duration > 0.0 {
            position.clamp(0.0, self.duration)
        } else {
            position.max(0.0)
        }
    }

    /// Fraction of the track played, in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Destination of user playback commands
pub trait Outlet: Send {
    fn play(&self);

    fn pause(&self);

    /// Seek to an absolute position in seconds
    fn seek(&self, position: f64);

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn skip_next(&self);

    fn skip_previous(&self);

    /// Become the active outlet, continuing from `snapshot`
    fn assume_control(&mut self, snapshot: &PlaybackSnapshot);

    /// Stop being the active outlet
    fn release_control(&mut self);

    fn progress(&self) -> Progress;

    /// Seek to `percent` (0-100) of the current track
    fn seek_to_percentage(&self, percent: f64) {
        let progress = self.progress();
        if progress.duration <= 0.0 {
            return;
        }
        self.seek(progress.duration * percent.clamp(0.0, 100.0) / 100.0);
    }

    fn forward_10_sec(&self) {
        let progress = self.progress();
        self.seek(progress.clamp(progress.position + SKIP_SECONDS));
    }

    fn rewind_10_sec(&self) {
        let progress = self.progress();
        self.seek(progress.clamp(progress.position - SKIP_SECONDS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_duration() {
        let progress = Progress {
            position: 175.0,
            duration: 180.0,
            is_playing: true,
        };
        assert_eq!(progress.clamp(185.0), 180.0);
        assert_eq!(progress.clamp(-3.0), 0.0);
        assert!((progress.fraction() - 175.0 / 180.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_without_track_only_floors() {
        let progress = Progress::default();
        assert_eq!(progress.clamp(12.0), 12.0);
        assert_eq!(progress.clamp(-1.0), 0.0);
        assert_eq!(progress.fraction(), 0.0);
    }
}
