//! Routes user commands to the outlet matching the session role

use tokio::sync::watch;
use tracing::info;

use super::{LocalOutlet, Outlet, Progress, RemoteOutlet};
use crate::error::OutletError;
use crate::messages::PlaybackTrack;
use crate::playback::{PlaybackEngine, PlaybackSnapshot, SessionEvent, SessionRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Local,
    Remote,
}

/// Owns both outlets and forwards every command to the active one
///
/// `Idle` and `AudioDevice` use the local outlet, `Remote` the remote one.
pub struct OutletManager<E: PlaybackEngine> {
    local: LocalOutlet<E>,
    remote: RemoteOutlet,
    active: Active,
}

impl<E: PlaybackEngine> OutletManager<E> {
    /// Start with the local outlet active
    pub fn new(local: LocalOutlet<E>, remote: RemoteOutlet) -> Self {
        Self {
            local,
            remote,
            active: Active::Local,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.active == Active::Remote
    }

    /// Switch outlets for `role`, handing `snapshot` to the incoming one
    pub fn on_role_changed(&mut self, role: SessionRole, snapshot: &PlaybackSnapshot) {
        let target = match role {
            SessionRole::Remote => Active::Remote,
            SessionRole::Idle | SessionRole::AudioDevice => Active::Local,
        };
        if target == self.active {
            return;
        }

        info!(from = ?self.active, to = ?target, "Switching playback outlet");
        self.active_mut().release_control();
        self.active = target;
        self.active_mut().assume_control(snapshot);
    }

    /// Follow role changes published by the coordinator
    pub fn handle_session_event(&mut self, event: &SessionEvent) {
        if let SessionEvent::RoleChanged { role, snapshot } = event {
            self.on_role_changed(*role, snapshot);
        }
    }

    /// Load a track on this device; never done while controlling another
    pub fn load_track(&self, track: PlaybackTrack) -> Result<(), OutletError> {
        if self.is_remote() {
            return Err(OutletError::RemoteMode("load_track"));
        }
        self.local.load_track(track);
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        self.active().progress()
    }

    /// Interpolated remote progress
    pub fn watch_remote_progress(&self) -> watch::Receiver<Progress> {
        self.remote.watch_progress()
    }

    pub fn play(&self) {
        self.active().play();
    }

    pub fn pause(&self) {
        self.active().pause();
    }

    pub fn seek(&self, position: f64) {
        let progress = self.progress();
        self.active().seek(progress.clamp(position));
    }

    pub fn seek_to_percentage(&self, percent: f64) {
        self.active().seek_to_percentage(percent);
    }

    pub fn set_volume(&self, volume: f64) {
        self.active().set_volume(volume);
    }

    pub fn set_muted(&self, muted: bool) {
        self.active().set_muted(muted);
    }

    pub fn skip_next(&self) {
        self.active().skip_next();
    }

    pub fn skip_previous(&self) {
        self.active().skip_previous();
    }

    pub fn forward_10_sec(&self) {
        self.active().forward_10_sec();
    }

    pub fn rewind_10_sec(&self) {
        self.active().rewind_10_sec();
    }

    fn active(&self) -> &dyn Outlet {
        match self.active {
            Active::Local => &self.local,
            Active::Remote => &self.remote,
        }
    }

    fn active_mut(&mut self) -> &mut dyn Outlet {
        match self.active {
            Active::Local => &mut self.local,
            Active::Remote => &mut self.remote,
        }
    }
}
