//! Outlet forwarding commands to the session's audio device

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use super::{Outlet, Progress};
use crate::messages::{ClientMessage, PlaybackCommand, PlaybackState};
use crate::outbox::Outbox;
use crate::playback::{now_millis, PlaybackSnapshot};
use crate::timer::ScheduledTask;

/// Sends commands as `playback.command` and interpolates remote progress
///
/// While in control, a frame loop republishes interpolated progress on a
/// watch channel so the UI gets smooth updates between state pushes.
pub struct RemoteOutlet {
    outbox: Outbox,
    remote_state: watch::Receiver<Option<PlaybackState>>,
    frame_interval: Duration,
    progress_tx: Arc<watch::Sender<Progress>>,
    frame_loop: Option<ScheduledTask>,
}

impl RemoteOutlet {
    pub fn new(
        outbox: Outbox,
        remote_state: watch::Receiver<Option<PlaybackState>>,
        frame_interval: Duration,
    ) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            outbox,
            remote_state,
            frame_interval,
            progress_tx: Arc::new(progress_tx),
            frame_loop: None,
        }
    }

    /// Interpolated progress, updated every frame while in control
    pub fn watch_progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    pub fn is_animating(&self) -> bool {
        self.frame_loop.is_some()
    }

    fn send(&self, command: PlaybackCommand) {
        debug!(command = command.name(), "Forwarding command to audio device");
        self.outbox.send(ClientMessage::Command(command));
    }

    fn current_progress(remote_state: &watch::Receiver<Option<PlaybackState>>) -> Progress {
        remote_state
            .borrow()
            .as_ref()
            .map(|state| Progress::at(state, now_millis()))
            .unwrap_or_default()
    }
}

impl Outlet for RemoteOutlet {
    fn play(&self) {
        self.send(PlaybackCommand::Play);
    }

    fn pause(&self) {
        self.send(PlaybackCommand::Pause);
    }

    fn seek(&self, position: f64) {
        self.send(PlaybackCommand::Seek { position });
    }

    fn set_volume(&self, volume: f64) {
        self.send(PlaybackCommand::SetVolume {
            volume: volume.clamp(0.0, 1.0),
        });
    }

    fn set_muted(&self, muted: bool) {
        self.send(PlaybackCommand::SetMuted { muted });
    }

    fn skip_next(&self) {
        self.send(PlaybackCommand::Next);
    }

    fn skip_previous(&self) {
        self.send(PlaybackCommand::Prev);
    }

    /// Start the frame loop; the remote state itself arrives via the watch
    fn assume_control(&mut self, _snapshot: &PlaybackSnapshot) {
        debug!("Remote outlet assuming control");
        self.progress_tx
            .send_replace(Self::current_progress(&self.remote_state));

        let remote_state = self.remote_state.clone();
        let progress_tx = self.progress_tx.clone();
        self.frame_loop = Some(ScheduledTask::every(self.frame_interval, move || {
            progress_tx.send_replace(Self::current_progress(&remote_state));
            true
        }));
    }

    fn release_control(&mut self) {
        debug!("Remote outlet releasing control");
        self.frame_loop = None;
    }

    fn progress(&self) -> Progress {
        Self::current_progress(&self.remote_state)
    }
}
