//! Silent, clock-driven playback engine
//!
//! Nothing is decoded or rendered. Position advances with the tokio clock
//! while playing, which is all the session protocol needs from a device.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use resonance_session_sync::messages::{PlaybackTrack, QueueItem, RepeatMode};
use resonance_session_sync::playback::{now_millis, PlaybackEngine, PlaybackSnapshot};

/// Change notification for the owner of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback went from paused or stopped to playing
    Started,
    /// Anything else about the state or queue changed
    StateChanged,
}

struct Inner {
    snapshot: PlaybackSnapshot,
    /// Tracks known to this engine, by id
    tracks: HashMap<String, PlaybackTrack>,
    /// Set while playing; position is `snapshot.state.position` at this instant
    playing_since: Option<Instant>,
}

impl Inner {
    fn duration(&self) -> Option<f64> {
        self.snapshot.state.duration()
    }

    fn position_at(&self, now: Instant) -> f64 {
        let base = self.snapshot.state.position;
        let position = match self.playing_since {
            Some(since) => base + now.duration_since(since).as_secs_f64(),
            None => base,
        };
        match self.duration() {
            Some(duration) => position.clamp(0.0, duration),
            None => position.max(0.0),
        }
    }

    /// Fold elapsed play time into the stored position
    fn settle(&mut self) {
        let now = Instant::now();
        self.snapshot.state.position = self.position_at(now);
        if self.playing_since.is_some() {
            self.playing_since = Some(now);
        }
    }

    fn set_playing(&mut self, playing: bool) {
        self.settle();
        self.snapshot.state.is_playing = playing;
        self.playing_since = playing.then(Instant::now);
    }

    fn jump_to(&mut self, queue_position: usize) -> bool {
        let Some(track) = self
            .snapshot
            .queue
            .get(queue_position)
            .and_then(|item| self.tracks.get(&item.id))
            .cloned()
        else {
            return false;
        };
        self.snapshot.state.queue_position = queue_position;
        self.snapshot.state.current_track = Some(track);
        self.snapshot.state.position = 0.0;
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        true
    }
}

/// [`PlaybackEngine`] that keeps time without producing audio
pub struct HeadlessEngine {
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl HeadlessEngine {
    /// Create an engine and the receiver of its change notifications
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Mutex::new(Inner {
                snapshot: PlaybackSnapshot::default(),
                tracks: HashMap::new(),
                playing_since: None,
            }),
            events,
        };
        (engine, rx)
    }

    /// Advance past a finished track, honouring the repeat mode
    ///
    /// Returns whether anything changed.
    pub fn poll_track_end(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(duration) = inner.duration() else {
            return false;
        };
        if inner.playing_since.is_none() || inner.position_at(Instant::now()) < duration {
            return false;
        }

        let current = inner.snapshot.state.queue_position;
        let next = match inner.snapshot.state.repeat {
            RepeatMode::One => current,
            RepeatMode::All if current + 1 >= inner.snapshot.queue.len() => 0,
            _ => current + 1,
        };
        let advanced = inner.jump_to(next);
        if !advanced {
            inner.set_playing(false);
            inner.snapshot.state.position = duration;
        }
        debug!(advanced, "Track finished");
        drop(inner);
        self.emit(EngineEvent::StateChanged);
        true
    }

    fn emit(&self, event: EngineEvent) {
        // the receiver only goes away on shutdown
        let _ = self.events.send(event);
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        f(&mut self.inner.lock());
        self.emit(EngineEvent::StateChanged);
    }
}

impl PlaybackEngine for HeadlessEngine {
    fn play(&self) {
        let mut inner = self.inner.lock();
        if inner.snapshot.state.current_track.is_none() || inner.playing_since.is_some() {
            return;
        }
        inner.set_playing(true);
        drop(inner);
        self.emit(EngineEvent::Started);
    }

    fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.playing_since.is_none() {
            return;
        }
        inner.set_playing(false);
        drop(inner);
        self.emit(EngineEvent::StateChanged);
    }

    fn seek(&self, position: f64) {
        self.update(|inner| {
            let position = match inner.duration() {
                Some(duration) => position.clamp(0.0, duration),
                None => position.max(0.0),
            };
            inner.snapshot.state.position = position;
            if inner.playing_since.is_some() {
                inner.playing_since = Some(Instant::now());
            }
        });
    }

    fn set_volume(&self, volume: f64) {
        self.update(|inner| inner.snapshot.state.volume = volume.clamp(0.0, 1.0));
    }

    fn set_muted(&self, muted: bool) {
        self.update(|inner| inner.snapshot.state.muted = muted);
    }

    fn set_shuffle(&self, shuffle: bool) {
        self.update(|inner| inner.snapshot.state.shuffle = shuffle);
    }

    fn set_repeat(&self, repeat: RepeatMode) {
        self.update(|inner| inner.snapshot.state.repeat = repeat);
    }

    fn skip_next(&self) {
        self.update(|inner| {
            let next = inner.snapshot.state.queue_position + 1;
            inner.jump_to(next);
        });
    }

    fn skip_previous(&self) {
        self.update(|inner| {
            // restart the track unless it only just began
            if inner.position_at(Instant::now()) > 3.0 {
                inner.snapshot.state.position = 0.0;
                if inner.playing_since.is_some() {
                    inner.playing_since = Some(Instant::now());
                }
                return;
            }
            let previous = inner.snapshot.state.queue_position.saturating_sub(1);
            inner.jump_to(previous);
        });
    }

    fn load_track(&self, track: PlaybackTrack) {
        let mut inner = self.inner.lock();
        let queue_position = inner.snapshot.queue.len();
        inner.snapshot.queue.push(QueueItem {
            id: track.id.clone(),
            added_at: now_millis(),
        });
        inner.snapshot.state.queue_version += 1;
        inner.tracks.insert(track.id.clone(), track.clone());
        inner.snapshot.state.current_track = Some(track);
        inner.snapshot.state.queue_position = queue_position;
        inner.snapshot.state.position = 0.0;
        let was_playing = inner.playing_since.is_some();
        inner.set_playing(true);
        drop(inner);
        self.emit(if was_playing {
            EngineEvent::StateChanged
        } else {
            EngineEvent::Started
        });
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let inner = self.inner.lock();
        let mut snapshot = inner.snapshot.clone();
        snapshot.state.position = inner.position_at(Instant::now());
        snapshot.state.timestamp = now_millis();
        snapshot
    }

    fn restore(&self, snapshot: &PlaybackSnapshot) {
        let mut inner = self.inner.lock();
        if let Some(track) = &snapshot.state.current_track {
            inner.tracks.insert(track.id.clone(), track.clone());
        }
        inner.snapshot = snapshot.clone();
        inner.playing_since = snapshot.state.is_playing.then(Instant::now);
        drop(inner);
        self.emit(if snapshot.state.is_playing {
            EngineEvent::Started
        } else {
            EngineEvent::StateChanged
        });
    }

    fn stop(&self) {
        self.update(|inner| {
            inner.snapshot = PlaybackSnapshot::default();
            inner.playing_since = None;
        });
    }
}
