//! Integration tests for audio device arbitration and playback transfer
//!
//! Several coordinators talk to an in-process session server, so these
//! tests cover the full handshake from both sides.

mod common;

use std::time::Duration;

use common::{track, FakeSessionServer, MockPlaybackEngine, TransferBehavior};
use resonance_session_sync::messages::{ClientMessage, PlaybackCommand};
use resonance_session_sync::playback::{PlaybackEngine, SessionEvent, SessionRole};
use tokio::sync::broadcast;

/// Device 1 plays and owns the session, device 2 controls it remotely
fn remote_controlled_session() -> (FakeSessionServer, usize, usize) {
    let mut server = FakeSessionServer::new();
    let speaker = server.connect_with(
        "Living Room",
        MockPlaybackEngine::playing(track("track-1", 200.0), 30.0),
    );
    let phone = server.connect("Phone");

    assert!(server.coordinator(phone).enter_remote_mode());
    server.pump();
    (server, speaker, phone)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_playing_device_registers_on_welcome() {
    let mut server = FakeSessionServer::new();
    let speaker = server.connect_with(
        "Living Room",
        MockPlaybackEngine::playing(track("track-1", 200.0), 0.0),
    );

    assert_eq!(server.role(speaker), SessionRole::AudioDevice);
    assert_eq!(server.audio_device(), Some(speaker));
    assert!(server.device(speaker).coordinator.is_broadcasting());
    // first broadcast carries state and the queue
    let state = server.session_state().expect("state broadcast");
    assert_eq!(state.current_track.as_ref().unwrap().id, "track-1");
}

#[tokio::test]
async fn test_simultaneous_registration_has_single_winner() {
    let mut server = FakeSessionServer::new();
    let first = server.connect("Laptop");
    let second = server.connect("Desktop");

    server
        .device(first)
        .engine
        .load_track(track("track-1", 180.0));
    server
        .device(second)
        .engine
        .load_track(track("track-2", 180.0));
    server.coordinator(first).on_local_playback_started();
    server.coordinator(second).on_local_playback_started();
    server.pump();

    assert_eq!(server.audio_devices(), vec![first]);
    assert_eq!(server.audio_device(), Some(first));
    assert_eq!(server.role(second), SessionRole::Idle);
    assert!(server.device(second).coordinator.session().exists);
}

#[tokio::test]
async fn test_joining_device_sees_session() {
    let (server, speaker, phone) = remote_controlled_session();

    assert_eq!(server.role(speaker), SessionRole::AudioDevice);
    assert_eq!(server.role(phone), SessionRole::Remote);

    let phone = &server.device(phone).coordinator;
    assert_eq!(phone.session().audio_device_id, Some(speaker));
    assert_eq!(phone.remote_state().unwrap().position, 30.0);
    assert_eq!(phone.remote_queue().unwrap().queue.len(), 2);
    assert_eq!(phone.devices().len(), 2);
}

#[tokio::test]
async fn test_unregister_ends_session_for_remotes() {
    let (mut server, speaker, phone) = remote_controlled_session();

    assert!(server.coordinator(speaker).unregister());
    server.pump();

    assert_eq!(server.audio_device(), None);
    assert_eq!(server.role(speaker), SessionRole::Idle);
    assert!(!server.device(speaker).engine.has_track());
    assert_eq!(server.role(phone), SessionRole::Idle);
    assert!(server.device(phone).coordinator.remote_state().is_none());
}

// ============================================================================
// Remote commands
// ============================================================================

#[tokio::test]
async fn test_remote_command_reaches_audio_device() {
    let (mut server, speaker, phone) = remote_controlled_session();

    assert!(server
        .coordinator(phone)
        .send_command(PlaybackCommand::Seek { position: 90.0 }));
    server.pump();

    assert_eq!(server.device(speaker).engine.state().position, 90.0);
    // the audio device rebroadcasts and the remote follows
    assert_eq!(
        server.device(phone).coordinator.remote_state().unwrap().position,
        90.0
    );
}

#[tokio::test]
async fn test_commands_dropped_outside_remote_mode() {
    let (mut server, speaker, phone) = remote_controlled_session();
    server.coordinator(phone).exit_remote_mode();

    assert!(!server.coordinator(phone).send_command(PlaybackCommand::Pause));
    server.pump();
    assert!(server.device(speaker).engine.is_playing());
}

// ============================================================================
// Transfer
// ============================================================================

#[tokio::test]
async fn test_completed_transfer_moves_audio_device() {
    let (mut server, speaker, phone) = remote_controlled_session();
    let mut speaker_events = server.device(speaker).coordinator.subscribe();

    let transfer_id = server
        .coordinator(phone)
        .request_takeover()
        .expect("phone is in remote mode");
    server.pump();

    assert_eq!(server.role(phone), SessionRole::AudioDevice);
    assert_eq!(server.role(speaker), SessionRole::Idle);
    assert_eq!(server.audio_device(), Some(phone));
    assert_eq!(server.audio_devices(), vec![phone]);

    let restored = server.device(phone).engine.state();
    assert!(restored.is_playing);
    assert_eq!(restored.current_track.as_ref().unwrap().id, "track-1");
    assert!(restored.position >= 30.0 && restored.position < 32.0);

    let speaker_calls = server.device(speaker).engine.calls();
    assert_eq!(speaker_calls, vec!["pause", "stop"]);
    assert!(!server.device(speaker).engine.has_track());

    assert!(drain(&mut speaker_events).contains(&SessionEvent::SessionAvailable {
        audio_device_id: Some(phone)
    }));
    assert!(server.received.iter().any(|(from, msg)| {
        *from == phone && *msg == ClientMessage::TransferComplete {
            transfer_id: transfer_id.clone()
        }
    }));
}

#[tokio::test]
async fn test_aborted_transfer_restores_source() {
    let (mut server, speaker, phone) = remote_controlled_session();
    server.transfer_behavior = TransferBehavior::Abort;
    let mut phone_events = server.device(phone).coordinator.subscribe();

    let transfer_id = server.coordinator(phone).request_takeover().unwrap();
    server.pump();

    assert_eq!(server.role(speaker), SessionRole::AudioDevice);
    assert!(server.device(speaker).engine.is_playing());
    assert_eq!(server.device(speaker).engine.calls(), vec!["pause", "play"]);

    assert_eq!(server.role(phone), SessionRole::Remote);
    assert!(server.device(phone).coordinator.pending_transfer_id().is_none());
    assert!(drain(&mut phone_events).contains(&SessionEvent::TransferFailed {
        transfer_id,
        reason: "target_disconnected".to_string(),
    }));
}

#[tokio::test]
async fn test_rejected_takeover_fails_without_timeout() {
    let (mut server, speaker, phone) = remote_controlled_session();
    server.reject_takeovers = true;
    let mut phone_events = server.device(phone).coordinator.subscribe();

    let transfer_id = server.coordinator(phone).request_takeover().unwrap();
    server.pump();

    assert!(server.device(phone).coordinator.pending_transfer_id().is_none());
    assert_eq!(server.role(phone), SessionRole::Remote);
    assert!(server.device(speaker).engine.calls().is_empty());
    assert!(drain(&mut phone_events).contains(&SessionEvent::TransferFailed {
        transfer_id,
        reason: "transfer_rejected".to_string(),
    }));
}

#[tokio::test]
async fn test_repeated_takeover_request_reuses_ticket() {
    let (mut server, _speaker, phone) = remote_controlled_session();
    server.transfer_behavior = TransferBehavior::Swallow;

    let first = server.coordinator(phone).request_takeover().unwrap();
    server.pump();
    let second = server.coordinator(phone).request_takeover().unwrap();

    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_transfer_times_out_on_both_sides() {
    let (mut server, speaker, phone) = remote_controlled_session();
    server.transfer_behavior = TransferBehavior::Swallow;

    server.coordinator(phone).request_takeover().unwrap();
    server.pump();
    assert!(!server.device(speaker).engine.is_playing());

    tokio::time::sleep(Duration::from_millis(15_001)).await;
    server.pump_ticks();

    assert!(server.device(phone).coordinator.pending_transfer_id().is_none());
    assert_eq!(server.role(phone), SessionRole::Remote);
    assert_eq!(server.role(speaker), SessionRole::AudioDevice);
    assert!(server.device(speaker).engine.is_playing());
}
