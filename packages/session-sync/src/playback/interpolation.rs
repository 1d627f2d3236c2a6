//! Client-side progress interpolation between state pushes

use crate::messages::PlaybackState;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Position of a remote track at `now_ms`
///
/// A playing sample advances by the wall-clock time elapsed since it was
/// captured; a paused one stays put. The result never leaves
/// `[0, duration]`.
pub fn interpolate_position(state: &PlaybackState, now_ms: u64) -> f64 {
    let position = if state.is_playing {
        let elapsed_ms = now_ms.saturating_sub(state.timestamp);
        state.position + elapsed_ms as f64 / 1000.0
    } else {
        state.position
    };

    match state.duration() {
        Some(duration) => position.clamp(0.0, duration.max(0.0)),
        None => position.max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::PlaybackTrack;
    use rstest::rstest;

    fn state(position: f64, is_playing: bool, duration: f64) -> PlaybackState {
        PlaybackState {
            current_track: Some(PlaybackTrack {
                id: "t".to_string(),
                title: "Track".to_string(),
                artist_id: "a".to_string(),
                artist_name: "Artist".to_string(),
                album_id: "b".to_string(),
                album_title: "Album".to_string(),
                duration,
                track_number: None,
                image_id: None,
            }),
            position,
            is_playing,
            timestamp: 1_000_000,
            ..Default::default()
        }
    }

    #[rstest]
    #[case::playing_advances(30.0, true, 5_000, 35.0)]
    #[case::paused_holds(30.0, false, 5_000, 30.0)]
    #[case::clamped_to_duration(178.0, true, 10_000, 180.0)]
    #[case::clock_skew_never_rewinds(30.0, true, 0, 30.0)]
    fn interpolates(
        #[case] position: f64,
        #[case] is_playing: bool,
        #[case] elapsed_ms: u64,
        #[case] expected: f64,
    ) {
        let s = state(position, is_playing, 180.0);
        let now = if elapsed_ms == 0 {
            s.timestamp - 2_000
        } else {
            s.timestamp + elapsed_ms
        };
        let actual = interpolate_position(&s, now);
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn without_track_only_floors_at_zero() {
        let s = PlaybackState {
            position: 12.0,
            is_playing: true,
            timestamp: 0,
            ..Default::default()
        };
        assert!((interpolate_position(&s, 3_000) - 15.0).abs() < 1e-9);
    }
}
