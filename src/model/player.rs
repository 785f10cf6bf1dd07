//! [`PlayerState`]: the tagged playback state.

use serde::{Deserialize, Serialize};

/// Coarse playback state. Distinct from `PlaybackStatus` naming in the
/// teacher crate to avoid confusion with the `Loading` substate, which
/// this engine does not model separately (decoder-open failures are
/// reported as an alert and the queue advances instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Repeat mode, serialized in config as `off` / `one` / `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    #[default]
    All,
}

/// Current transport state: playback status, volume, position, and
/// the pending-request fields a collector consumes and clears.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub state: PlaybackState,
    /// 0..=100.
    pub volume_percent: u8,
    pub playback_position_ms: u64,
    pub shuffle: bool,
    pub repeat_mode: RepeatMode,
    /// Index into the *current* `LibraryState.tracks`, if any.
    pub current_track_index: Option<usize>,
    /// Negative means "no pending seek request".
    pub seek_request_ms: i64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            volume_percent: 50,
            playback_position_ms: 0,
            shuffle: false,
            repeat_mode: RepeatMode::All,
            current_track_index: None,
            seek_request_ms: -1,
        }
    }
}

impl PlayerState {
    pub fn has_pending_seek(&self) -> bool {
        self.seek_request_ms >= 0
    }

    pub fn request_seek(&mut self, ms: u64) {
        self.seek_request_ms = ms as i64;
    }

    /// Consume and clear the pending seek request, if any.
    pub fn take_seek_request(&mut self) -> Option<u64> {
        if self.seek_request_ms < 0 {
            None
        } else {
            let ms = self.seek_request_ms as u64;
            self.seek_request_ms = -1;
            Some(ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_pending_seek() {
        let p = PlayerState::default();
        assert!(!p.has_pending_seek());
    }

    #[test]
    fn seek_request_roundtrip() {
        let mut p = PlayerState::default();
        p.request_seek(1500);
        assert!(p.has_pending_seek());
        assert_eq!(p.take_seek_request(), Some(1500));
        assert!(!p.has_pending_seek());
        assert_eq!(p.take_seek_request(), None);
    }
}
