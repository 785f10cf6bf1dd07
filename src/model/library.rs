//! [`LibraryState`]: the ordered track list plus scan progress.

use super::Track;

/// Shared-immutable snapshot of the music library. Once a `Snapshot`
/// holds an `Arc<LibraryState>`, that instance is never mutated again —
/// updates allocate a fresh `LibraryState` (copy-on-write, see
/// `snapshot::SnapshotPublisher`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryState {
    /// Tracks in canonical UI order: ascending `(artist, date,
    /// track_number)`, stable sort (ties preserve filesystem-walk
    /// order, i.e. album order).
    pub tracks: Vec<Track>,
    pub is_scanning: bool,
    pub scanned_count: u64,
    pub total_count: u64,
}

impl LibraryState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort `tracks` in place into canonical UI order. Must be called
    /// after any mutation that could change `(artist, date,
    /// track_number)` ordering.
    pub fn sort_tracks(&mut self) {
        self.tracks
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    pub fn with_tracks(mut tracks: Vec<Track>) -> Self {
        tracks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            tracks,
            is_scanning: false,
            scanned_count: 0,
            total_count: 0,
        }
    }
}
