//! [`Snapshot`]: the complete, immutable world state the renderer reads.

use std::sync::Arc;
use std::time::SystemTime;

use super::{Alert, LibraryState, PlayerState, QueueState};

/// Maximum number of alerts retained in a snapshot; oldest are dropped
/// first. Keeps the status bar bounded without an explicit ack/clear
/// protocol from the renderer.
pub const MAX_ALERTS: usize = 20;

/// Renderer-facing UI state. Deliberately minimal: per-widget
/// rendering is out of scope for the engineering core (§1); this only
/// carries the cursor/scroll state that the renderer needs to decide
/// *what* to draw, not *how*.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub selected_track: Option<usize>,
    pub grid_scroll_rows: u32,
}

/// The complete world state the UI renders, published atomically by
/// [`crate::snapshot::SnapshotPublisher`].
///
/// Invariants: `seq` strictly increases across publications; `library`
/// and `queue` are shared (`Arc`) so multiple snapshots may reference
/// the same instance; a reader never observes a partially mutated
/// inner structure.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub seq: u64,
    pub player: PlayerState,
    pub library: Arc<LibraryState>,
    pub queue: Arc<QueueState>,
    pub ui: UiState,
    pub alerts: Vec<Alert>,
    pub published_at: SystemTime,
}

impl Snapshot {
    /// The initial, pre-publication snapshot: `seq = 0`, empty state.
    /// The first real publication bumps `seq` to 1.
    pub fn initial() -> Self {
        Self {
            seq: 0,
            player: PlayerState::default(),
            library: Arc::new(LibraryState::empty()),
            queue: Arc::new(QueueState::empty()),
            ui: UiState::default(),
            alerts: Vec::new(),
            published_at: SystemTime::now(),
        }
    }

    /// Append an alert, evicting the oldest if the bound is exceeded.
    pub fn push_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
        if self.alerts.len() > MAX_ALERTS {
            let overflow = self.alerts.len() - MAX_ALERTS;
            self.alerts.drain(0..overflow);
        }
    }

    /// Whether `queue.current` (or any stored index) is in bounds for
    /// `library.tracks`. Cheap to check at publish time; cheap enough
    /// that the publisher can assert it in debug builds.
    pub fn queue_indices_in_bounds(&self) -> bool {
        let len = self.library.tracks.len();
        self.queue.history.iter().all(|&i| i < len)
            && self.queue.future.iter().all(|&i| i < len)
            && self.queue.current.is_none_or(|i| i < len)
    }
}
