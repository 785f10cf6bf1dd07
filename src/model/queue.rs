//! [`QueueState`]: the play queue, as the "two-stacks" model.
//!
//! The distilled spec allows either an index-sequence-plus-cursor
//! representation or a two-stacks (`history` / `current` / `future`)
//! representation, provided the testable properties hold. We adopt
//! the two-stacks model: it makes "previous = pop history" (the
//! shuffle-determinism requirement) a one-liner instead of a cursor
//! decrement, and makes "queue exhausted" a direct `None` check
//! instead of a `current_index == len` comparison.

use super::LibraryState;

/// The play queue. All three fields hold indices into the
/// `LibraryState.tracks` that was current when they were pushed.
/// Invariant: every stored index is valid against the library at
/// publish time (enforced by `QueueState::retain_valid`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    /// Already-played indices, most recent last. `previous()` pops
    /// from here — deterministic even under shuffle.
    pub history: Vec<usize>,
    /// The index currently playing, if any.
    pub current: Option<usize>,
    /// Upcoming indices, next-to-play first.
    pub future: Vec<usize>,
}

impl QueueState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.history.is_empty() && self.future.is_empty()
    }

    /// Total indices held across all three parts.
    pub fn len(&self) -> usize {
        self.history.len() + self.current.is_some() as usize + self.future.len()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.current = None;
        self.future.clear();
    }

    /// Append an index to the tail of `future`.
    pub fn push_back(&mut self, index: usize) {
        self.future.push(index);
    }

    /// Move the current index (if any) to `history`, then pop the
    /// front of `future` into `current`. Returns the new current
    /// index, or `None` if the queue is now exhausted.
    pub fn advance(&mut self) -> Option<usize> {
        if let Some(cur) = self.current.take() {
            self.history.push(cur);
        }
        if self.future.is_empty() {
            self.current = None;
        } else {
            self.current = Some(self.future.remove(0));
        }
        self.current
    }

    /// Pop the most recently played index back into `current`,
    /// pushing the prior `current` (if any) onto the front of
    /// `future`. Deterministic regardless of shuffle.
    pub fn previous(&mut self) -> Option<usize> {
        let prev = self.history.pop()?;
        if let Some(cur) = self.current.take() {
            self.future.insert(0, cur);
        }
        self.current = Some(prev);
        self.current
    }

    /// Drop every stored index that is out of bounds for
    /// `library.tracks.len()`. Used after a rescan shrinks the
    /// library so the invariant "every stored index is valid" holds
    /// at the next publish.
    pub fn retain_valid(&mut self, library: &LibraryState) {
        let len = library.tracks.len();
        self.history.retain(|&i| i < len);
        self.future.retain(|&i| i < len);
        if let Some(cur) = self.current {
            if cur >= len {
                self.current = None;
            }
        }
    }
}
