//! Shuffle/repeat policy layered atop [`QueueState`]'s two-stacks
//! model (§4.7 "Shuffle policy", §8's "current_index == len triggers
//! stop unless repeat = All", §9's shuffle-determinism note).
//!
//! `QueueState` itself only knows how to drain `future` into
//! `history`; it has no opinion about what should refill `future` once
//! it runs dry. That opinion — pick randomly among unplayed tracks
//! when shuffling, wrap back to the start when repeating, stop
//! otherwise — lives here.

use std::collections::HashSet;

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::model::{PlayerState, QueueState, RepeatMode};

/// What the caller should do after an `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Move to this track index.
    Next(usize),
    /// `repeat = One`: keep playing the same track.
    Continue,
    /// Nothing left to play; playback should stop.
    Stop,
}

/// Wraps a [`QueueState`] with the shuffle "played set" needed to pick
/// the next unplayed track without repeats until a full cycle
/// completes.
#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    pub state: QueueState,
    played: HashSet<usize>,
}

fn random_index(candidate_count: usize) -> usize {
    if candidate_count == 0 {
        return 0;
    }
    (OsRng.try_next_u64().expect("OS RNG") % candidate_count as u64) as usize
}

impl PlaybackQueue {
    pub fn new(state: QueueState) -> Self {
        Self {
            state,
            played: HashSet::new(),
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.state.current
    }

    /// Advance the queue per the current player's shuffle/repeat
    /// settings. `library_len` bounds the shuffle candidate pool.
    pub fn advance(&mut self, player: &PlayerState, library_len: usize) -> AdvanceOutcome {
        if player.repeat_mode == RepeatMode::One {
            return AdvanceOutcome::Continue;
        }
        if let Some(cur) = self.state.current {
            self.played.insert(cur);
        }
        if player.shuffle {
            self.advance_shuffle(player, library_len)
        } else {
            self.advance_sequential(player)
        }
    }

    fn advance_sequential(&mut self, player: &PlayerState) -> AdvanceOutcome {
        if let Some(idx) = self.state.advance() {
            return AdvanceOutcome::Next(idx);
        }
        if player.repeat_mode == RepeatMode::All && !self.state.history.is_empty() {
            // Wrap: the whole play history becomes the upcoming queue
            // again, in original order, and we start over from its head.
            self.state.future = std::mem::take(&mut self.state.history);
            return match self.state.advance() {
                Some(idx) => AdvanceOutcome::Next(idx),
                None => AdvanceOutcome::Stop,
            };
        }
        AdvanceOutcome::Stop
    }

    fn advance_shuffle(&mut self, player: &PlayerState, library_len: usize) -> AdvanceOutcome {
        let mut candidates: Vec<usize> = (0..library_len).filter(|i| !self.played.contains(i)).collect();

        if candidates.is_empty() {
            if player.repeat_mode == RepeatMode::All && library_len > 0 {
                self.played.clear();
                candidates = (0..library_len).collect();
            } else {
                // "all played, repeat = Off": stop and reset the
                // played set so the next Play starts a fresh cycle.
                self.played.clear();
                return AdvanceOutcome::Stop;
            }
        }

        let pick = candidates[random_index(candidates.len())];
        self.state.push_back(pick);
        match self.state.advance() {
            Some(idx) => AdvanceOutcome::Next(idx),
            None => AdvanceOutcome::Stop,
        }
    }

    /// Deterministic: always pops from history, regardless of
    /// shuffle (§9).
    pub fn previous(&mut self) -> Option<usize> {
        self.state.previous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepeatMode;

    fn player(shuffle: bool, repeat: RepeatMode) -> PlayerState {
        PlayerState {
            shuffle,
            repeat_mode: repeat,
            ..Default::default()
        }
    }

    #[test]
    fn sequential_exhaustion_without_repeat_stops() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.push_back(0);
        q.state.advance();
        let outcome = q.advance(&player(false, RepeatMode::Off), 1);
        assert_eq!(outcome, AdvanceOutcome::Stop);
    }

    #[test]
    fn sequential_repeat_all_wraps_to_start() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.push_back(0);
        q.state.push_back(1);
        q.state.advance(); // current = 0
        q.state.advance(); // current = 1, history = [0]
        let outcome = q.advance(&player(false, RepeatMode::All), 2);
        assert_eq!(outcome, AdvanceOutcome::Next(0));
    }

    #[test]
    fn repeat_one_always_continues() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.push_back(0);
        q.state.advance();
        let outcome = q.advance(&player(false, RepeatMode::One), 1);
        assert_eq!(outcome, AdvanceOutcome::Continue);
    }

    #[test]
    fn shuffle_never_repeats_until_cycle_exhausted() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.current = Some(0);
        let mut seen = HashSet::new();
        for _ in 0..4 {
            match q.advance(&player(true, RepeatMode::Off), 5) {
                AdvanceOutcome::Next(idx) => {
                    assert!(!seen.contains(&idx), "shuffle revisited {idx} before cycle exhaustion");
                    seen.insert(idx);
                }
                other => panic!("expected Next, got {other:?}"),
            }
        }
        assert_eq!(seen.len(), 4); // 0 was already "played" as the starting current
    }

    #[test]
    fn shuffle_all_played_repeat_off_stops_and_resets_played_set() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.current = Some(0);
        let outcome = q.advance(&player(true, RepeatMode::Off), 1);
        assert_eq!(outcome, AdvanceOutcome::Stop);
        assert!(q.played.is_empty());
    }

    #[test]
    fn previous_pops_history_even_under_shuffle() {
        let mut q = PlaybackQueue::new(QueueState::empty());
        q.state.push_back(3);
        q.state.advance();
        q.advance(&player(true, RepeatMode::Off), 10);
        let before = q.current();
        assert_eq!(q.previous(), Some(3));
        assert_ne!(q.current(), before);
    }
}
