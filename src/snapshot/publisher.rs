//! [`SnapshotPublisher`]: single-writer / multi-reader double-buffered
//! world state.
//!
//! The distilled design describes two fixed `Snapshot` slots plus an
//! atomic front pointer and a plain back pointer, with the producer
//! copying the published front back into its own back buffer after
//! each swap. We get the same guarantees — readers always observe a
//! fully-constructed snapshot, writers are serialized, `seq` is
//! totally ordered — from an `Arc<Snapshot>` published through
//! [`arc_swap::ArcSwap`]: the "back buffer" is just the writer's local
//! clone of the current front, and "copy front into back" happens for
//! free because the next writer starts by cloning the snapshot that
//! was just published.

use std::sync::Arc;

use arc_swap::ArcSwap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Serializes producers via a mutex; exposes wait-free reads.
pub struct SnapshotPublisher {
    front: ArcSwap<Snapshot>,
    /// Guards the read-mutate-swap sequence in `update`. A
    /// `std::sync::Mutex` (not `parking_lot`) is used deliberately so a
    /// panicking writer poisons it and the next `update` call surfaces
    /// [`Error::PoisonedWriter`] instead of silently racing.
    write_lock: Mutex<()>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self {
            front: ArcSwap::from_pointee(Snapshot::initial()),
            write_lock: Mutex::new(()),
        }
    }

    /// Lock-free: loads the front pointer with acquire ordering and
    /// returns a read-only handle. Never blocks on the write lock.
    pub fn get_current(&self) -> Arc<Snapshot> {
        self.front.load_full()
    }

    /// Acquire the write lock, clone the current front into a working
    /// "back buffer", run `mutator` on it, bump `seq`, and publish it
    /// as the new front.
    ///
    /// Returns the newly published `seq`. Fails with
    /// [`Error::PoisonedWriter`] if a previous writer panicked while
    /// holding the lock.
    pub fn update<F>(&self, mutator: F) -> Result<u64>
    where
        F: FnOnce(&mut Snapshot),
    {
        let _guard = self.write_lock.lock().map_err(|_| Error::PoisonedWriter)?;

        let current = self.front.load_full();
        let mut back: Snapshot = (*current).clone();
        mutator(&mut back);
        back.seq = current.seq + 1;
        back.published_at = std::time::SystemTime::now();

        debug_assert!(
            back.queue_indices_in_bounds(),
            "mutator published a queue index out of bounds for its library"
        );

        self.front.store(Arc::new(back));
        Ok(current.seq + 1)
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioFormat, Track};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn seq_strictly_increases_across_updates() {
        let publisher = SnapshotPublisher::new();
        assert_eq!(publisher.get_current().seq, 0);

        let seq1 = publisher.update(|_| {}).unwrap();
        let seq2 = publisher.update(|_| {}).unwrap();
        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);
        assert_eq!(publisher.get_current().seq, 2);
    }

    #[test]
    fn no_op_mutator_still_advances_seq_by_exactly_one() {
        let publisher = SnapshotPublisher::new();
        let before = publisher.get_current().seq;
        publisher.update(|_| {}).unwrap();
        let after = publisher.get_current().seq;
        assert_eq!(after, before + 1);
    }

    #[test]
    fn reader_handle_is_stable_across_a_concurrent_update() {
        // Thread R stashes a handle; thread W mutates; R must still see
        // the pre-update library after the update, and the new state
        // only after calling get_current again.
        let publisher = Arc::new(SnapshotPublisher::new());
        let barrier = Arc::new(Barrier::new(2));

        let stashed = publisher.get_current();
        assert_eq!(stashed.library.tracks.len(), 0);

        let writer = {
            let publisher = Arc::clone(&publisher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                publisher
                    .update(|snap| {
                        let mut lib = (*snap.library).clone();
                        for i in 0..10_000 {
                            let mut t = Track::invalid(format!("/m/{i}.mp3"), "unused");
                            t.is_valid = true;
                            t.format = AudioFormat::Mp3;
                            lib.tracks.push(t);
                        }
                        snap.library = Arc::new(lib);
                    })
                    .unwrap();
            })
        };

        barrier.wait();
        writer.join().unwrap();

        // The stashed handle never changes underneath the reader.
        assert_eq!(stashed.library.tracks.len(), 0);
        // A fresh read observes the new state.
        assert_eq!(publisher.get_current().library.tracks.len(), 10_000);
    }

    #[test]
    fn mutator_touching_only_player_avoids_touching_library_arc_identity() {
        let publisher = SnapshotPublisher::new();
        let before = publisher.get_current();
        let before_library_ptr = Arc::as_ptr(&before.library);

        publisher
            .update(|snap| snap.player.volume_percent = 80)
            .unwrap();

        let after = publisher.get_current();
        assert_eq!(after.player.volume_percent, 80);
        assert_eq!(Arc::as_ptr(&after.library), before_library_ptr);
    }
}
