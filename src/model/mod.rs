//! Core data models for the engine.
//!
//! Defines the immutable value records that make up a [`Snapshot`]:
//! [`Track`], [`LibraryState`], [`PlayerState`], [`QueueState`], and
//! [`Alert`]. These are plain value types — no database mapping, no
//! interior mutability. Shared sub-state (`LibraryState`, `QueueState`)
//! is wrapped in `Arc` by the snapshot that holds it so that updating
//! one field never requires copying the whole structure (see
//! `snapshot::SnapshotPublisher`).

mod alert;
mod library;
mod player;
mod queue;
mod snapshot;
mod track;

pub use alert::{Alert, AlertLevel};
pub use library::LibraryState;
pub use player::{PlaybackState, PlayerState, RepeatMode};
pub use queue::QueueState;
pub use snapshot::Snapshot;
pub use track::{AudioFormat, Track};
