//! The snapshot substrate: a single logical "current world state" with
//! wait-free reads and serialized writes (§4.1).

mod publisher;

pub use publisher::SnapshotPublisher;
