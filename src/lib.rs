//! Library crate for the engineering core: the snapshot substrate,
//! multi-tier library cache, artwork cache and decode pipeline, and
//! the collectors that drive them. `main.rs` is a thin binary shell
//! around this crate; `tests/` exercises it as an external consumer
//! would.

pub mod artwork;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod library;
pub mod metadata;
pub mod model;
pub mod playback;
pub mod scanner;
pub mod snapshot;
pub mod terminal;
