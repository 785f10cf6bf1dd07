//! Content-addressed artwork storage and the on-demand decode pipeline
//! (§4.4, §4.5).

mod cache;
mod decode;
mod window;

pub use cache::{ArtworkCache, RawArtworkEntry};
pub use decode::{decode_and_fit, DecodedImage};
pub use window::{ArtworkRequest, ArtworkWindow, WindowCacheEntry, WindowEntryState};
