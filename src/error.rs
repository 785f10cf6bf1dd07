//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the engine. Library
//! modules return specific variants via `thiserror`; `main`/`cli` use
//! `anyhow` for convenient top-level propagation.
//!
//! # Design
//!
//! - [`Error`]: top-level engine error enum, one variant per taxonomy
//!   entry in the error-handling design.
//! - Errors in the audio and artwork pipelines never propagate to the
//!   renderer as `Error` values — they degrade to an `Alert` or a cache
//!   state transition instead. This enum exists for the paths that
//!   *do* need to bubble up: cache I/O, config I/O, snapshot poisoning.

use std::path::PathBuf;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file failed to parse; caller should fall back to defaults.
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// On-disk cache is corrupt (bad magic, unsupported version, or
    /// truncated) and must be treated as absent.
    #[error("Cache corrupted at {path}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    /// A track failed to parse. Carries enough context to populate
    /// `Track::error_message`; the scan continues past it.
    #[error("Failed to parse track {path}: {message}")]
    TrackParse { path: PathBuf, message: String },

    /// Bytes handed to `ArtworkCache::store` did not decode as a
    /// supported image.
    #[error("Artwork bytes for {context} did not decode as a supported image")]
    ArtworkDecodeFailed { context: String },

    /// A `Decoder` could not be opened for a track.
    #[error("Failed to open decoder for {path}: {message}")]
    DecoderOpenFailed { path: PathBuf, message: String },

    /// A `Decoder` failed mid-stream (corrupt packet, unsupported
    /// codec transition). Distinct from `DecoderOpenFailed`, which is
    /// raised before any frame has been produced.
    #[error("Decoder error: {0}")]
    DecodeStreamError(String),

    /// A PCM sink could not be initialized.
    #[error("Failed to initialize audio sink: {0}")]
    SinkInitFailed(String),

    /// A PCM write returned zero frames written.
    #[error("PCM write error: {0}")]
    PipelineWriteError(String),

    /// The snapshot publisher's write lock was poisoned by a panicking
    /// writer.
    #[error("snapshot publisher lock poisoned")]
    PoisonedWriter,

    /// Generic error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse(message.into())
    }

    pub fn cache_corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn track_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TrackParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn artwork_decode_failed(context: impl Into<String>) -> Self {
        Self::ArtworkDecodeFailed {
            context: context.into(),
        }
    }

    pub fn decoder_open_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DecoderOpenFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to `Result`s.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}
