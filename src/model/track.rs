//! The [`Track`] record: one parsed audio file.

use std::path::PathBuf;

/// Audio container/codec tag, as determined by the metadata parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Wav,
    M4a,
    #[default]
    Unknown,
}

impl AudioFormat {
    /// Classify by file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "ogg" => Self::Ogg,
            "wav" => Self::Wav,
            "m4a" => Self::M4a,
            _ => Self::Unknown,
        }
    }
}

/// A single parsed audio file, identified by its absolute filesystem
/// path.
///
/// Invariants: `path` is canonical and stable; `duration_ms >= 0`;
/// `sample_rate > 0` whenever `is_valid`; `artwork_hash` is either empty
/// or a 64-character lowercase hex SHA-256 digest that resolves in the
/// `ArtworkCache`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,

    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub date: String,
    pub track_number: i32,

    pub duration_ms: i32,
    pub format: AudioFormat,
    pub sample_rate: i32,
    pub channels: i32,
    pub bit_depth: i32,
    pub bitrate: i32,

    /// SHA-256 hex of extracted artwork bytes, or empty if none.
    pub artwork_hash: String,

    pub file_mtime: i64,
    pub file_inode: u64,

    pub is_valid: bool,
    pub error_message: Option<String>,
}

impl Track {
    /// Build a placeholder `Track` for a file that failed to parse.
    /// `is_valid` is false and the scan keeps going past it (§7
    /// `TrackParseError`: listed in the library, refused at playback).
    pub fn invalid(path: impl Into<PathBuf>, error_message: impl Into<String>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or_default();
        Self {
            path,
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            genre: String::new(),
            date: String::new(),
            track_number: 0,
            duration_ms: 0,
            format,
            sample_rate: 0,
            channels: 0,
            bit_depth: 0,
            bitrate: 0,
            artwork_hash: String::new(),
            file_mtime: 0,
            file_inode: 0,
            is_valid: false,
            error_message: Some(error_message.into()),
        }
    }

    /// Whether `artwork_hash` is a well-formed 64-character lowercase
    /// hex digest (or empty, meaning "no artwork").
    pub fn has_well_formed_artwork_hash(&self) -> bool {
        self.artwork_hash.is_empty()
            || (self.artwork_hash.len() == 64
                && self
                    .artwork_hash
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()))
    }

    /// The sort key used to produce the canonical UI order:
    /// ascending `(artist, date, track_number)`.
    pub fn sort_key(&self) -> (&str, &str, i32) {
        (&self.artist, &self.date, self.track_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_track_is_marked_invalid_with_message() {
        let t = Track::invalid("/m/broken.mp3", "unsupported codec");
        assert!(!t.is_valid);
        assert_eq!(t.error_message.as_deref(), Some("unsupported codec"));
        assert_eq!(t.format, AudioFormat::Mp3);
    }

    #[test]
    fn artwork_hash_validation() {
        let mut t = Track::invalid("/m/a.mp3", "x");
        assert!(t.has_well_formed_artwork_hash());
        t.artwork_hash = "a".repeat(64);
        assert!(t.has_well_formed_artwork_hash());
        t.artwork_hash = "A".repeat(64);
        assert!(!t.has_well_formed_artwork_hash());
        t.artwork_hash = "short".to_string();
        assert!(!t.has_well_formed_artwork_hash());
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(AudioFormat::from_extension("FLAC"), AudioFormat::Flac);
        assert_eq!(AudioFormat::from_extension("M4A"), AudioFormat::M4a);
        assert_eq!(AudioFormat::from_extension("xyz"), AudioFormat::Unknown);
    }
}
