//! Tag metadata parsing: the narrow "path in, `Track` or failure
//! reason out" contract (§1, §4.9).
//!
//! Uses `lofty` for format-independent tag access across MP3, FLAC,
//! OGG, WAV, and M4A, mirroring the teacher's `metadata::read`. Unlike
//! the teacher (which reads into a small `TrackMetadata` DTO for a
//! SQLite row), this produces a full [`Track`] record directly and
//! never returns `Err` — a parse failure becomes `Track::invalid`, per
//! §7's `TrackParseError` ("resulting Track is marked `is_valid=false`
//! ... listed in the library but refused at playback").

use std::path::Path;
use std::time::UNIX_EPOCH;

use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

use crate::artwork::ArtworkCache;
use crate::model::{AudioFormat, Track};

fn file_mtime_and_inode(path: &Path) -> (i64, u64) {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return (0, 0),
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let inode = file_inode(&metadata);
    (mtime, inode)
}

#[cfg(unix)]
fn file_inode(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_inode(_metadata: &std::fs::Metadata) -> u64 {
    0
}

/// Parse tag metadata and embedded artwork for one file.
///
/// Always returns a `Track`. On any failure (unreadable file,
/// unsupported container, corrupt tags) the track is marked
/// `is_valid = false` with `error_message` set, and scanning continues
/// past it (§4.2's "a stat failure on an individual file skips that
/// file, not the scan").
///
/// If the parsed tags embed artwork, the raw bytes are hashed and
/// stored into `artwork_cache` as a parse side effect (§4.2 Tier 2),
/// and `track.artwork_hash` is set to the resulting hex digest.
pub fn parse_track(path: &Path, artwork_cache: &ArtworkCache) -> Track {
    let (file_mtime, file_inode) = file_mtime_and_inode(path);

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(AudioFormat::from_extension)
        .unwrap_or_default();

    let tagged_file = match Probe::open(path).and_then(|p| p.options(ParseOptions::new()).read())
    {
        Ok(f) => f,
        Err(e) => {
            let mut track = Track::invalid(path, e.to_string());
            track.file_mtime = file_mtime;
            track.file_inode = file_inode;
            return track;
        }
    };

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let title = tag
        .and_then(|t| t.title())
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback_title(path));
    let artist = tag
        .and_then(|t| t.artist())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let album = tag
        .and_then(|t| t.album())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let genre = tag
        .and_then(|t| t.genre())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let date = tag
        .and_then(|t| t.year())
        .map(|y| y.to_string())
        .unwrap_or_default();
    let track_number = tag.and_then(|t| t.track()).unwrap_or(0) as i32;

    let properties = tagged_file.properties();
    let duration_ms = properties.duration().as_millis() as i32;
    let sample_rate = properties.sample_rate().unwrap_or(0) as i32;
    let channels = properties.channels().unwrap_or(0) as i32;
    let bit_depth = properties.bit_depth().unwrap_or(0) as i32;
    let bitrate = properties.audio_bitrate().unwrap_or(0) as i32;

    let artwork_hash = tag
        .and_then(|t| t.pictures().first())
        .and_then(|pic| {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            artwork_cache
                .store(
                    pic.data().to_vec(),
                    pic.mime_type()
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| "image/jpeg".to_string()),
                    dir,
                )
                .ok()
        })
        .unwrap_or_default();

    Track {
        path: path.to_path_buf(),
        title,
        artist,
        album,
        genre,
        date,
        track_number,
        duration_ms,
        format,
        sample_rate,
        channels,
        bit_depth,
        bitrate,
        artwork_hash,
        file_mtime,
        file_inode,
        is_valid: sample_rate > 0,
        error_message: if sample_rate > 0 {
            None
        } else {
            Some("no usable audio properties".to_string())
        },
    }
}

fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_invalid_track_not_a_panic() {
        let cache = ArtworkCache::new();
        let track = parse_track(Path::new("/nonexistent/path/does/not/exist.mp3"), &cache);
        assert!(!track.is_valid);
        assert!(track.error_message.is_some());
    }

    #[test]
    fn fallback_title_uses_file_stem() {
        assert_eq!(fallback_title(Path::new("/m/My Song.mp3")), "My Song");
    }
}
