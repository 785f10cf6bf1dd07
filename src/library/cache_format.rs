//! On-disk format for `library.bin` (§4.2).
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic: u32 = b"OURO"     (read as LE u32, i.e. bytes "O","U","R","O")
//! version: u32
//! tree_hash: u64           (version >= 3 only)
//! dir_count: u32           (version >= 3 only)
//! dir_count * (path, mtime: i64)
//! track_count: u64
//! track_count * TrackRecord
//! ```
//!
//! Versions 2 and 3 are the only readable versions. Version 2 predates
//! the tier-0/tier-1 optimization fields (tree hash, directory mtimes)
//! and is read as "tracks only, tiers 0/1 unavailable — fall straight
//! to tier 2". Anything else (including unknown future versions) is
//! [`Error::CacheCorruption`] and triggers a full rescan, per §4.2's
//! failure semantics and the "unknown future versions" rule.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{AudioFormat, Track};

pub const MAGIC: u32 = u32::from_le_bytes(*b"OURO");
pub const CURRENT_VERSION: u32 = 3;
const MIN_READABLE_VERSION: u32 = 2;
const MAX_READABLE_VERSION: u32 = 3;

/// Everything persisted in `library.bin`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryCacheData {
    pub tree_hash: u64,
    pub dir_mtimes: HashMap<PathBuf, i64>,
    pub tracks: Vec<Track>,
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)
}

fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_path<W: Write>(w: &mut W, p: &Path) -> io::Result<()> {
    write_string(w, &p.to_string_lossy())
}

fn read_path<R: Read>(r: &mut R) -> io::Result<PathBuf> {
    Ok(PathBuf::from(read_string(r)?))
}

fn format_tag(format: AudioFormat) -> u32 {
    match format {
        AudioFormat::Mp3 => 0,
        AudioFormat::Flac => 1,
        AudioFormat::Ogg => 2,
        AudioFormat::Wav => 3,
        AudioFormat::M4a => 4,
        AudioFormat::Unknown => 5,
    }
}

fn format_from_tag(tag: u32) -> AudioFormat {
    match tag {
        0 => AudioFormat::Mp3,
        1 => AudioFormat::Flac,
        2 => AudioFormat::Ogg,
        3 => AudioFormat::Wav,
        4 => AudioFormat::M4a,
        _ => AudioFormat::Unknown,
    }
}

fn write_track<W: Write>(w: &mut W, track: &Track) -> io::Result<()> {
    write_path(w, &track.path)?;
    write_string(w, &track.title)?;
    write_string(w, &track.artist)?;
    write_string(w, &track.album)?;
    write_string(w, &track.genre)?;
    write_string(w, &track.date)?;
    w.write_all(&track.track_number.to_le_bytes())?;
    w.write_all(&track.duration_ms.to_le_bytes())?;
    w.write_all(&format_tag(track.format).to_le_bytes())?;
    w.write_all(&track.sample_rate.to_le_bytes())?;
    w.write_all(&track.channels.to_le_bytes())?;
    w.write_all(&track.bit_depth.to_le_bytes())?;
    w.write_all(&track.bitrate.to_le_bytes())?;
    write_string(w, &track.artwork_hash)?;
    w.write_all(&track.file_mtime.to_le_bytes())?;
    w.write_all(&track.file_inode.to_le_bytes())?;
    w.write_all(&[track.is_valid as u8])?;
    Ok(())
}

fn read_track<R: Read>(r: &mut R) -> io::Result<Track> {
    let path = read_path(r)?;
    let title = read_string(r)?;
    let artist = read_string(r)?;
    let album = read_string(r)?;
    let genre = read_string(r)?;
    let date = read_string(r)?;

    let mut i32_buf = [0u8; 4];
    r.read_exact(&mut i32_buf)?;
    let track_number = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let duration_ms = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let format = format_from_tag(u32::from_le_bytes(i32_buf));
    r.read_exact(&mut i32_buf)?;
    let sample_rate = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let channels = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let bit_depth = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let bitrate = i32::from_le_bytes(i32_buf);

    let artwork_hash = read_string(r)?;

    let mut i64_buf = [0u8; 8];
    r.read_exact(&mut i64_buf)?;
    let file_mtime = i64::from_le_bytes(i64_buf);
    let mut u64_buf = [0u8; 8];
    r.read_exact(&mut u64_buf)?;
    let file_inode = u64::from_le_bytes(u64_buf);

    let mut valid_buf = [0u8; 1];
    r.read_exact(&mut valid_buf)?;
    let is_valid = valid_buf[0] != 0;

    Ok(Track {
        path,
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
        is_valid,
        error_message: None,
    })
}

/// Write the cache to `path`.
pub fn write_cache(path: &Path, data: &LibraryCacheData) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut buf = Vec::new();
    buf.write_all(&MAGIC.to_le_bytes())?;
    buf.write_all(&CURRENT_VERSION.to_le_bytes())?;
    buf.write_all(&data.tree_hash.to_le_bytes())?;
    buf.write_all(&(data.dir_mtimes.len() as u32).to_le_bytes())?;
    for (dir, mtime) in &data.dir_mtimes {
        write_path(&mut buf, dir)?;
        buf.write_all(&mtime.to_le_bytes())?;
    }
    buf.write_all(&(data.tracks.len() as u64).to_le_bytes())?;
    for track in &data.tracks {
        write_track(&mut buf, track)?;
    }

    let temp_path = path.with_extension("bin.tmp");
    std::fs::write(&temp_path, &buf)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read the cache from `path`. A missing file is not an error at this
/// layer — callers should check `path.exists()` first and treat
/// absence as "no cache" (§4.2).
pub fn read_cache(path: &Path) -> Result<LibraryCacheData> {
    let bytes = std::fs::read(path)?;
    let mut cursor = io::Cursor::new(bytes);

    let mut u32_buf = [0u8; 4];
    cursor
        .read_exact(&mut u32_buf)
        .map_err(|_| Error::cache_corruption(path, "truncated header"))?;
    let magic = u32::from_le_bytes(u32_buf);
    if magic != MAGIC {
        return Err(Error::cache_corruption(path, "bad magic"));
    }

    cursor
        .read_exact(&mut u32_buf)
        .map_err(|_| Error::cache_corruption(path, "truncated version"))?;
    let version = u32::from_le_bytes(u32_buf);
    if !(MIN_READABLE_VERSION..=MAX_READABLE_VERSION).contains(&version) {
        return Err(Error::cache_corruption(
            path,
            format!("unsupported version {version}"),
        ));
    }

    let read_body = || -> io::Result<LibraryCacheData> {
        let (tree_hash, dir_mtimes) = if version >= 3 {
            let mut u64_buf = [0u8; 8];
            cursor.read_exact(&mut u64_buf)?;
            let tree_hash = u64::from_le_bytes(u64_buf);

            let mut count_buf = [0u8; 4];
            cursor.read_exact(&mut count_buf)?;
            let dir_count = u32::from_le_bytes(count_buf) as usize;

            let mut dir_mtimes = HashMap::with_capacity(dir_count);
            for _ in 0..dir_count {
                let dir = read_path(&mut cursor)?;
                let mut mtime_buf = [0u8; 8];
                cursor.read_exact(&mut mtime_buf)?;
                dir_mtimes.insert(dir, i64::from_le_bytes(mtime_buf));
            }
            (tree_hash, dir_mtimes)
        } else {
            (0, HashMap::new())
        };

        let mut count_buf = [0u8; 8];
        cursor.read_exact(&mut count_buf)?;
        let track_count = u64::from_le_bytes(count_buf) as usize;

        let mut tracks = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            tracks.push(read_track(&mut cursor)?);
        }

        Ok(LibraryCacheData {
            tree_hash,
            dir_mtimes,
            tracks,
        })
    };

    read_body().map_err(|e| Error::cache_corruption(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_track(i: usize) -> Track {
        Track {
            path: PathBuf::from(format!("/m/track{i}.mp3")),
            title: format!("Title {i}"),
            artist: "Artist".into(),
            album: "Album".into(),
            genre: "Genre".into(),
            date: "2020".into(),
            track_number: i as i32,
            duration_ms: 180_000,
            format: AudioFormat::Mp3,
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            bitrate: 320_000,
            artwork_hash: "a".repeat(64),
            file_mtime: 1_700_000_000,
            file_inode: 42,
            is_valid: true,
            error_message: None,
        }
    }

    #[test]
    fn roundtrip_empty_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let data = LibraryCacheData::default();
        write_cache(&path, &data).unwrap();
        let read_back = read_cache(&path).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn roundtrip_one_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let mut data = LibraryCacheData::default();
        data.tracks.push(sample_track(0));
        data.tree_hash = 0xdead_beef;
        data.dir_mtimes.insert(PathBuf::from("/m"), 123);

        write_cache(&path, &data).unwrap();
        let read_back = read_cache(&path).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn roundtrip_many_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let mut data = LibraryCacheData::default();
        for i in 0..200 {
            data.tracks.push(sample_track(i));
        }
        for i in 0..10 {
            data.dir_mtimes
                .insert(PathBuf::from(format!("/m/dir{i}")), i as i64);
        }
        write_cache(&path, &data).unwrap();
        let read_back = read_cache(&path).unwrap();
        assert_eq!(read_back.tracks.len(), 200);
        assert_eq!(read_back, data);
    }

    #[test]
    fn bad_magic_is_cache_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        std::fs::write(&path, b"NOTOUROB").unwrap();
        let err = read_cache(&path).unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { .. }));
    }

    #[test]
    fn unsupported_version_is_cache_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, &buf).unwrap();
        let err = read_cache(&path).unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { .. }));
    }

    #[test]
    fn truncated_file_is_cache_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let mut data = LibraryCacheData::default();
        data.tracks.push(sample_track(0));
        write_cache(&path, &data).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 10);
        std::fs::write(&path, &bytes).unwrap();

        let err = read_cache(&path).unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { .. }));
    }

    #[test]
    fn version_2_reads_tracks_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.bin");
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());
        write_track(&mut buf, &sample_track(0)).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let data = read_cache(&path).unwrap();
        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.tree_hash, 0);
        assert!(data.dir_mtimes.is_empty());
    }
}
