//! [`ArtworkCache`]: process-wide content-addressed artwork store
//! (§4.4).
//!
//! Generalizes the teacher's `cover::CoverCache` (a disk cache keyed by
//! MusicBrainz release ID) into an in-memory, reference-counted store
//! keyed by the SHA-256 of the raw bytes, with a persisted binary
//! format and `dir`/`track` side indexes for O(1) lookup from a scan.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// One stored artwork entry, keyed by the hex SHA-256 of `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtworkEntry {
    pub bytes: Vec<u8>,
    /// `"image/jpeg"` or `"image/png"`.
    pub mime_type: String,
    pub source_dir: PathBuf,
    pub ref_count: u32,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, RawArtworkEntry>,
    dir_to_hash: HashMap<PathBuf, String>,
    track_to_hash: HashMap<PathBuf, String>,
    verified_tracks: HashSet<PathBuf>,
    dirty: bool,
}

/// Process-wide, thread-safe, content-addressed artwork store.
///
/// Invariants: every present entry has `ref_count >= 1`; stored bytes
/// always decode as a supported image (JPEG or PNG), enforced at
/// `store`; every `dir_to_hash` value resolves in the entry map.
pub struct ArtworkCache {
    inner: Mutex<Inner>,
}

const MAGIC: u64 = 0x4F55524F41525457; // "OUROARTW"
const VERSION: u32 = 1;

impl ArtworkCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Validate `bytes` decode as JPEG or PNG, hash them, and either
    /// create a new entry (`ref_count = 1`) or bump the ref count of an
    /// existing one. Records `source_dir -> hash` unless a mapping is
    /// already present. Returns the hex hash.
    pub fn store(&self, bytes: Vec<u8>, mime_type: String, source_dir: PathBuf) -> Result<String> {
        image::load_from_memory(&bytes)
            .map_err(|_| Error::artwork_decode_failed(source_dir.display().to_string()))?;

        let hash = hex_sha256(&bytes);

        let mut inner = self.inner.lock();
        inner
            .entries
            .entry(hash.clone())
            .and_modify(|e| e.ref_count += 1)
            .or_insert_with(|| RawArtworkEntry {
                bytes,
                mime_type,
                source_dir: source_dir.clone(),
                ref_count: 1,
            });
        inner
            .dir_to_hash
            .entry(source_dir)
            .or_insert_with(|| hash.clone());
        inner.dirty = true;

        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> Option<RawArtworkEntry> {
        self.inner.lock().entries.get(hash).cloned()
    }

    pub fn get_hash_for_dir(&self, dir: &Path) -> Option<String> {
        self.inner.lock().dir_to_hash.get(dir).cloned()
    }

    pub fn get_hash_for_track(&self, path: &Path) -> Option<String> {
        self.inner.lock().track_to_hash.get(path).cloned()
    }

    pub fn set_hash_for_track(&self, path: PathBuf, hash: String) {
        let mut inner = self.inner.lock();
        inner.track_to_hash.insert(path, hash);
        inner.dirty = true;
    }

    /// Increment an entry's reference count. No-op if the hash is
    /// absent.
    pub fn reference(&self, hash: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(hash) {
            entry.ref_count += 1;
            inner.dirty = true;
        }
    }

    /// Decrement an entry's reference count; evict it (and clean up the
    /// dir index if it still points at the evicted hash) once the
    /// count reaches zero.
    pub fn unreference(&self, hash: &str) {
        let mut inner = self.inner.lock();
        let should_evict = match inner.entries.get_mut(hash) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count == 0
            }
            None => false,
        };
        if should_evict {
            inner.entries.remove(hash);
            inner.dir_to_hash.retain(|_, h| h != hash);
            inner.dirty = true;
        }
    }

    pub fn mark_verified(&self, path: PathBuf, hash: Option<String>) {
        let mut inner = self.inner.lock();
        inner.verified_tracks.insert(path.clone());
        if let Some(hash) = hash {
            inner.track_to_hash.insert(path, hash);
        }
        inner.dirty = true;
    }

    pub fn is_verified(&self, path: &Path) -> bool {
        self.inner.lock().verified_tracks.contains(path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().entries.values().map(|e| e.bytes.len()).sum()
    }

    /// Persist the full cache to `path`. A no-op when nothing has
    /// changed since the last successful save.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut buf = Vec::new();
        buf.write_all(&MAGIC.to_le_bytes())?;
        buf.write_all(&VERSION.to_le_bytes())?;

        buf.write_all(&(inner.entries.len() as u32).to_le_bytes())?;
        for (hash, entry) in &inner.entries {
            write_string(&mut buf, hash)?;
            write_string(&mut buf, &entry.mime_type)?;
            write_string(&mut buf, &entry.source_dir.to_string_lossy())?;
            buf.write_all(&(entry.bytes.len() as u64).to_le_bytes())?;
            buf.write_all(&entry.bytes)?;
            buf.write_all(&entry.ref_count.to_le_bytes())?;
        }

        buf.write_all(&(inner.verified_tracks.len() as u32).to_le_bytes())?;
        for path in &inner.verified_tracks {
            write_string(&mut buf, &path.to_string_lossy())?;
        }

        buf.write_all(&(inner.track_to_hash.len() as u32).to_le_bytes())?;
        for (path, hash) in &inner.track_to_hash {
            write_string(&mut buf, &path.to_string_lossy())?;
            write_string(&mut buf, hash)?;
        }

        buf.write_all(&(inner.dir_to_hash.len() as u32).to_le_bytes())?;
        for (dir, hash) in &inner.dir_to_hash {
            write_string(&mut buf, &dir.to_string_lossy())?;
            write_string(&mut buf, hash)?;
        }

        let temp_path = path.with_extension("cache.tmp");
        std::fs::write(&temp_path, &buf)?;
        std::fs::rename(&temp_path, path)?;

        inner.dirty = false;
        Ok(())
    }

    /// Load a cache previously written by `save`, replacing the
    /// current in-memory state. Any I/O or format failure is treated as
    /// [`Error::CacheCorruption`] and leaves the in-memory state
    /// untouched.
    pub fn load(&self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let mut cursor = std::io::Cursor::new(bytes);

        let magic = read_u64(&mut cursor, path)?;
        if magic != MAGIC {
            return Err(Error::cache_corruption(path, "bad magic"));
        }
        let version = read_u32(&mut cursor, path)?;
        if version != VERSION {
            return Err(Error::cache_corruption(path, format!("unsupported version {version}")));
        }

        let parse = || -> std::io::Result<Inner> {
            let mut entries = HashMap::new();
            let entry_count = read_u32_raw(&mut cursor)?;
            for _ in 0..entry_count {
                let hash = read_string(&mut cursor)?;
                let mime_type = read_string(&mut cursor)?;
                let source_dir = PathBuf::from(read_string(&mut cursor)?);
                let len = read_u64_raw(&mut cursor)? as usize;
                let mut bytes = vec![0u8; len];
                cursor.read_exact(&mut bytes)?;
                let ref_count = read_u32_raw(&mut cursor)?;
                entries.insert(
                    hash,
                    RawArtworkEntry {
                        bytes,
                        mime_type,
                        source_dir,
                        ref_count,
                    },
                );
            }

            let mut verified_tracks = HashSet::new();
            let verified_count = read_u32_raw(&mut cursor)?;
            for _ in 0..verified_count {
                verified_tracks.insert(PathBuf::from(read_string(&mut cursor)?));
            }

            let mut track_to_hash = HashMap::new();
            let track_count = read_u32_raw(&mut cursor)?;
            for _ in 0..track_count {
                let path = PathBuf::from(read_string(&mut cursor)?);
                let hash = read_string(&mut cursor)?;
                track_to_hash.insert(path, hash);
            }

            let mut dir_to_hash = HashMap::new();
            let dir_count = read_u32_raw(&mut cursor)?;
            for _ in 0..dir_count {
                let dir = PathBuf::from(read_string(&mut cursor)?);
                let hash = read_string(&mut cursor)?;
                dir_to_hash.insert(dir, hash);
            }

            Ok(Inner {
                entries,
                dir_to_hash,
                track_to_hash,
                verified_tracks,
                dirty: false,
            })
        };

        let loaded = parse().map_err(|e| Error::cache_corruption(path, e.to_string()))?;
        *self.inner.lock() = loaded;
        Ok(())
    }
}

impl Default for ArtworkCache {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)
}

fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = read_u32_raw(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn read_u32_raw<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_raw<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R, path: &Path) -> Result<u64> {
    read_u64_raw(r).map_err(|_| Error::cache_corruption(path, "truncated header"))
}

fn read_u32<R: Read>(r: &mut R, path: &Path) -> Result<u32> {
    read_u32_raw(r).map_err(|_| Error::cache_corruption(path, "truncated header"))
}
