//! [`DirectoryScanner`]: single-pass recursive directory walk (§4.3).
//!
//! Given a root directory, returns the audio-file list, per-file and
//! per-directory mtimes, and a truncated tree hash, all from a single
//! `walkdir::WalkDir` pass. `walkdir` already uses the platform's
//! fastest directory-read primitive under the hood, matching the
//! spec's "batched directory-entry syscall" requirement without hand
//! -rolling one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a"];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The result of one scan pass over a root directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub audio_files: Vec<PathBuf>,
    pub file_mtimes: HashMap<PathBuf, i64>,
    pub dir_mtimes: HashMap<PathBuf, i64>,
    /// 64-bit truncated SHA-256 of the sorted, `\n`-joined audio file
    /// paths. Used as the tier-0 tree hash.
    pub tree_hash: u64,
}

/// Compute the tree hash for a set of audio file paths: sort
/// lexicographically, join with `\n`, SHA-256, truncate to the first
/// 8 bytes (big-endian) as a `u64`.
pub fn tree_hash(paths: &[PathBuf]) -> u64 {
    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for path in sorted {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Recursively scan `root` in a single pass, returning the audio file
/// list, per-file and per-directory mtimes, and the tree hash.
///
/// Non-goals (per §4.3): symlink-cycle detection (the root is assumed
/// sane) and defending against pathological network-filesystem
/// latency.
pub fn scan(root: &Path) -> ScanResult {
    let mut audio_files = Vec::new();
    let mut file_mtimes = HashMap::new();
    let mut dir_mtimes = HashMap::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };

        if metadata.is_dir() {
            dir_mtimes.insert(entry.path().to_path_buf(), mtime_secs(&metadata));
        } else if metadata.is_file() && is_audio_file(entry.path()) {
            let path = entry.path().to_path_buf();
            file_mtimes.insert(path.clone(), mtime_secs(&metadata));
            audio_files.push(path);
        }
    }

    let hash = tree_hash(&audio_files);

    ScanResult {
        audio_files,
        file_mtimes,
        dir_mtimes,
        tree_hash: hash,
    }
}
