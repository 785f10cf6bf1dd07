//! [`Library`]: the multi-tier cache orchestrator (§4.2).
//!
//! Owns the cumulative track table and drives the tiered validation
//! in order (tree hash, directory mtimes, per-file diff + parallel
//! reparse), first success wins. Persistence is delegated to
//! [`cache_format`].

pub mod cache_format;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rayon::prelude::*;

use crate::artwork::ArtworkCache;
use crate::error::Result;
use crate::model::Track;
use crate::{metadata, scanner};

use cache_format::LibraryCacheData;

/// Which tier satisfied the last [`Library::refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Tree hash unchanged and every cached file still exists: no
    /// parsing, no per-file stats beyond the walk.
    Tree,
    /// Tree hash changed but no directory's mtime moved: reused the
    /// cache as-is.
    DirectoryMtime,
    /// Full per-file diff and (possibly parallel) reparse.
    PerFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshOutcome {
    pub tier: Option<CacheTier>,
    pub reparsed_count: usize,
    pub pruned_count: usize,
}

/// Deduplicate a set of configured roots so that one directory being a
/// strict prefix of another results in a single scan of the outer
/// directory. Paths that fail to canonicalize (not yet mounted, say)
/// are kept as given rather than dropped.
pub fn dedup_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut canonical: Vec<PathBuf> = dirs
        .into_iter()
        .map(|d| d.canonicalize().unwrap_or(d))
        .collect();
    canonical.sort_by_key(|p| p.as_os_str().len());
    canonical.dedup();

    let mut result: Vec<PathBuf> = Vec::new();
    for dir in canonical {
        if !result.iter().any(|kept| dir.starts_with(kept)) {
            result.push(dir);
        }
    }
    result
}

/// Owns the cumulative track table for a set of configured music
/// directories and drives tiered cache validation.
pub struct Library {
    roots: Vec<PathBuf>,
    cache_path: PathBuf,
    tracks: HashMap<PathBuf, Track>,
    dir_mtimes: HashMap<PathBuf, i64>,
    tree_hash: u64,
}

impl Library {
    pub fn new(roots: Vec<PathBuf>, cache_path: PathBuf) -> Self {
        Self {
            roots: dedup_directories(roots),
            cache_path,
            tracks: HashMap::new(),
            dir_mtimes: HashMap::new(),
            tree_hash: 0,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Load `library.bin` if present. A missing or corrupt cache
    /// simply leaves the library empty, per §4.2's "treated as 'no
    /// cache' — full scan" failure semantics; the caller's next
    /// `refresh` does the rest.
    pub fn load_cache(&mut self) {
        match cache_format::read_cache(&self.cache_path) {
            Ok(data) => {
                self.tree_hash = data.tree_hash;
                self.dir_mtimes = data.dir_mtimes;
                self.tracks = data.tracks.into_iter().map(|t| (t.path.clone(), t)).collect();
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.cache_path.display(), "library cache unreadable, starting from an empty library");
            }
        }
    }

    /// Re-validate against the current filesystem state, updating the
    /// in-memory track table in place.
    pub fn refresh(&mut self, artwork_cache: &ArtworkCache) -> RefreshOutcome {
        let mut audio_files = Vec::new();
        let mut file_mtimes = HashMap::new();
        let mut dir_mtimes = HashMap::new();
        for root in &self.roots {
            let scan = scanner::scan(root);
            audio_files.extend(scan.audio_files);
            file_mtimes.extend(scan.file_mtimes);
            dir_mtimes.extend(scan.dir_mtimes);
        }

        let new_tree_hash = scanner::tree_hash(&audio_files);
        let have_prior_cache = !self.tracks.is_empty() || self.tree_hash != 0;

        // Tier 0: tree hash unchanged and every cached file present.
        if have_prior_cache
            && new_tree_hash == self.tree_hash
            && audio_files.iter().all(|p| self.tracks.contains_key(p))
        {
            return RefreshOutcome {
                tier: Some(CacheTier::Tree),
                reparsed_count: 0,
                pruned_count: 0,
            };
        }

        // Tier 1: re-walked directory mtimes, dirty-set empty.
        let current_dirs: HashSet<PathBuf> = dir_mtimes.keys().cloned().collect();
        let cached_dirs: HashSet<PathBuf> = self.dir_mtimes.keys().cloned().collect();
        let dirty = current_dirs.iter().any(|dir| match self.dir_mtimes.get(dir) {
            Some(cached_mtime) => dir_mtimes[dir] > *cached_mtime,
            None => true,
        }) || cached_dirs.iter().any(|dir| !current_dirs.contains(dir));

        if have_prior_cache && !dirty {
            self.tree_hash = new_tree_hash;
            self.dir_mtimes = dir_mtimes;
            return RefreshOutcome {
                tier: Some(CacheTier::DirectoryMtime),
                reparsed_count: 0,
                pruned_count: 0,
            };
        }

        // Tier 2: per-file diff, prune deletions under walked
        // directories, reparse the rest in parallel.
        let current_paths: HashSet<PathBuf> = audio_files.iter().cloned().collect();
        let before = self.tracks.len();
        self.tracks.retain(|path, _| {
            let walked = path
                .parent()
                .map(|parent| dir_mtimes.contains_key(parent))
                .unwrap_or(false);
            !walked || current_paths.contains(path)
        });
        let pruned_count = before - self.tracks.len();

        let to_reparse: Vec<PathBuf> = audio_files
            .iter()
            .filter(|path| match self.tracks.get(*path) {
                Some(track) => {
                    let fs_mtime = file_mtimes.get(*path).copied().unwrap_or(i64::MAX);
                    track.file_mtime < fs_mtime
                }
                None => true,
            })
            .cloned()
            .collect();

        let reparsed: Vec<Track> = to_reparse
            .par_iter()
            .map(|path| metadata::parse_track(path, artwork_cache))
            .collect();
        let reparsed_count = reparsed.len();
        for track in reparsed {
            self.tracks.insert(track.path.clone(), track);
        }

        self.tree_hash = new_tree_hash;
        self.dir_mtimes = dir_mtimes;

        RefreshOutcome {
            tier: Some(CacheTier::PerFile),
            reparsed_count,
            pruned_count,
        }
    }

    /// Persist the current in-memory state to `library.bin`.
    pub fn save(&self) -> Result<()> {
        cache_format::write_cache(
            &self.cache_path,
            &LibraryCacheData {
                tree_hash: self.tree_hash,
                dir_mtimes: self.dir_mtimes.clone(),
                tracks: self.tracks.values().cloned().collect(),
            },
        )
    }

    /// The cumulative, sorted track list, filtered to tracks whose
    /// directory lies under a currently-configured root (§4.2's
    /// "cumulative semantics").
    pub fn get_all_tracks(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .tracks
            .values()
            .filter(|t| self.roots.iter().any(|root| t.path.starts_with(root)))
            .cloned()
            .collect();
        tracks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tree_hash(&self) -> u64 {
        self.tree_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn dedup_drops_nested_subdirectories() {
        let root = tempdir().unwrap();
        let outer = root.path().join("music");
        let inner = outer.join("rock");
        fs::create_dir_all(&inner).unwrap();

        let result = dedup_directories(vec![inner.clone(), outer.clone()]);
        assert_eq!(result, vec![outer.canonicalize().unwrap()]);
    }

    #[test]
    fn dedup_keeps_unrelated_siblings() {
        let root = tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let result = dedup_directories(vec![a.clone(), b.clone()]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn refresh_reparses_then_reuses_via_tier0() {
        let root = tempdir().unwrap();
        let mut f = File::create(root.path().join("song.mp3")).unwrap();
        f.write_all(b"not really audio").unwrap();
        drop(f);

        let cache_path = root.path().join("library.bin");
        let artwork_cache = ArtworkCache::new();
        let mut library = Library::new(vec![root.path().to_path_buf()], cache_path);

        let first = library.refresh(&artwork_cache);
        assert_eq!(first.tier, Some(CacheTier::PerFile));
        assert_eq!(first.reparsed_count, 1);
        assert_eq!(library.track_count(), 1);

        let second = library.refresh(&artwork_cache);
        assert_eq!(second.tier, Some(CacheTier::Tree));
        assert_eq!(second.reparsed_count, 0);
    }

    #[test]
    fn get_all_tracks_filters_unmounted_directories() {
        let root = tempdir().unwrap();
        let cache_path = root.path().join("library.bin");
        let mut library = Library::new(vec![root.path().to_path_buf()], cache_path);

        let mut stray = Track::invalid("/completely/elsewhere/a.mp3", "x");
        stray.is_valid = true;
        library.tracks.insert(stray.path.clone(), stray);

        assert!(library.get_all_tracks().is_empty());
        assert_eq!(library.track_count(), 1);
    }

    #[test]
    fn save_load_roundtrips_through_cache_file() {
        let root = tempdir().unwrap();
        let mut f = File::create(root.path().join("song.mp3")).unwrap();
        f.write_all(b"not really audio").unwrap();
        drop(f);

        let cache_path = root.path().join("library.bin");
        let artwork_cache = ArtworkCache::new();
        let mut library = Library::new(vec![root.path().to_path_buf()], cache_path.clone());
        library.refresh(&artwork_cache);
        library.save().unwrap();

        let mut reloaded = Library::new(vec![root.path().to_path_buf()], cache_path);
        reloaded.load_cache();
        assert_eq!(reloaded.track_count(), 1);
        assert_eq!(reloaded.tree_hash(), library.tree_hash());
    }
}
