//! The on-demand decode pipeline: a priority-scheduled worker pool
//! backed by an LRU-bounded decode cache, keyed by
//! `(album_directory, width_cells, height_cells)` (§4.5, §4.6).
//!
//! Renders currently on screen are requested at priority below 1000
//! ("visible") and flip [`ArtworkWindow::take_has_updates`] so the
//! terminal loop knows to redraw; off-screen prefetch requests use
//! priority 1000 and above and never set that flag. A decode failure
//! is cached as [`WindowEntryState::Failed`] so a broken cover doesn't
//! get retried every frame.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::artwork::{decode_and_fit, ArtworkCache, DecodedImage};

/// Priority below this threshold marks a request as driven by what's
/// currently visible on screen, rather than speculative prefetch.
pub const VISIBLE_PRIORITY_THRESHOLD: i32 = 1000;

const COVER_FILE_STEMS: &[&str] = &["cover", "folder", "album", "front"];
const COVER_FILE_EXTS: &[&str] = &["jpg", "jpeg", "png"];

type Key = (PathBuf, u32, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEntryState {
    Absent,
    Queued,
    Decoding,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WindowCacheEntry {
    pub state: WindowEntryState,
    pub image: Option<Arc<DecodedImage>>,
    pub byte_size: usize,
    last_used: u64,
}

impl WindowCacheEntry {
    fn queued() -> Self {
        WindowCacheEntry {
            state: WindowEntryState::Queued,
            image: None,
            byte_size: 0,
            last_used: 0,
        }
    }
}

/// A single tile request, ordered by ascending priority (lower number
/// wins) then by submission order (earlier wins ties).
#[derive(Debug, Clone)]
pub struct ArtworkRequest {
    pub album_directory: PathBuf,
    pub width_cells: u32,
    pub height_cells: u32,
    pub priority: i32,
    sequence: u64,
}

impl PartialEq for ArtworkRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for ArtworkRequest {}

impl Ord for ArtworkRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the lowest priority value
        // (most urgent) and, on ties, the oldest sequence number, to
        // pop first. Invert both comparisons.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for ArtworkRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    cache: Mutex<HashMap<Key, WindowCacheEntry>>,
    queued_keys: Mutex<HashSet<Key>>,
    queue: Mutex<BinaryHeap<ArtworkRequest>>,
    not_empty: Condvar,
    sequence_counter: AtomicU64,
    lru_clock: AtomicU64,
    byte_budget: usize,
    bytes_used: AtomicUsize,
    has_updates: AtomicBool,
    shutdown: AtomicBool,
    artwork_cache: Arc<ArtworkCache>,
}

/// The in-memory LRU decode cache plus its worker pool.
pub struct ArtworkWindow {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ArtworkWindow {
    /// `byte_budget` bounds total decoded-tile bytes retained in the
    /// cache (§4.6's configurable memory budget, 3 GiB by default per
    /// `PerformanceConfig::artwork_memory_limit_mb`).
    pub fn new(artwork_cache: Arc<ArtworkCache>, byte_budget: usize, worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            cache: Mutex::new(HashMap::new()),
            queued_keys: Mutex::new(HashSet::new()),
            queue: Mutex::new(BinaryHeap::new()),
            not_empty: Condvar::new(),
            sequence_counter: AtomicU64::new(0),
            lru_clock: AtomicU64::new(0),
            byte_budget,
            bytes_used: AtomicUsize::new(0),
            has_updates: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            artwork_cache,
        });

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let shared = Arc::clone(&shared);
            workers.push(std::thread::spawn(move || worker_loop(shared)));
        }

        ArtworkWindow {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Request a tile, enqueueing a decode if it isn't already
    /// present, queued, or in flight. Returns the entry's current
    /// state immediately (non-blocking).
    pub fn request(
        &self,
        album_directory: &Path,
        width_cells: u32,
        height_cells: u32,
        priority: i32,
    ) -> WindowEntryState {
        let key = (album_directory.to_path_buf(), width_cells, height_cells);

        {
            let mut cache = self.shared.cache.lock().unwrap();
            if let Some(entry) = cache.get_mut(&key) {
                if entry.state == WindowEntryState::Ready {
                    entry.last_used = self.shared.lru_clock.fetch_add(1, AtomicOrdering::Relaxed);
                }
                return entry.state;
            }
        }

        let mut queued = self.shared.queued_keys.lock().unwrap();
        if queued.contains(&key) {
            return WindowEntryState::Queued;
        }
        queued.insert(key.clone());
        drop(queued);

        self.shared
            .cache
            .lock()
            .unwrap()
            .insert(key.clone(), WindowCacheEntry::queued());

        let sequence = self
            .shared
            .sequence_counter
            .fetch_add(1, AtomicOrdering::Relaxed);
        let request = ArtworkRequest {
            album_directory: key.0,
            width_cells,
            height_cells,
            priority,
            sequence,
        };
        self.shared.queue.lock().unwrap().push(request);
        self.shared.not_empty.notify_one();

        WindowEntryState::Queued
    }

    /// The decoded tile, if ready.
    pub fn get(
        &self,
        album_directory: &Path,
        width_cells: u32,
        height_cells: u32,
    ) -> Option<Arc<DecodedImage>> {
        let key = (album_directory.to_path_buf(), width_cells, height_cells);
        let mut cache = self.shared.cache.lock().unwrap();
        let entry = cache.get_mut(&key)?;
        if entry.state == WindowEntryState::Ready {
            entry.last_used = self.shared.lru_clock.fetch_add(1, AtomicOrdering::Relaxed);
        }
        entry.image.clone()
    }

    pub fn state(
        &self,
        album_directory: &Path,
        width_cells: u32,
        height_cells: u32,
    ) -> WindowEntryState {
        let key = (album_directory.to_path_buf(), width_cells, height_cells);
        self.shared
            .cache
            .lock()
            .unwrap()
            .get(&key)
            .map(|e| e.state)
            .unwrap_or(WindowEntryState::Absent)
    }

    /// Consumes the "a visible tile finished decoding" flag. The
    /// terminal loop polls this once per frame to decide whether a
    /// redraw is warranted.
    pub fn take_has_updates(&self) -> bool {
        self.shared.has_updates.swap(false, AtomicOrdering::AcqRel)
    }

    pub fn bytes_used(&self) -> usize {
        self.shared.bytes_used.load(AtomicOrdering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
        self.shared.not_empty.notify_all();
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ArtworkWindow {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let request = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.shutdown.load(AtomicOrdering::SeqCst) {
                    return;
                }
                if let Some(request) = queue.pop() {
                    break request;
                }
                queue = shared.not_empty.wait(queue).unwrap();
            }
        };

        let key = (
            request.album_directory.clone(),
            request.width_cells,
            request.height_cells,
        );
        shared.queued_keys.lock().unwrap().remove(&key);
        if let Some(entry) = shared.cache.lock().unwrap().get_mut(&key) {
            entry.state = WindowEntryState::Decoding;
        }

        let outcome = locate_artwork_bytes(&request.album_directory, &shared.artwork_cache)
            .and_then(|(bytes, _mime)| {
                decode_and_fit(&bytes, request.width_cells, request.height_cells).ok()
            });

        let mut cache = shared.cache.lock().unwrap();
        match outcome {
            Some(decoded) => {
                let byte_size = decoded.pixels.len();
                let last_used = shared.lru_clock.fetch_add(1, AtomicOrdering::Relaxed);
                cache.insert(
                    key,
                    WindowCacheEntry {
                        state: WindowEntryState::Ready,
                        image: Some(Arc::new(decoded)),
                        byte_size,
                        last_used,
                    },
                );
                shared.bytes_used.fetch_add(byte_size, AtomicOrdering::Relaxed);
                if request.priority < VISIBLE_PRIORITY_THRESHOLD {
                    shared.has_updates.store(true, AtomicOrdering::Release);
                }
            }
            None => {
                cache.insert(
                    key,
                    WindowCacheEntry {
                        state: WindowEntryState::Failed,
                        image: None,
                        byte_size: 0,
                        last_used: shared.lru_clock.fetch_add(1, AtomicOrdering::Relaxed),
                    },
                );
            }
        }

        evict_to_budget(&shared, &mut cache);
    }
}

fn evict_to_budget(shared: &Shared, cache: &mut HashMap<Key, WindowCacheEntry>) {
    while shared.bytes_used.load(AtomicOrdering::Relaxed) > shared.byte_budget {
        let victim = cache
            .iter()
            .filter(|(_, e)| e.state == WindowEntryState::Ready)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());

        match victim {
            Some(key) => {
                if let Some(entry) = cache.remove(&key) {
                    shared
                        .bytes_used
                        .fetch_sub(entry.byte_size, AtomicOrdering::Relaxed);
                }
            }
            None => break,
        }
    }
}

/// Find artwork bytes for an album directory: the content-addressed
/// cache first (populated as a side effect of tag parsing), then a
/// direct filesystem search for a conventional cover file.
fn locate_artwork_bytes(dir: &Path, artwork_cache: &ArtworkCache) -> Option<(Vec<u8>, String)> {
    if let Some(hash) = artwork_cache.get_hash_for_dir(dir) {
        if let Some(entry) = artwork_cache.get(&hash) {
            return Some((entry.bytes.clone(), entry.mime_type.clone()));
        }
    }

    let read_dir = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = read_dir.filter_map(|e| e.ok().map(|e| e.path())).collect();
    candidates.sort();

    for stem in COVER_FILE_STEMS {
        for ext in COVER_FILE_EXTS {
            if let Some(found) = candidates.iter().find(|p| {
                let file_stem = p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let extension = p
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                file_stem == *stem && extension == *ext
            }) {
                let bytes = std::fs::read(found).ok()?;
                let mime = if *ext == "png" { "image/png" } else { "image/jpeg" };
                if let Ok(hash) = artwork_cache.store(bytes.clone(), mime.to_string(), dir.to_path_buf()) {
                    if let Some(entry) = artwork_cache.get(&hash) {
                        return Some((entry.bytes, entry.mime_type));
                    }
                }
                return Some((bytes, mime.to_string()));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_png(path: &Path, w: u32, h: u32) {
        use image::{ImageBuffer, Rgba};
        let img: image::RgbaImage = ImageBuffer::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn request_then_get_eventually_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("cover.png"), 8, 8);

        let artwork_cache = Arc::new(ArtworkCache::new());
        let window = ArtworkWindow::new(artwork_cache, 64 * 1024 * 1024, 1);

        window.request(dir.path(), 4, 4, 0);

        let mut state = WindowEntryState::Absent;
        for _ in 0..200 {
            state = window.state(dir.path(), 4, 4);
            if state == WindowEntryState::Ready || state == WindowEntryState::Failed {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(state, WindowEntryState::Ready);
        assert!(window.get(dir.path(), 4, 4).is_some());
        assert!(window.take_has_updates());
        assert!(!window.take_has_updates());
    }

    #[test]
    fn missing_cover_yields_failed_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let artwork_cache = Arc::new(ArtworkCache::new());
        let window = ArtworkWindow::new(artwork_cache, 64 * 1024 * 1024, 1);

        window.request(dir.path(), 4, 4, 0);

        let mut state = WindowEntryState::Absent;
        for _ in 0..200 {
            state = window.state(dir.path(), 4, 4);
            if state == WindowEntryState::Ready || state == WindowEntryState::Failed {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(state, WindowEntryState::Failed);
    }

    #[test]
    fn request_priority_ordering_sorts_visible_before_prefetch() {
        let visible = ArtworkRequest {
            album_directory: PathBuf::from("/a"),
            width_cells: 1,
            height_cells: 1,
            priority: 0,
            sequence: 5,
        };
        let prefetch = ArtworkRequest {
            album_directory: PathBuf::from("/b"),
            width_cells: 1,
            height_cells: 1,
            priority: 2000,
            sequence: 1,
        };
        let mut heap = BinaryHeap::new();
        heap.push(prefetch);
        heap.push(visible.clone());
        assert_eq!(heap.pop().unwrap().priority, 0);
    }

    #[test]
    fn duplicate_cover_filenames_are_skipped_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("notes.txt")).unwrap();
        writeln!(f, "not an image").unwrap();
        let artwork_cache = ArtworkCache::new();
        assert!(locate_artwork_bytes(dir.path(), &artwork_cache).is_none());
    }
}
