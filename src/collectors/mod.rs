//! Long-lived background tasks: [`LibraryCollector`] (§4.6) and
//! [`PlaybackCollector`] (§4.7).
//!
//! Both follow the teacher's background-thread-with-channel idiom
//! (`player::mod::Player` spawning `AudioOutput::new`'s audio thread):
//! a `spawn` constructor starts a named thread and hands back a handle
//! that signals shutdown via an atomic/channel and joins on drop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::artwork::ArtworkCache;
use crate::library::Library;
use crate::model::{Alert, LibraryState, PlaybackState, PlayerState, QueueState, RepeatMode, Track};
use crate::playback::queue::{AdvanceOutcome, PlaybackQueue};
use crate::playback::{run_inner_loop, CpalSink, Decoder, PlaybackControl, Sink, SymphoniaDecoder};
use crate::snapshot::SnapshotPublisher;

/// How long the library collector sleeps between refresh passes,
/// broken into short increments so a stop request is noticed within
/// one second (§4.6).
const LIBRARY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LIBRARY_REST_TICKS: u32 = 10;

/// A long-lived task that keeps [`Library`] (and therefore the
/// published `LibraryState`) current.
pub struct LibraryCollector {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LibraryCollector {
    pub fn spawn(
        roots: Vec<PathBuf>,
        cache_path: PathBuf,
        artwork_cache: Arc<ArtworkCache>,
        artwork_cache_path: PathBuf,
        publisher: Arc<SnapshotPublisher>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("library-collector".into())
            .spawn(move || {
                run_library_collector(roots, cache_path, artwork_cache, artwork_cache_path, publisher, stop_for_thread)
            })
            .expect("failed to spawn library-collector thread");
        Self { stop, handle: Some(handle) }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for LibraryCollector {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_library_collector(
    roots: Vec<PathBuf>,
    cache_path: PathBuf,
    artwork_cache: Arc<ArtworkCache>,
    artwork_cache_path: PathBuf,
    publisher: Arc<SnapshotPublisher>,
    stop: Arc<AtomicBool>,
) {
    let mut library = Library::new(roots, cache_path);
    library.load_cache();

    while !stop.load(Ordering::SeqCst) {
        let _ = publisher.update(|snap| {
            snap.library = Arc::new(LibraryState {
                is_scanning: true,
                ..(*snap.library).clone()
            });
        });

        let outcome = library.refresh(&artwork_cache);
        let tracks = library.get_all_tracks();
        let track_count = tracks.len() as u64;

        let _ = publisher.update(|snap| {
            let mut lib_state = LibraryState::with_tracks(tracks.clone());
            lib_state.is_scanning = false;
            lib_state.scanned_count = track_count;
            lib_state.total_count = track_count;
            snap.library = Arc::new(lib_state);

            let mut queue = (*snap.queue).clone();
            queue.retain_valid(&snap.library);
            snap.queue = Arc::new(queue);
        });

        if !matches!(outcome.tier, Some(crate::library::CacheTier::Tree)) {
            if let Err(e) = library.save() {
                tracing::warn!(target: "collectors", error = %e, "failed to save library cache");
            }
        }
        if let Err(e) = artwork_cache.save(&artwork_cache_path) {
            tracing::warn!(target: "collectors", error = %e, "failed to save artwork cache");
        }

        tracing::info!(
            target: "collectors",
            tier = ?outcome.tier,
            reparsed = outcome.reparsed_count,
            pruned = outcome.pruned_count,
            tracks = track_count,
            "library refresh complete"
        );

        for _ in 0..LIBRARY_REST_TICKS {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(LIBRARY_POLL_INTERVAL);
        }
    }
}

/// Commands the event bus (or CLI) sends to the playback collector.
/// The collector is the sole writer of `Snapshot.player` and
/// `Snapshot.queue`; everything else communicates through this channel,
/// mirroring the teacher's `PlayerCommand` idiom.
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    TogglePlayPause,
    Next,
    Previous,
    SeekMs(u64),
    SetVolumePercent(u8),
    ToggleRepeat,
    ToggleShuffle,
    AddTrackToQueue(usize),
    ClearQueue,
    Shutdown,
}

type DecoderFactory = Box<dyn Fn(&std::path::Path) -> crate::error::Result<Box<dyn Decoder>> + Send>;
type SinkFactory = Box<dyn Fn(u32, u16) -> crate::error::Result<Box<dyn Sink>> + Send>;

pub struct PlaybackCollector {
    command_tx: Sender<PlaybackCommand>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackCollector {
    /// Spawn against real `symphonia`/`cpal` backends.
    pub fn spawn(publisher: Arc<SnapshotPublisher>) -> Self {
        Self::spawn_with_factories(
            publisher,
            Box::new(|path| SymphoniaDecoder::open(path).map(|d| Box::new(d) as Box<dyn Decoder>)),
            Box::new(|rate, channels| CpalSink::new(rate, channels).map(|s| Box::new(s) as Box<dyn Sink>)),
        )
    }

    pub fn spawn_with_factories(
        publisher: Arc<SnapshotPublisher>,
        decoder_factory: DecoderFactory,
        sink_factory: SinkFactory,
    ) -> Self {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let control = Arc::new(PlaybackControl::default());
        let handle = thread::Builder::new()
            .name("playback-collector".into())
            .spawn(move || run_playback_collector(publisher, command_rx, control, decoder_factory, sink_factory))
            .expect("failed to spawn playback-collector thread");
        Self { command_tx, handle: Some(handle) }
    }

    pub fn send(&self, command: PlaybackCommand) {
        let _ = self.command_tx.send(command);
    }

    /// A cloneable handle to the command channel, for wiring an
    /// external event source (e.g. the event bus) without borrowing
    /// the collector itself across thread/closure boundaries.
    pub fn command_sender(&self) -> Sender<PlaybackCommand> {
        self.command_tx.clone()
    }
}

impl Drop for PlaybackCollector {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_playback_collector(
    publisher: Arc<SnapshotPublisher>,
    command_rx: Receiver<PlaybackCommand>,
    control: Arc<PlaybackControl>,
    decoder_factory: DecoderFactory,
    sink_factory: SinkFactory,
) {
    let mut queue = PlaybackQueue::new((*publisher.get_current().queue).clone());
    let nonfinite_counter = std::sync::atomic::AtomicU64::new(0);

    loop {
        let idle = publisher.get_current().player.state != PlaybackState::Playing;
        let command = if idle {
            command_rx.recv_timeout(Duration::from_millis(200)).ok()
        } else {
            command_rx.try_recv().ok()
        };

        if let Some(command) = command {
            if !apply_command(command, &mut queue, &publisher, &control) {
                return;
            }
        }

        let snapshot = publisher.get_current();
        let Some(track_index) = snapshot.queue.current else {
            thread::sleep(Duration::from_millis(50));
            continue;
        };

        if track_index >= snapshot.library.tracks.len() {
            let _ = publisher.update(|snap| {
                snap.push_alert(Alert::crit(format!("queue cursor {track_index} is out of range")));
            });
            resolve_advance(&mut queue, &snapshot.player, snapshot.library.tracks.len(), &publisher);
            continue;
        }

        let track: Track = snapshot.library.tracks[track_index].clone();
        if !track.is_valid {
            let _ = publisher.update(|snap| {
                snap.push_alert(Alert::warn(format!("skipping unplayable track: {}", track.path.display())));
            });
            resolve_advance(&mut queue, &snapshot.player, snapshot.library.tracks.len(), &publisher);
            continue;
        }

        let mut decoder = match decoder_factory(&track.path) {
            Ok(d) => d,
            Err(e) => {
                let _ = publisher.update(|snap| snap.push_alert(Alert::crit(format!("failed to open decoder: {e}"))));
                resolve_advance(&mut queue, &snapshot.player, snapshot.library.tracks.len(), &publisher);
                continue;
            }
        };
        let mut sink = match sink_factory(decoder.sample_rate(), decoder.channels()) {
            Ok(s) => s,
            Err(e) => {
                let _ = publisher.update(|snap| snap.push_alert(Alert::crit(format!("failed to open audio sink: {e}"))));
                resolve_advance(&mut queue, &snapshot.player, snapshot.library.tracks.len(), &publisher);
                continue;
            }
        };

        let _ = publisher.update(|snap| {
            snap.player.state = PlaybackState::Playing;
            snap.player.current_track_index = Some(track_index);
            snap.player.playback_position_ms = 0;
        });

        control.reset();
        let exit = run_inner_loop(decoder.as_mut(), sink.as_mut(), &publisher, &control, track_index, &nonfinite_counter);
        handle_inner_loop_exit(exit, &mut queue, &publisher, &control);
    }
}

fn handle_inner_loop_exit(
    exit: crate::playback::InnerLoopExit,
    queue: &mut PlaybackQueue,
    publisher: &SnapshotPublisher,
    control: &PlaybackControl,
) {
    use crate::playback::InnerLoopExit;
    match exit {
        InnerLoopExit::Stopped => {
            let _ = publisher.update(|snap| snap.player.state = PlaybackState::Stopped);
        }
        InnerLoopExit::Cleared => {
            queue.state = QueueState::empty();
            let _ = publisher.update(|snap| {
                snap.queue = Arc::new(QueueState::empty());
                snap.player.state = PlaybackState::Stopped;
                snap.player.current_track_index = None;
            });
            control.clear_requested.store(false, Ordering::SeqCst);
        }
        InnerLoopExit::TrackChanged => {
            queue.state = (*publisher.get_current().queue).clone();
        }
        InnerLoopExit::EndOfTrack => {
            let player = publisher.get_current().player.clone();
            let library_len = publisher.get_current().library.tracks.len();
            resolve_advance(queue, &player, library_len, publisher);
        }
        InnerLoopExit::WriteError => {
            let _ = publisher.update(|snap| snap.push_alert(Alert::crit("audio sink write error")));
            let player = publisher.get_current().player.clone();
            let library_len = publisher.get_current().library.tracks.len();
            resolve_advance(queue, &player, library_len, publisher);
        }
    }
}

/// Apply one command, returning `false` when the collector should
/// shut down.
fn apply_command(
    command: PlaybackCommand,
    queue: &mut PlaybackQueue,
    publisher: &SnapshotPublisher,
    control: &PlaybackControl,
) -> bool {
    match command {
        PlaybackCommand::Shutdown => {
            control.stop_requested.store(true, Ordering::SeqCst);
            false
        }
        PlaybackCommand::TogglePlayPause => {
            let _ = publisher.update(|snap| {
                snap.player.state = match snap.player.state {
                    PlaybackState::Playing => PlaybackState::Paused,
                    PlaybackState::Paused | PlaybackState::Stopped => PlaybackState::Playing,
                };
            });
            true
        }
        PlaybackCommand::Next => {
            let snapshot = publisher.get_current();
            resolve_advance(queue, &snapshot.player, snapshot.library.tracks.len(), publisher);
            true
        }
        PlaybackCommand::Previous => {
            if let Some(idx) = queue.previous() {
                let state = queue.state.clone();
                let _ = publisher.update(|snap| {
                    snap.queue = Arc::new(state.clone());
                    snap.player.current_track_index = Some(idx);
                });
            }
            true
        }
        PlaybackCommand::SeekMs(ms) => {
            let _ = publisher.update(|snap| snap.player.request_seek(ms));
            true
        }
        PlaybackCommand::SetVolumePercent(v) => {
            let v = v.min(100);
            let _ = publisher.update(|snap| snap.player.volume_percent = v);
            true
        }
        PlaybackCommand::ToggleRepeat => {
            let _ = publisher.update(|snap| {
                snap.player.repeat_mode = next_repeat_mode(snap.player.repeat_mode);
            });
            true
        }
        PlaybackCommand::ToggleShuffle => {
            let _ = publisher.update(|snap| snap.player.shuffle = !snap.player.shuffle);
            true
        }
        PlaybackCommand::AddTrackToQueue(index) => {
            queue.state.push_back(index);
            let state = queue.state.clone();
            let _ = publisher.update(|snap| snap.queue = Arc::new(state.clone()));
            true
        }
        PlaybackCommand::ClearQueue => {
            control.clear_requested.store(true, Ordering::SeqCst);
            queue.state = QueueState::empty();
            let _ = publisher.update(|snap| {
                snap.queue = Arc::new(QueueState::empty());
                snap.player.current_track_index = None;
            });
            true
        }
    }
}

fn next_repeat_mode(mode: RepeatMode) -> RepeatMode {
    match mode {
        RepeatMode::Off => RepeatMode::One,
        RepeatMode::One => RepeatMode::All,
        RepeatMode::All => RepeatMode::Off,
    }
}

fn resolve_advance(queue: &mut PlaybackQueue, player: &PlayerState, library_len: usize, publisher: &SnapshotPublisher) {
    match queue.advance(player, library_len) {
        AdvanceOutcome::Next(idx) => {
            let state = queue.state.clone();
            let _ = publisher.update(|snap| {
                snap.queue = Arc::new(state.clone());
                snap.player.current_track_index = Some(idx);
            });
        }
        AdvanceOutcome::Continue => {}
        AdvanceOutcome::Stop => {
            let state = queue.state.clone();
            let _ = publisher.update(|snap| {
                snap.queue = Arc::new(state.clone());
                snap.player.state = PlaybackState::Stopped;
                snap.player.current_track_index = None;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::AudioFormat;
    use std::sync::Mutex;

    fn invalid_tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| {
                let mut t = Track::invalid(format!("/m/{i}.mp3"), "placeholder");
                t.is_valid = true;
                t.format = AudioFormat::Mp3;
                t
            })
            .collect()
    }

    #[test]
    fn set_volume_command_updates_snapshot() {
        let publisher = SnapshotPublisher::new();
        let mut queue = PlaybackQueue::new(QueueState::empty());
        let control = PlaybackControl::default();
        apply_command(PlaybackCommand::SetVolumePercent(42), &mut queue, &publisher, &control);
        assert_eq!(publisher.get_current().player.volume_percent, 42);
    }

    #[test]
    fn volume_is_clamped_to_100() {
        let publisher = SnapshotPublisher::new();
        let mut queue = PlaybackQueue::new(QueueState::empty());
        let control = PlaybackControl::default();
        apply_command(PlaybackCommand::SetVolumePercent(250), &mut queue, &publisher, &control);
        assert_eq!(publisher.get_current().player.volume_percent, 100);
    }

    #[test]
    fn toggle_repeat_cycles_through_all_three_modes() {
        assert_eq!(next_repeat_mode(RepeatMode::Off), RepeatMode::One);
        assert_eq!(next_repeat_mode(RepeatMode::One), RepeatMode::All);
        assert_eq!(next_repeat_mode(RepeatMode::All), RepeatMode::Off);
    }

    #[test]
    fn add_track_to_queue_publishes_the_new_future_entry() {
        let publisher = SnapshotPublisher::new();
        let mut queue = PlaybackQueue::new(QueueState::empty());
        let control = PlaybackControl::default();
        apply_command(PlaybackCommand::AddTrackToQueue(3), &mut queue, &publisher, &control);
        assert_eq!(publisher.get_current().queue.future, vec![3]);
    }

    #[test]
    fn clear_queue_command_sets_the_control_flag_and_clears_the_queue_immediately() {
        let publisher = SnapshotPublisher::new();
        let mut queue = PlaybackQueue::new(QueueState::empty());
        queue.state.push_back(7);
        let control = PlaybackControl::default();
        apply_command(PlaybackCommand::ClearQueue, &mut queue, &publisher, &control);
        assert!(control.clear_requested.load(Ordering::SeqCst));
        assert!(publisher.get_current().queue.is_empty());
        assert!(queue.state.is_empty());
    }

    #[test]
    fn resolve_advance_stop_publishes_stopped_state_and_clears_current() {
        let publisher = SnapshotPublisher::new();
        let mut queue = PlaybackQueue::new(QueueState::empty());
        queue.state.push_back(0);
        queue.state.advance();
        let player = PlayerState {
            repeat_mode: RepeatMode::Off,
            ..Default::default()
        };
        resolve_advance(&mut queue, &player, 1, &publisher);
        let snap = publisher.get_current();
        assert_eq!(snap.player.state, PlaybackState::Stopped);
        assert_eq!(snap.player.current_track_index, None);
    }

    struct FakeDecoder {
        sample_rate: u32,
        channels: u16,
        remaining: Vec<f32>,
    }

    impl Decoder for FakeDecoder {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn channels(&self) -> u16 {
            self.channels
        }
        fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
            let channels = self.channels as usize;
            let frames = (self.remaining.len() / channels).min(buf.len() / channels);
            let n = frames * channels;
            buf[..n].copy_from_slice(&self.remaining[..n]);
            self.remaining.drain(..n);
            Ok(frames)
        }
        fn seek_to_frame(&mut self, _frame: u64) -> Result<()> {
            Ok(())
        }
    }

    struct FakeSink;
    impl Sink for FakeSink {
        fn sample_rate(&self) -> u32 {
            44_100
        }
        fn channels(&self) -> u16 {
            2
        }
        fn set_paused(&mut self, _paused: bool) {}
        fn set_volume_percent(&mut self, _v: u8) {}
        fn write(&mut self, frames: &[f32]) -> Result<usize> {
            Ok(frames.len() / 2)
        }
    }

    #[test]
    fn end_to_end_plays_through_a_short_library_and_stops() {
        let publisher = Arc::new(SnapshotPublisher::new());
        let tracks = invalid_tracks(1);
        publisher
            .update(|snap| {
                snap.library = Arc::new(LibraryState::with_tracks(tracks.clone()));
                let mut q = QueueState::empty();
                q.push_back(0);
                q.advance();
                snap.queue = Arc::new(q);
                snap.player.repeat_mode = RepeatMode::Off;
            })
            .unwrap();

        let decoded_frames = Mutex::new(Some(vec![0.0f32; 200]));
        let decoder_factory: DecoderFactory = Box::new(move |_path| {
            let remaining = decoded_frames.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(FakeDecoder { sample_rate: 44_100, channels: 2, remaining }) as Box<dyn Decoder>)
        });
        let sink_factory: SinkFactory = Box::new(|_rate, _channels| Ok(Box::new(FakeSink) as Box<dyn Sink>));

        let collector = PlaybackCollector::spawn_with_factories(Arc::clone(&publisher), decoder_factory, sink_factory);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if publisher.get_current().player.state == PlaybackState::Stopped
                && publisher.get_current().player.current_track_index.is_none()
            {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "playback collector never reached Stopped");
            thread::sleep(Duration::from_millis(20));
        }

        drop(collector);
    }
}
