//! The playback collector's inner loop (§4.7) and the narrow
//! `Decoder`/`Sink` contracts it's driven through.
//!
//! Format decoding and PCM output are explicitly out of scope for the
//! engineering core (§1) — `Decoder` and `Sink` are the seams. Real
//! implementations live in [`symphonia_decoder`] and [`cpal_sink`],
//! built on the teacher's existing `symphonia`/`cpal` dependencies, so
//! the collector has something real to drive; tests exercise the loop
//! itself against fakes.

pub mod cpal_sink;
pub mod queue;
pub mod resampler;
pub mod symphonia_decoder;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::snapshot::SnapshotPublisher;

pub use cpal_sink::CpalSink;
pub use symphonia_decoder::SymphoniaDecoder;

/// Frames pulled from the decoder per inner-loop iteration (§4.7).
pub const PCM_BUFFER_FRAMES: usize = 16_384;

/// How often `playback_position_ms` is republished while playing.
const POSITION_PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// How often an artwork/PCM worker waits on a condition variable
/// before re-checking its stop flag (§5's "bounded wait" requirement).
pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Decodes one audio file into interleaved `f32` PCM, frame by frame.
pub trait Decoder: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Fill `buf` (interleaved, `channels` samples per frame) with up
    /// to `buf.len() / channels` frames. Returns the number of frames
    /// actually written; `0` means end of stream.
    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize>;
    fn seek_to_frame(&mut self, frame: u64) -> Result<()>;
}

/// Consumes decoded PCM and reports its own readiness.
pub trait Sink: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn set_paused(&mut self, paused: bool);
    fn set_volume_percent(&mut self, volume: u8);
    /// Write interleaved frames, tolerating partial writes. Returns
    /// the number of frames actually consumed.
    fn write(&mut self, frames: &[f32]) -> Result<usize>;
}

/// Flags the event bus / queue controller use to interrupt the inner
/// loop without taking a lock (§5).
#[derive(Default)]
pub struct PlaybackControl {
    pub stop_requested: AtomicBool,
    pub clear_requested: AtomicBool,
}

impl PlaybackControl {
    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.clear_requested.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerLoopExit {
    Stopped,
    Cleared,
    TrackChanged,
    EndOfTrack,
    WriteError,
}

/// Drive `decoder` into `sink` until stop/clear is requested, the
/// queue cursor moves away from `track_index`, the track ends, or a
/// write fails (§4.7's numbered inner loop).
pub fn run_inner_loop(
    decoder: &mut dyn Decoder,
    sink: &mut dyn Sink,
    publisher: &SnapshotPublisher,
    control: &PlaybackControl,
    track_index: usize,
    nonfinite_counter: &AtomicU64,
) -> InnerLoopExit {
    let mut buf = vec![0f32; PCM_BUFFER_FRAMES * decoder.channels().max(1) as usize];
    let mut last_volume: Option<u8> = None;
    let mut last_position_publish = Instant::now() - POSITION_PUBLISH_INTERVAL;
    let mut frames_played: u64 = 0;

    loop {
        if control.stop_requested.load(Ordering::SeqCst) {
            return InnerLoopExit::Stopped;
        }
        if control.clear_requested.load(Ordering::SeqCst) {
            return InnerLoopExit::Cleared;
        }

        let snapshot = publisher.get_current();
        if snapshot.queue.current != Some(track_index) {
            return InnerLoopExit::TrackChanged;
        }

        let player = snapshot.player.clone();

        if player.state == crate::model::PlaybackState::Paused {
            sink.set_paused(true);
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        sink.set_paused(false);

        if player.has_pending_seek() {
            let seek_ms = player.seek_request_ms as u64;
            let target_frame = seek_ms * decoder.sample_rate() as u64 / 1000;
            let _ = decoder.seek_to_frame(target_frame);
            let _ = publisher.update(|snap| {
                snap.player.take_seek_request();
            });
        }

        if last_volume != Some(player.volume_percent) {
            sink.set_volume_percent(player.volume_percent);
            last_volume = Some(player.volume_percent);
        }

        let frames_read = match decoder.read_frames(&mut buf) {
            Ok(0) => return InnerLoopExit::EndOfTrack,
            Ok(n) => n,
            Err(_) => return InnerLoopExit::WriteError,
        };
        let channels = decoder.channels().max(1) as usize;
        let samples = &mut buf[..frames_read * channels];
        sanitize_samples(samples, nonfinite_counter);

        let mut written = 0usize;
        while written < frames_read {
            match sink.write(&samples[written * channels..frames_read * channels]) {
                Ok(0) => return InnerLoopExit::WriteError,
                Ok(n) => written += n,
                Err(_) => return InnerLoopExit::WriteError,
            }
        }
        frames_played += frames_read as u64;

        if last_position_publish.elapsed() >= POSITION_PUBLISH_INTERVAL {
            let position_ms = frames_played * 1000 / decoder.sample_rate().max(1) as u64;
            let _ = publisher.update(|snap| {
                snap.player.playback_position_ms = position_ms;
            });
            last_position_publish = Instant::now();
        }
    }
}

/// Clamp every sample to `[-1.0, 1.0]` and replace non-finite values
/// with `0.0`, logging at most once per 1000 occurrences (§4.7, §8's
/// "NaN/Inf produces a 0.0 sample and no crash").
fn sanitize_samples(samples: &mut [f32], nonfinite_counter: &AtomicU64) {
    for sample in samples.iter_mut() {
        if !sample.is_finite() {
            *sample = 0.0;
            let count = nonfinite_counter.fetch_add(1, Ordering::Relaxed);
            if count % 1000 == 0 {
                tracing::warn!(
                    target: "playback",
                    total = count,
                    "replaced non-finite PCM sample with 0.0"
                );
            }
        } else {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlaybackState, PlayerState, QueueState, Snapshot};

    struct FakeDecoder {
        sample_rate: u32,
        channels: u16,
        remaining_frames: Vec<f32>,
        seek_calls: Vec<u64>,
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
            let available_frames = self.remaining_frames.len() / channels;
            let requested_frames = buf.len() / channels;
            let frames = available_frames.min(requested_frames);
            let sample_count = frames * channels;
            buf[..sample_count].copy_from_slice(&self.remaining_frames[..sample_count]);
            self.remaining_frames.drain(..sample_count);
            Ok(frames)
        }
        fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
            self.seek_calls.push(frame);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        written: Vec<f32>,
        paused: bool,
        volume: u8,
    }

    impl Sink for FakeSink {
        fn sample_rate(&self) -> u32 {
            44_100
        }
        fn channels(&self) -> u16 {
            2
        }
        fn set_paused(&mut self, paused: bool) {
            self.paused = paused;
        }
        fn set_volume_percent(&mut self, volume: u8) {
            self.volume = volume;
        }
        fn write(&mut self, frames: &[f32]) -> Result<usize> {
            self.written.extend_from_slice(frames);
            Ok(frames.len() / 2)
        }
    }

    fn snapshot_with_current(index: Option<usize>, player: PlayerState) -> Snapshot {
        let mut snap = Snapshot::initial();
        snap.queue = std::sync::Arc::new(QueueState {
            current: index,
            ..Default::default()
        });
        snap.player = player;
        snap
    }

    #[test]
    fn end_of_track_exits_cleanly() {
        let publisher = SnapshotPublisher::new();
        publisher
            .update(|snap| *snap = snapshot_with_current(Some(0), PlayerState::default()))
            .unwrap();

        let mut decoder = FakeDecoder {
            sample_rate: 44_100,
            channels: 2,
            remaining_frames: vec![0.1; 200],
            seek_calls: Vec::new(),
        };
        let mut sink = FakeSink::default();
        let control = PlaybackControl::default();
        let counter = AtomicU64::new(0);

        let exit = run_inner_loop(&mut decoder, &mut sink, &publisher, &control, 0, &counter);
        assert_eq!(exit, InnerLoopExit::EndOfTrack);
        assert_eq!(sink.written.len(), 200);
    }

    #[test]
    fn stop_flag_interrupts_immediately() {
        let publisher = SnapshotPublisher::new();
        publisher
            .update(|snap| *snap = snapshot_with_current(Some(0), PlayerState::default()))
            .unwrap();

        let mut decoder = FakeDecoder {
            sample_rate: 44_100,
            channels: 2,
            remaining_frames: vec![0.0; 999_999],
            seek_calls: Vec::new(),
        };
        let mut sink = FakeSink::default();
        let control = PlaybackControl::default();
        control.stop_requested.store(true, Ordering::SeqCst);
        let counter = AtomicU64::new(0);

        let exit = run_inner_loop(&mut decoder, &mut sink, &publisher, &control, 0, &counter);
        assert_eq!(exit, InnerLoopExit::Stopped);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn track_change_is_detected_via_queue_cursor() {
        let publisher = SnapshotPublisher::new();
        publisher
            .update(|snap| *snap = snapshot_with_current(Some(5), PlayerState::default()))
            .unwrap();

        let mut decoder = FakeDecoder {
            sample_rate: 44_100,
            channels: 2,
            remaining_frames: vec![0.0; 100],
            seek_calls: Vec::new(),
        };
        let mut sink = FakeSink::default();
        let control = PlaybackControl::default();
        let counter = AtomicU64::new(0);

        // track_index 0 requested, but the published queue says current = 5
        let exit = run_inner_loop(&mut decoder, &mut sink, &publisher, &control, 0, &counter);
        assert_eq!(exit, InnerLoopExit::TrackChanged);
    }

    #[test]
    fn nonfinite_and_out_of_range_samples_are_sanitized() {
        let mut samples = vec![f32::NAN, f32::INFINITY, -2.0, 2.0, 0.5];
        let counter = AtomicU64::new(0);
        sanitize_samples(&mut samples, &counter);
        assert_eq!(samples, vec![0.0, 0.0, -1.0, 1.0, 0.5]);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn pending_seek_is_consumed_and_forwarded_to_decoder() {
        let publisher = SnapshotPublisher::new();
        publisher
            .update(|snap| {
                let mut player = PlayerState::default();
                player.seek_request_ms = 2000;
                *snap = snapshot_with_current(Some(0), player);
            })
            .unwrap();

        let mut decoder = FakeDecoder {
            sample_rate: 44_100,
            channels: 2,
            remaining_frames: vec![0.0; 20],
            seek_calls: Vec::new(),
        };
        let mut sink = FakeSink::default();
        let control = PlaybackControl::default();
        let counter = AtomicU64::new(0);

        run_inner_loop(&mut decoder, &mut sink, &publisher, &control, 0, &counter);
        assert_eq!(decoder.seek_calls, vec![2000 * 44_100 / 1000]);
        assert_eq!(
            publisher.get_current().player.seek_request_ms,
            -1,
            "seek request must be cleared after being applied"
        );
    }
}
