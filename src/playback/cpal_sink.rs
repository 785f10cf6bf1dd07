//! A `cpal`-backed [`Sink`]: an internally-resampling PCM writer that
//! feeds the platform's default output device.
//!
//! The real-time callback touches only atomics and a bounded
//! `crossbeam-channel` receiver — no locks, no allocation on the hot
//! path — following the real-time-safety discipline the teacher's own
//! audio callback documents.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};

use super::resampler::Resampler;
use super::Sink;
use crate::error::{Error, Result};

/// How many PCM chunks may be queued ahead of the callback before
/// `write` reports a partial write.
const CHUNK_QUEUE_CAPACITY: usize = 32;

pub struct CpalSink {
    _stream: Stream,
    sender: Sender<Vec<f32>>,
    paused: Arc<AtomicBool>,
    volume_bits: Arc<AtomicU32>,
    resampler: Resampler,
    device_sample_rate: u32,
    device_channels: u16,
    source_channels: u16,
}

impl CpalSink {
    pub fn new(source_sample_rate: u32, source_channels: u16) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::SinkInitFailed("no output device found".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::SinkInitFailed(e.to_string()))?;

        let device_sample_rate = supported.sample_rate().0;
        let device_channels = supported.channels();
        let config = StreamConfig {
            channels: device_channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = bounded::<Vec<f32>>(CHUNK_QUEUE_CAPACITY);
        let paused = Arc::new(AtomicBool::new(false));
        let volume_bits = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        let callback_paused = Arc::clone(&paused);
        let callback_volume = Arc::clone(&volume_bits);
        let mut leftover: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if callback_paused.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let volume = f32::from_bits(callback_volume.load(Ordering::Relaxed));
                    let mut filled = 0usize;
                    while filled < data.len() {
                        if leftover.is_empty() {
                            match receiver.try_recv() {
                                Ok(chunk) => leftover = chunk,
                                Err(_) => break,
                            }
                        }
                        let take = leftover.len().min(data.len() - filled);
                        for (dst, src) in data[filled..filled + take].iter_mut().zip(leftover.drain(..take)) {
                            *dst = src * volume;
                        }
                        filled += take;
                    }
                    data[filled..].fill(0.0);
                },
                |err| tracing::error!(target: "playback", error = %err, "cpal output stream error"),
                None,
            )
            .map_err(|e| Error::SinkInitFailed(e.to_string()))?;

        stream.play().map_err(|e| Error::SinkInitFailed(e.to_string()))?;

        if source_sample_rate != device_sample_rate {
            tracing::info!(
                target: "playback",
                source_sample_rate, device_sample_rate, "resampling to match output device"
            );
        }

        Ok(Self {
            _stream: stream,
            sender,
            paused,
            volume_bits,
            resampler: Resampler::new(source_sample_rate, device_sample_rate, source_channels),
            device_sample_rate,
            device_channels,
            source_channels,
        })
    }

}

/// Adapt a naive mono/stereo mismatch between the decoder and the
/// device. Anything beyond mono/stereo is truncated or zero-padded per
/// frame rather than attempting a full matrix downmix.
fn adapt_channels(interleaved: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    if from == to {
        return interleaved.to_vec();
    }
    let frames = interleaved.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in 0..frames {
        let src = &interleaved[frame * from..frame * from + from];
        match (from, to) {
            (1, 2) => {
                out.push(src[0]);
                out.push(src[0]);
            }
            (2, 1) => out.push((src[0] + src[1]) / 2.0),
            _ => {
                for c in 0..to {
                    out.push(*src.get(c).unwrap_or(&0.0));
                }
            }
        }
    }
    out
}

impl Sink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    fn channels(&self) -> u16 {
        self.device_channels
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn set_volume_percent(&mut self, volume: u8) {
        let fraction = (volume.min(100) as f32) / 100.0;
        self.volume_bits.store(fraction.to_bits(), Ordering::Relaxed);
    }

    fn write(&mut self, frames: &[f32]) -> Result<usize> {
        let source_channels = self.source_channels.max(1) as usize;
        let input_frame_count = frames.len() / source_channels;
        let resampled = self.resampler.process(frames);
        let adapted = adapt_channels(&resampled, self.source_channels, self.device_channels);

        if adapted.is_empty() {
            // The resampler is still accumulating a chunk: count the
            // whole input as consumed so the caller doesn't spin.
            return Ok(input_frame_count);
        }

        match self.sender.try_send(adapted) {
            Ok(()) => Ok(input_frame_count),
            Err(crossbeam_channel::TrySendError::Full(_)) => Ok(0),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(Error::PipelineWriteError("output stream disconnected".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_to_stereo_duplicates_the_sample() {
        assert_eq!(adapt_channels(&[0.5, -0.5], 1, 2), vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn stereo_to_mono_averages_channels() {
        assert_eq!(adapt_channels(&[1.0, 0.0], 2, 1), vec![0.5]);
    }

    #[test]
    fn matching_channel_counts_pass_through() {
        assert_eq!(adapt_channels(&[0.1, 0.2], 2, 2), vec![0.1, 0.2]);
    }
}
