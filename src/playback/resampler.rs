//! Sample-rate conversion between a decoder's native rate and the
//! sink's device rate, using `rubato`.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

/// Wraps an optional `rubato` resampler; a no-op when rates already
/// match.
pub struct Resampler {
    inner: Option<FftFixedIn<f32>>,
    output_rate: u32,
    input_rate: u32,
    channels: usize,
    input_buffer: Vec<Vec<f32>>,
    chunk_size: usize,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        if input_rate == output_rate {
            return Self {
                inner: None,
                input_rate,
                output_rate,
                channels,
                input_buffer: vec![Vec::new(); channels],
                chunk_size: 0,
            };
        }

        let chunk_size = 1024;
        let inner = FftFixedIn::<f32>::new(input_rate as usize, output_rate as usize, chunk_size, 2, channels)
            .expect("rubato resampler construction with a fixed chunk size cannot fail");

        tracing::info!(
            target: "playback",
            input_rate, output_rate, channels, "constructed resampler"
        );

        Self {
            inner: Some(inner),
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
            chunk_size,
        }
    }

    pub fn needs_resampling(&self) -> bool {
        self.inner.is_some()
    }

    fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    /// Process interleaved input samples, returning interleaved
    /// resampled output (possibly empty, if not enough input has
    /// accumulated yet for a full chunk).
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.inner else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.input_buffer[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.input_buffer[0].len() >= self.chunk_size {
            let chunks: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..self.chunk_size).collect())
                .collect();

            match resampler.process(&chunks, None) {
                Ok(resampled) if !resampled.is_empty() && !resampled[0].is_empty() => {
                    let frames = resampled[0].len();
                    for frame in 0..frames {
                        for ch in &resampled {
                            output.push(ch[frame]);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "playback", error = %e, "resampling error, dropping chunk");
                }
            }
        }
        output
    }

    /// Flush buffered input at end-of-stream, zero-padding to a full
    /// chunk and trimming the output back to the expected length.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(ref mut resampler) = self.inner else {
            return Vec::new();
        };
        let remaining = self.input_buffer[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        let pad_needed = self.chunk_size - remaining;
        for ch in &mut self.input_buffer {
            ch.extend(std::iter::repeat_n(0.0, pad_needed));
        }
        let chunks: Vec<Vec<f32>> = self.input_buffer.drain(..).collect();
        self.input_buffer = vec![Vec::new(); self.channels];

        let mut output = Vec::new();
        if let Ok(resampled) = resampler.process(&chunks, None) {
            if !resampled.is_empty() && !resampled[0].is_empty() {
                let expected_frames = (remaining as f64 * self.ratio()).ceil() as usize;
                let frames = resampled[0].len().min(expected_frames);
                for frame in 0..frames {
                    for ch in &resampled {
                        output.push(ch[frame]);
                    }
                }
            }
        }
        output
    }

    pub fn reset(&mut self) {
        for ch in &mut self.input_buffer {
            ch.clear();
        }
        if let Some(ref mut resampler) = self.inner {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rates_are_a_passthrough() {
        let mut r = Resampler::new(48_000, 48_000, 2);
        assert!(!r.needs_resampling());
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(r.process(&input), input);
    }

    #[test]
    fn mismatched_rates_require_resampling() {
        let r = Resampler::new(44_100, 48_000, 2);
        assert!(r.needs_resampling());
    }

    #[test]
    fn ratio_reflects_requested_rates() {
        let r = Resampler::new(44_100, 48_000, 2);
        assert!((r.ratio() - 48_000.0 / 44_100.0).abs() < 1e-9);
    }

    #[test]
    fn short_input_buffers_without_emitting_until_a_full_chunk() {
        let mut r = Resampler::new(44_100, 48_000, 2);
        let output = r.process(&vec![0.0; 10]);
        assert!(output.is_empty());
    }
}
