//! A `symphonia`-backed [`Decoder`], reading interleaved `f32` PCM
//! out of whatever container/codec the track actually is.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder as SymDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::Decoder;
use crate::error::{Error, Result};

pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    /// Samples decoded but not yet handed out by `read_frames`.
    pending: Vec<f32>,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::decoder_open_failed(path, format!("opening file: {e}")))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::decoder_open_failed(path, format!("probing container: {e}")))?;

        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::decoder_open_failed(path, "no audio track in container"))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::decoder_open_failed(path, "unknown sample rate"))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::decoder_open_failed(path, format!("building codec: {e}")))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            pending: Vec::new(),
        })
    }

    /// Decode the next packet belonging to our track, returning its
    /// interleaved `f32` samples, or `None` at end of stream.
    fn decode_next_packet(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::DecodeStreamError(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(Error::DecodeStreamError(e.to_string())),
            };

            return Ok(Some(convert_to_interleaved_f32(&decoded)));
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
        let channels = self.channels.max(1) as usize;
        let mut filled = 0usize;

        while filled < buf.len() {
            if self.pending.is_empty() {
                match self.decode_next_packet()? {
                    Some(samples) => self.pending = samples,
                    None => break,
                }
            }
            let take = self.pending.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&self.pending[..take]);
            self.pending.drain(..take);
            filled += take;
        }

        Ok(filled / channels)
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let time = Time::from(frame as f64 / self.sample_rate as f64);
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::DecodeStreamError(format!("seek failed: {e}")))?;
        self.decoder.reset();
        self.pending.clear();
        Ok(())
    }
}

fn convert_to_interleaved_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let planes = buf.planes();
            let plane_slice = planes.planes();
            if plane_slice.is_empty() {
                return Vec::new();
            }
            let frames = plane_slice[0].len();
            let mut out = Vec::with_capacity(frames * plane_slice.len());
            for frame in 0..frames {
                for plane in plane_slice {
                    out.push(plane[frame]);
                }
            }
            out
        }
        AudioBufferRef::S16(buf) => {
            let planes = buf.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    out.push(plane[frame] as f32 / 32_768.0);
                }
            }
            out
        }
        AudioBufferRef::S24(buf) => {
            let planes = buf.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    out.push(plane[frame].0 as f32 / 8_388_608.0);
                }
            }
            out
        }
        AudioBufferRef::S32(buf) => {
            let planes = buf.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    out.push(plane[frame] as f32 / 2_147_483_648.0);
                }
            }
            out
        }
        AudioBufferRef::U8(buf) => {
            let planes = buf.planes();
            let mut out = Vec::with_capacity(buf.frames() * planes.planes().len());
            for frame in 0..buf.frames() {
                for plane in planes.planes() {
                    out.push((plane[frame] as f32 - 128.0) / 128.0);
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_nonexistent_file_fails_cleanly() {
        let result = SymphoniaDecoder::open(Path::new("/nonexistent/track.mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn opening_a_non_audio_file_fails_to_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("not_audio.mp3");
        std::fs::write(&path, b"this is not an audio container").unwrap();
        let result = SymphoniaDecoder::open(&path);
        assert!(result.is_err());
    }
}
