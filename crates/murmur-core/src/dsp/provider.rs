//! Clip data and sample providers
//!
//! Clip audio is decoded once at registration and shared by reference
//! counting: the asset store keeps one `Arc<ClipData>` for the whole session,
//! so a provider dropped on the audio thread only ever decrements a count.

use std::path::Path;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::types::Sample;

/// Decoded clip samples (interleaved, mono or stereo)
#[derive(Debug, Clone)]
pub struct ClipData {
    samples: Vec<Sample>,
    channels: u16,
    sample_rate: u32,
}

impl ClipData {
    /// Wrap interleaved samples
    ///
    /// Only mono and stereo clips are accepted.
    pub fn from_interleaved(samples: Vec<Sample>, channels: u16, sample_rate: u32) -> EngineResult<Self> {
        if channels != 1 && channels != 2 {
            return Err(EngineError::InvalidClip(format!(
                "{} channels (only mono and stereo clips are supported)",
                channels
            )));
        }
        if sample_rate == 0 {
            return Err(EngineError::InvalidClip("sample rate is zero".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(EngineError::InvalidClip(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Decode a WAV file (integer or float PCM)
    pub fn from_wav(path: &Path) -> EngineResult<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| EngineError::InvalidClip(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: Result<Vec<Sample>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect()
            }
        };
        let samples =
            samples.map_err(|e| EngineError::InvalidClip(format!("{}: {}", path.display(), e)))?;

        log::debug!(
            "Decoded {:?}: {} ch, {} Hz, {} frames",
            path,
            spec.channels,
            spec.sample_rate,
            samples.len() / spec.channels.max(1) as usize
        );

        Self::from_interleaved(samples, spec.channels, spec.sample_rate)
    }

    /// Generate a sine tone (test fixtures and demo scenes)
    pub fn sine(frequency: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> Self {
        let frames = (seconds.max(0.0) * sample_rate as f32) as usize;
        let step = std::f32::consts::TAU * frequency / sample_rate as f32;
        let samples = (0..frames).map(|i| amplitude * (step * i as f32).sin()).collect();
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    /// Number of channels (1 or 2)
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Native sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Length in seconds at the native rate
    pub fn length_seconds(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Cursor over a shared clip, bound into a kernel's provider table
#[derive(Debug, Clone)]
pub struct ClipReader {
    clip: Arc<ClipData>,
    /// Next frame to read
    cursor: usize,
    looping: bool,
}

impl ClipReader {
    pub fn new(clip: Arc<ClipData>, looping: bool) -> Self {
        Self {
            clip,
            cursor: 0,
            looping,
        }
    }

    /// Channel count of the frames written by [`read`](Self::read)
    pub fn channels(&self) -> usize {
        self.clip.channels as usize
    }

    /// Whether the reader wraps at the end of the clip
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Read up to `frames` frames into `dst` in the clip's channel layout
    ///
    /// Returns the number of frames written. A looping reader only returns
    /// fewer than `frames` when the clip is empty.
    pub fn read(&mut self, dst: &mut [Sample], frames: usize) -> usize {
        let channels = self.channels();
        let total = self.clip.frames();
        let frames = frames.min(dst.len() / channels);
        let mut written = 0;

        while written < frames {
            if self.cursor >= total {
                if self.looping && total > 0 {
                    self.cursor = 0;
                } else {
                    break;
                }
            }
            let n = (frames - written).min(total - self.cursor);
            let src = &self.clip.samples[self.cursor * channels..(self.cursor + n) * channels];
            dst[written * channels..(written + n) * channels].copy_from_slice(src);
            written += n;
            self.cursor += n;
        }
        written
    }
}

/// Enum-keyed table of sample providers bound to a node
#[derive(Debug, Clone, Default)]
pub struct ProviderTable {
    slots: Vec<Option<ClipReader>>,
}

impl ProviderTable {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    /// Provider bound to `key`, if any
    #[inline]
    pub fn get_mut<P: super::ProviderKey>(&mut self, key: P) -> Option<&mut ClipReader> {
        self.slots.get_mut(key.index()).and_then(|slot| slot.as_mut())
    }

    /// Replace the provider at `index`, returning the previous binding
    ///
    /// `Err` hands the new provider back when `index` is out of range.
    pub fn replace(
        &mut self,
        index: usize,
        provider: Option<ClipReader>,
    ) -> Result<Option<ClipReader>, Option<ClipReader>> {
        match self.slots.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, provider)),
            None => Err(provider),
        }
    }

    /// Unbind every provider
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_clip(frames: usize) -> Arc<ClipData> {
        let samples = (0..frames).map(|i| i as f32).collect();
        Arc::new(ClipData::from_interleaved(samples, 1, 48000).unwrap())
    }

    #[test]
    fn test_rejects_multichannel() {
        let result = ClipData::from_interleaved(vec![0.0; 12], 6, 48000);
        assert!(matches!(result, Err(EngineError::InvalidClip(_))));
    }

    #[test]
    fn test_rejects_partial_frames() {
        let result = ClipData::from_interleaved(vec![0.0; 3], 2, 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_one_shot_reader_runs_dry() {
        let mut reader = ClipReader::new(ramp_clip(5), false);
        let mut dst = [0.0; 4];
        assert_eq!(reader.read(&mut dst, 4), 4);
        assert_eq!(dst, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(reader.read(&mut dst, 4), 1);
        assert_eq!(dst[0], 4.0);
        assert_eq!(reader.read(&mut dst, 4), 0);
    }

    #[test]
    fn test_looping_reader_wraps() {
        let mut reader = ClipReader::new(ramp_clip(3), true);
        let mut dst = [0.0; 7];
        assert_eq!(reader.read(&mut dst, 7), 7);
        assert_eq!(dst, [0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_looping_empty_clip_returns_zero() {
        let clip = Arc::new(ClipData::from_interleaved(Vec::new(), 2, 48000).unwrap());
        let mut reader = ClipReader::new(clip, true);
        let mut dst = [0.0; 8];
        assert_eq!(reader.read(&mut dst, 4), 0);
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..100 {
            writer.write_sample((i * 100) as i16).unwrap();
            writer.write_sample(-(i * 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let clip = ClipData::from_wav(&path).unwrap();
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.frames(), 100);
        let expected = 9900.0 / 32768.0;
        assert!((clip.samples()[198] - expected).abs() < 1e-6);
        assert!((clip.samples()[199] + expected).abs() < 1e-6);
    }

    #[test]
    fn test_sine_length() {
        let clip = ClipData::sine(1000.0, 0.5, 0.5, 48000);
        assert_eq!(clip.frames(), 24000);
        assert!((clip.length_seconds() - 0.5).abs() < 1e-6);
        assert!(clip.samples().iter().all(|s| s.abs() <= 0.5));
    }
}
