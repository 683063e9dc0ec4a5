//! cpal output stream
//!
//! ```text
//! ┌──────────────────┐   command blocks    ┌─────────────────────┐
//! │   Main Thread    │──── (rtrb SPSC) ───►│  cpal Audio Thread  │
//! │  AudioContext    │                     │ (owns GraphRenderer)│
//! │  tick()          │◄─── retire/events ──│  render_interleaved │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The renderer is moved into the stream callback, so the callback needs no
//! lock. Device channels beyond two are zero-filled; a mono device gets the
//! average of left and right.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, BufferSize, MAX_BUFFER_SIZE};
use super::device::{default_device, find_device};
use super::error::{AudioError, AudioResult};
use crate::graph::GraphRenderer;

/// A device with a negotiated stream configuration, not yet playing
pub struct PreparedOutput {
    device: cpal::Device,
    device_name: String,
    config: StreamConfig,
}

impl PreparedOutput {
    /// Negotiated sample rate; build the engine at this rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Requested device buffer in frames (None = driver default)
    pub fn buffer_frames(&self) -> Option<u32> {
        match self.config.buffer_size {
            CpalBufferSize::Fixed(frames) => Some(frames),
            CpalBufferSize::Default => None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build the stream, move `renderer` into its callback and start playing
    pub fn start(self, mut renderer: GraphRenderer) -> AudioResult<OutputHandle> {
        if renderer.sample_rate() != self.sample_rate() {
            return Err(AudioError::SampleRateMismatch {
                engine: renderer.sample_rate(),
                device: self.sample_rate(),
            });
        }

        let channels = self.config.channels as usize;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    renderer.render_interleaved(data, channels);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::Stream {
                stage: "build",
                message: e.to_string(),
            })?;
        stream
            .play()
            .map_err(|e| AudioError::Stream {
                stage: "start",
                message: e.to_string(),
            })?;

        log::info!(
            "Audio stream started on {} ({} ch, {} Hz)",
            self.device_name,
            self.config.channels,
            self.config.sample_rate.0
        );

        Ok(OutputHandle {
            _stream: stream,
            sample_rate: self.config.sample_rate.0,
            buffer_frames: self.buffer_frames(),
        })
    }
}

/// Keeps the output stream alive; drop it to stop audio
pub struct OutputHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_frames: Option<u32>,
}

impl OutputHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// One-way output latency in milliseconds, if the buffer size is known
    pub fn latency_ms(&self) -> Option<f32> {
        self.buffer_frames
            .map(|frames| frames as f32 / self.sample_rate as f32 * 1000.0)
    }
}

/// Open the configured (or default) device and negotiate an f32 stream
pub fn open_output(config: &AudioConfig) -> AudioResult<PreparedOutput> {
    let device = match &config.device {
        Some(id) => find_device(id)?,
        None => default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = negotiate(&device, &device_name, config)?;
    let buffer_size = match config.buffer_size {
        BufferSize::Default => CpalBufferSize::Default,
        BufferSize::Fixed(frames) => CpalBufferSize::Fixed(frames.clamp(64, MAX_BUFFER_SIZE as u32)),
    };
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size,
    };

    log::info!(
        "Audio config: {} channels, {}Hz, buffer {:?}",
        stream_config.channels,
        stream_config.sample_rate.0,
        stream_config.buffer_size
    );

    Ok(PreparedOutput {
        device,
        device_name,
        config: stream_config,
    })
}

/// Pick an f32 stereo configuration at the requested rate, falling back to
/// whatever the device offers
fn negotiate(
    device: &cpal::Device,
    device_name: &str,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::Query(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let target = config.target_sample_rate();
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };

    let best = supported_configs
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| AudioError::NoFloatOutput(device_name.to_string()))?;

    let sample_rate = if in_range(&best) {
        cpal::SampleRate(target)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

/// Open the configured device and start it with `renderer` in one step
///
/// Fails with [`AudioError::SampleRateMismatch`] when the device settles on
/// a different rate than the renderer was built for.
pub fn start_output(config: &AudioConfig, renderer: GraphRenderer) -> AudioResult<OutputHandle> {
    open_output(config)?.start(renderer)
}
