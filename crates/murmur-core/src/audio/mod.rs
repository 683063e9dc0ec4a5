//! Audio output driver
//!
//! The engine renders into whatever device cpal negotiates. Opening the
//! device is split in two so the host learns the real sample rate before it
//! builds the [`AudioContext`](crate::AudioContext):
//!
//! ```ignore
//! use murmur_core::audio::{open_output, AudioConfig};
//!
//! let output = open_output(&AudioConfig::default())?;
//! let engine_config = EngineConfig { sample_rate: output.sample_rate(), ..config };
//! let (mut context, renderer) = AudioContext::new(engine_config)?;
//! let _handle = output.start(renderer)?;   // drop to stop audio
//! ```
//!
//! # Real-Time Safety
//!
//! The stream callback owns the [`GraphRenderer`](crate::graph::GraphRenderer)
//! outright. No lock is taken per buffer; everything the main thread wants to
//! change arrives through the graph's command queue.

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, MAX_BUFFER_SIZE};
pub use cpal_backend::{open_output, start_output, OutputHandle, PreparedOutput};
pub use device::{get_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
