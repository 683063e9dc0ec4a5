//! Murmur Core - real-time spatial audio mixing engine
//!
//! Thousands of moving point emitters are mixed around a single listener
//! into a small bank of looping field voices, with one-shot "move-by" voices
//! layered on top for emitters that rush past. A lock-free DSP graph renders
//! the result through a master gain and a brick-wall limiter.
//!
//! # Layout
//!
//! - [`dsp`]: kernels (player/resampler, state-variable filter, gain, limiter)
//! - [`graph`]: command blocks, main-thread handle, audio-thread renderer
//! - [`playback`]: clip store and sample-playback registry
//! - [`field`]: emitter definitions, panning law, parallel field mixer
//! - [`moveby`]: move-by voice pools and lifetimes
//! - [`scene`]: emitter table and barrier command buffers
//! - [`master`]: master chain, frame scheduler, [`AudioContext`]
//! - [`audio`]: cpal output driver
//!
//! # Example
//!
//! ```ignore
//! use murmur_core::{AudioContext, EngineConfig, ClipData, Pose};
//!
//! let (mut ctx, mut renderer) = AudioContext::new(EngineConfig::default())?;
//! let tone = ctx.register_clip(ClipData::sine(220.0, 0.5, 2.0, 48000));
//! ctx.add_field_voice(tone)?;
//! ctx.set_listener(Some(Pose::default()));
//! ctx.set_player(Some(Pose::default()));
//! ctx.enable(true)?;
//! ctx.tick(1.0 / 60.0)?;
//! ```

pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod dsp;
pub mod error;
pub mod field;
pub mod graph;
pub mod master;
pub mod moveby;
pub mod playback;
pub mod scene;
pub mod types;

pub use config::EngineConfig;
pub use dsp::ClipData;
pub use error::{EngineError, EngineResult};
pub use field::EmitterDefinition;
pub use master::{AudioContext, FrameStats};
pub use scene::EmitterAttributes;
pub use types::*;
