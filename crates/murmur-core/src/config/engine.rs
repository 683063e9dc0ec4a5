//! Engine construction settings

use serde::{Deserialize, Serialize};

use super::params::{MasterParams, MoveByParams, SpatialParams};
use crate::types::SAMPLE_RATE;

/// Maximum buffer size to pre-allocate in the graph (frames)
pub const MAX_BUFFER_FRAMES: usize = 8192;

/// Default DSP buffer size (frames)
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

/// Settings fixed for the lifetime of an [`AudioContext`](crate::AudioContext)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz (replaced by the negotiated device rate)
    pub sample_rate: u32,
    /// DSP buffer length in frames; also the attenuation ramp length
    pub buffer_frames: usize,
    /// Worker threads for the per-frame job DAG (0 = number of CPUs)
    pub worker_threads: usize,
    /// Capacity of the graph node table
    pub max_nodes: usize,
    /// Capacity of the graph connection table
    pub max_connections: usize,
    /// Command blocks that may be in flight to the audio thread
    pub command_queue_capacity: usize,
    /// Kernel events and retired objects the audio thread may queue per tick
    pub event_queue_capacity: usize,
    /// Master fade duration applied by `enable`
    pub enable_fade_ms: f32,
    /// Seed for move-by voice pool pops
    pub rng_seed: u64,
    pub master: MasterParams,
    pub spatial: SpatialParams,
    pub move_by: MoveByParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            worker_threads: 0,
            max_nodes: 4096,
            max_connections: 8192,
            command_queue_capacity: 256,
            event_queue_capacity: 4096,
            enable_fade_ms: 5000.0,
            rng_seed: 0x6d75_726d_7572,
            master: MasterParams::default(),
            spatial: SpatialParams::default(),
            move_by: MoveByParams::default(),
        }
    }
}

impl EngineConfig {
    /// Buffer length clamped to what the graph pre-allocates
    pub fn effective_buffer_frames(&self) -> usize {
        self.buffer_frames.clamp(1, MAX_BUFFER_FRAMES)
    }

    /// Enable fade length in samples at the configured rate
    pub fn enable_fade_samples(&self) -> u32 {
        (self.enable_fade_ms.max(0.0) * 0.001 * self.sample_rate as f32).round() as u32
    }
}
