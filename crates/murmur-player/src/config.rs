//! Player configuration for murmur-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/murmur/player.yaml

use std::path::PathBuf;

use murmur_core::audio::AudioConfig;
use murmur_core::config::default_config_dir;
use murmur_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine construction settings and initial parameters
    pub engine: EngineConfig,
    /// Output device preferences
    pub audio: AudioConfig,
    /// Demo scene
    pub scene: SceneConfig,
}

/// Demo scene section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// WAV files used as field voices (empty = synthesized tones)
    pub field_clips: Vec<PathBuf>,
    /// WAV file for the high-intensity move-by pool
    pub high_move_clip: Option<PathBuf>,
    /// WAV file for the low-intensity move-by pool
    pub low_move_clip: Option<PathBuf>,
    /// Voices in each move-by pool
    pub move_voices: usize,
    /// Emitters orbiting the listener
    pub emitters: usize,
    /// Radius of the outermost orbit
    pub ring_radius: f32,
    /// Angular speed of the orbits (radians per second)
    pub orbit_speed: f32,
    /// Speed of the emitter that flies past the listener (units per second)
    pub flyby_speed: f32,
    /// Host frame rate used to tick the engine
    pub frame_rate: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            field_clips: Vec::new(),
            high_move_clip: None,
            low_move_clip: None,
            move_voices: 4,
            emitters: 256,
            ring_radius: 40.0,
            orbit_speed: 0.25,
            flyby_speed: 80.0,
            frame_rate: 60.0,
        }
    }
}

/// Get the default player config file path
///
/// Returns: `<config_dir>/murmur/player.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("player.yaml")
}
