//! Configuration for the murmur engine
//!
//! - Generic YAML config loading/saving
//! - Engine construction settings
//! - Host-tunable parameter sets with range clamping
//!
//! # Usage
//!
//! ```ignore
//! use murmur_core::config::{load_config, default_config_path, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! ```

mod engine;
mod io;
mod params;
mod paths;

pub use engine::{EngineConfig, DEFAULT_BUFFER_FRAMES, MAX_BUFFER_FRAMES};
pub use io::{load_config, save_config};
pub use params::{MasterParams, MoveByParams, SpatialParams, MOVE_BY_POLE_MAX};
pub use paths::{default_config_dir, default_config_path};
