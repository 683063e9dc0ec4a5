//! Audio master and frame scheduler
//!
//! - [`MasterChain`]: master gain (enable fade) → master volume → limiter → root
//! - [`FrameScheduler`]: the per-frame job DAG over the scene, mixer,
//!   move-by allocator and playback registry
//! - [`AudioContext`]: the host API tying everything together

mod chain;
mod context;
mod scheduler;

pub use chain::MasterChain;
pub use context::AudioContext;
pub use scheduler::{FrameInputs, FrameScheduler, FrameStats};
