//! Sample playback
//!
//! [`AssetStore`] holds every registered clip for the lifetime of the
//! context. [`SamplePlaybackRegistry`] maps logical sample entities to a
//! player node (plus an optional low-pass branch) wired into the master bus,
//! and reconciles requests against graph state once per frame.

mod assets;
mod registry;

pub use assets::AssetStore;
pub use registry::{PlaybackRequest, PlaybackState, SamplePlaybackRegistry, SyncStats};
