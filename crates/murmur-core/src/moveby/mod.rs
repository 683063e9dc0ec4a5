//! Move-by voice allocator
//!
//! Emitters that rush past the listener get a one-shot "whoosh" on top of
//! their field contribution. Voices come from two bounded pools, split by
//! intensity:
//!
//! - **high**: closing speed above `fast_threshold`, pitched down by
//!   `fast_pitch_mul`, mixed at `high_layer`
//! - **low**: everything else above `min_speed`, mixed at `low_layer`
//!
//! A pool that runs dry borrows from the other one; when both are empty new
//! candidates are dropped until a voice times out. There is no stealing, so
//! at most `voice_count()` move-bys ever play at once.
//!
//! # Frame order
//!
//! ```text
//! select ─▶ setup ──▶ [spawns] ──────────────┐
//!                                            ▼
//! update_alive (timeouts, panning) ─▶ move-by barrier: apply_spawns
//! ```
//!
//! Every voice index is, between frames, either in exactly one free list or
//! held by exactly one active move-by.

mod allocator;

pub use allocator::{
    ActiveMoveBy, AliveStats, IntensityClass, MoveByAllocator, MoveBySpawn, MoveByVoice, SetupStats,
};
