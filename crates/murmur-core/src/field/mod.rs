//! Spatial field mixer
//!
//! Thousands of emitters share a small bank of looping field voices. Each
//! frame every emitter computes its stereo contribution (pan, cone, distance,
//! low-pass share) and adds it to the voice it is bound to. The voice's
//! summed gains then drive the attenuation of its graph connections.
//!
//! ```text
//!   emitters ──par_chunks──▶ scratch[row][voice] ──integrate──▶ final_mix[voice]
//!                 │
//!                 └── d < 15 ──▶ move-by candidates
//! ```
//!
//! The emitters are split into one contiguous partition per scratch row
//! (one row per pool thread) and partition `r` writes only row `r`, so the
//! parallel phase takes no locks and the integrated sum is independent of
//! emitter order up to float rounding.

mod definition;
mod mixer;
mod panning;

pub use definition::{frac, spatial_seed, DefinitionHandle, DefinitionTable, EmitterDefinition};
pub use mixer::{FieldMixer, MixFrame, MOVE_BY_RADIUS};
pub use panning::{
    cone_attenuation, distance_attenuation, lowpass_share, pan_gains, panning_additive, presence,
    VoiceMix,
};
