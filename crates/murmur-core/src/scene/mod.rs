//! Scene tables
//!
//! The host owns emitter lifetimes and poses; the engine keeps a dense copy
//! of what it needs for mixing. Structural changes (new and removed
//! emitters) are queued by the API and applied once per frame, so the
//! parallel mix always sees a stable slice.

mod barrier;
mod emitters;

pub use barrier::BarrierBuffer;
pub use emitters::{Emitter, EmitterAttributes, EmitterTable, EmitterTracking, SceneCommand};
