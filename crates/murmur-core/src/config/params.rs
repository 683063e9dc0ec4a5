//! Tunable parameter sets exposed to the host
//!
//! Every set is serde-serializable (so it can live in the YAML engine config)
//! and carries a `clamped()` that forces each field into its recognised range.
//! Out-of-range values are never rejected, only clamped with a warning.

use serde::{Deserialize, Serialize};

/// Upper bound for `move_by_pole` (exclusive range `[0, 0.9)`)
pub const MOVE_BY_POLE_MAX: f32 = 0.899_999;

fn clamp_field(name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        log::warn!("{} is NaN, using {}", name, min);
        return min;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::warn!("{} = {} out of range [{}, {}], clamped to {}", name, value, min, max, clamped);
    }
    clamped
}

// ═══════════════════════════════════════════════════════════════════════════════
// Master
// ═══════════════════════════════════════════════════════════════════════════════

/// Master chain parameters (master volume and limiter)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterParams {
    /// Linear master volume applied before the limiter, `[0, 5]`
    pub master_volume: f32,
    /// Limiter input gain in dB, `[-60, 20]`
    pub pre_gain_db: f32,
    /// Limiter ceiling in dBFS, `[-60, 0]`
    pub threshold_db: f32,
    /// Limiter envelope release in milliseconds, `[0, 1000]`
    pub release_ms: f32,
}

impl Default for MasterParams {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            pre_gain_db: 1.0,
            threshold_db: -1.5,
            release_ms: 50.0,
        }
    }
}

impl MasterParams {
    pub fn clamped(self) -> Self {
        Self {
            master_volume: clamp_field("master_volume", self.master_volume, 0.0, 5.0),
            pre_gain_db: clamp_field("pre_gain_db", self.pre_gain_db, -60.0, 20.0),
            threshold_db: clamp_field("threshold_db", self.threshold_db, -60.0, 0.0),
            release_ms: clamp_field("release_ms", self.release_ms, 0.0, 1000.0),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Spatial
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-emitter tracking and field fold parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialParams {
    /// Per-second release pole for emitter presence, `[0, 0.9)`
    pub move_by_pole: f32,
    /// Exponent of the presence distance curve, `[0.5, 4]`
    pub falloff_curve: f32,
    /// Volume written into every field voice on fold, `[0, 3]`
    pub volume: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            move_by_pole: 0.5,
            falloff_curve: 2.1,
            volume: 1.0,
        }
    }
}

impl SpatialParams {
    pub fn clamped(self) -> Self {
        Self {
            move_by_pole: clamp_field("move_by_pole", self.move_by_pole, 0.0, MOVE_BY_POLE_MAX),
            falloff_curve: clamp_field("falloff_curve", self.falloff_curve, 0.5, 4.0),
            volume: clamp_field("spatial volume", self.volume, 0.0, 3.0),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Move-by
// ═══════════════════════════════════════════════════════════════════════════════

/// Move-by allocator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveByParams {
    /// Closing speed below which a candidate is discarded, `[0, 50]`
    pub min_speed: f32,
    /// Closing speed mapped to full intensity, `[50, 200]`
    pub max_speed: f32,
    /// Closing speed above which the high layer is used, `[40, 100]`
    pub fast_threshold: f32,
    /// Pitch multiplier for fast pass-bys, `[0.1, 1]`
    pub fast_pitch_mul: f32,
    /// Overall move-by volume, `[0, 1]`
    pub volume: f32,
    /// Layer gain for slow pass-bys, `[0, 1]`
    pub low_layer: f32,
    /// Layer gain for fast pass-bys, `[0, 1]`
    pub high_layer: f32,
}

impl Default for MoveByParams {
    fn default() -> Self {
        Self {
            min_speed: 10.0,
            max_speed: 120.0,
            fast_threshold: 60.0,
            fast_pitch_mul: 0.8,
            volume: 1.0,
            low_layer: 0.6,
            high_layer: 1.0,
        }
    }
}

impl MoveByParams {
    pub fn clamped(self) -> Self {
        Self {
            min_speed: clamp_field("min_speed", self.min_speed, 0.0, 50.0),
            max_speed: clamp_field("max_speed", self.max_speed, 50.0, 200.0),
            fast_threshold: clamp_field("fast_threshold", self.fast_threshold, 40.0, 100.0),
            fast_pitch_mul: clamp_field("fast_pitch_mul", self.fast_pitch_mul, 0.1, 1.0),
            volume: clamp_field("move-by volume", self.volume, 0.0, 1.0),
            low_layer: clamp_field("low_layer", self.low_layer, 0.0, 1.0),
            high_layer: clamp_field("high_layer", self.high_layer, 0.0, 1.0),
        }
    }
}
