//! Panning law
//!
//! An emitter's contribution to its voice is the product of four factors:
//!
//! - **pan**: half-cosine law on the azimuth in the listener's local frame
//! - **cone**: 1 inside the cone, smoothstep to 0 across the transition
//! - **distance**: inverse square between min and max distance, then a
//!   linear fade to silence at twice the max distance
//! - **low-pass share**: how much of the gain goes through the voice's
//!   low-pass branch instead of the direct path (0 at min, 1 at max)

use glam::Vec3;

use super::definition::EmitterDefinition;
use crate::types::Pose;

/// Distance under which presence is at its maximum
const PRESENCE_KNEE: f32 = 3.0;

/// Gains one emitter (or a sum of emitters) adds to a field voice
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceMix {
    pub direct_left: f32,
    pub direct_right: f32,
    pub lpf_left: f32,
    pub lpf_right: f32,
}

impl VoiceMix {
    pub const ZERO: Self = Self {
        direct_left: 0.0,
        direct_right: 0.0,
        lpf_left: 0.0,
        lpf_right: 0.0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Sum of all four gains
    pub fn total(&self) -> f32 {
        self.direct_left + self.direct_right + self.lpf_left + self.lpf_right
    }
}

impl std::ops::AddAssign for VoiceMix {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.direct_left += other.direct_left;
        self.direct_right += other.direct_right;
        self.lpf_left += other.lpf_left;
        self.lpf_right += other.lpf_right;
    }
}

/// (left, right) pan pair for a position in the listener's local frame
///
/// +x is right, +z is forward. Positions on the listener's vertical axis
/// pan to the centre.
#[inline]
pub fn pan_gains(local: Vec3) -> (f32, f32) {
    if local.x.abs() < f32::EPSILON && local.z.abs() < f32::EPSILON {
        return (0.5, 0.5);
    }
    let angle = std::f32::consts::PI - local.z.atan2(local.x);
    let cosine = angle.cos();
    (0.5 + 0.5 * cosine, 0.5 - 0.5 * cosine)
}

/// Gain from the emitter's cone given the direction toward the listener
pub fn cone_attenuation(cone_direction: Vec3, to_listener: Vec3, cone_angle: f32, transition: f32) -> f32 {
    if cone_angle >= 360.0 {
        return 1.0;
    }
    let (Some(axis), Some(toward)) = (cone_direction.try_normalize(), to_listener.try_normalize()) else {
        return 1.0;
    };
    let off_axis = axis.dot(toward).clamp(-1.0, 1.0).acos().to_degrees();
    let half = cone_angle * 0.5;
    if off_axis <= half {
        return 1.0;
    }
    if transition <= 0.0 {
        return 0.0;
    }
    let t = (1.0 - (off_axis - half) / transition).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Inverse-square attenuation bounded by `[min, max]`, fading to zero
/// between `max` and `2·max`
#[inline]
pub fn distance_attenuation(distance: f32, min: f32, max: f32) -> f32 {
    let ratio = min / distance.clamp(min, max);
    let mut gain = ratio * ratio;
    if distance > max {
        gain *= ((2.0 * max - distance) / max).clamp(0.0, 1.0);
    }
    gain
}

/// Fraction of the gain routed through the low-pass branch
#[inline]
pub fn lowpass_share(distance: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return if distance > min { 1.0 } else { 0.0 };
    }
    ((distance - min) / (max - min)).clamp(0.0, 1.0)
}

/// Target presence for an emitter at `distance`
#[inline]
pub fn presence(distance: f32, falloff: f32) -> f32 {
    if distance < PRESENCE_KNEE {
        return 1.0;
    }
    1.0 / (0.4 + (distance - PRESENCE_KNEE).powf(falloff)) / falloff
}

/// Full contribution of one emitter to its field voice
pub fn panning_additive(
    listener: &Pose,
    position: Vec3,
    cone_direction: Vec3,
    definition: &EmitterDefinition,
    distance: f32,
) -> VoiceMix {
    let local = listener.world_to_local.transform_point3(position);
    let (left, right) = pan_gains(local);
    let cone = cone_attenuation(
        cone_direction,
        listener.position - position,
        definition.cone_angle,
        definition.cone_transition,
    );
    let gain = definition.volume
        * cone
        * distance_attenuation(distance, definition.min_distance, definition.max_distance);
    let lpf = lowpass_share(distance, definition.min_distance, definition.max_distance);
    let direct = gain * (1.0 - lpf);
    let filtered = gain * lpf;

    VoiceMix {
        direct_left: direct * left,
        direct_right: direct * right,
        lpf_left: filtered * left,
        lpf_right: filtered * right,
    }
}
