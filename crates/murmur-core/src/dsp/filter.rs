//! State-variable biquad filter kernel
//!
//! Trapezoidal-integrated SVF (two poles, 12 dB/octave) with a mixing vector
//! that selects the response: lowpass, bandpass, highpass, notch, bell,
//! low shelf or high shelf. Coefficients are recomputed once per buffer from
//! the parameter values at sample 0.

use std::any::Any;
use std::f32::consts::PI;

use super::{AudioKernel, ExecuteContext, ParamKey};
use crate::types::StereoSample;

/// Filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvfParam {
    /// [`FilterType`] as a float index
    Type = 0,
    /// Cutoff / centre frequency in Hz
    Cutoff = 1,
    Q = 2,
    /// Boost or cut for bell and shelf responses
    GainDb = 3,
}

impl ParamKey for SvfParam {
    fn index(self) -> usize {
        self as usize
    }
}

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Lowpass = 0,
    Bandpass = 1,
    Highpass = 2,
    Notch = 3,
    Bell = 4,
    Lowshelf = 5,
    Highshelf = 6,
}

impl FilterType {
    /// Decode a `Type` parameter value; out-of-range values clamp to the
    /// nearest response
    pub fn from_param(value: f32) -> Self {
        match value.round().max(0.0) as u32 {
            0 => FilterType::Lowpass,
            1 => FilterType::Bandpass,
            2 => FilterType::Highpass,
            3 => FilterType::Notch,
            4 => FilterType::Bell,
            5 => FilterType::Lowshelf,
            _ => FilterType::Highshelf,
        }
    }

    /// Encode as a `Type` parameter value
    pub fn as_param(self) -> f32 {
        self as u32 as f32
    }
}

/// Integrator gains plus the output mixing vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvfCoefficients {
    pub a1: f32,
    pub a2: f32,
    pub a3: f32,
    /// Weight of the input
    pub m0: f32,
    /// Weight of the band output
    pub m1: f32,
    /// Weight of the low output
    pub m2: f32,
}

impl SvfCoefficients {
    /// Design a response; `normalized_cutoff` is cutoff / sample rate
    pub fn design(filter: FilterType, normalized_cutoff: f32, q: f32, gain_db: f32) -> Self {
        let fc = normalized_cutoff.clamp(1e-5, 0.499);
        let q = q.max(1e-3);
        let a = 10f32.powf(gain_db / 40.0);
        let tan = (PI * fc).tan();

        let (g, k, m0, m1, m2) = match filter {
            FilterType::Lowpass => (tan, 1.0 / q, 0.0, 0.0, 1.0),
            FilterType::Bandpass => (tan, 1.0 / q, 0.0, 1.0, 0.0),
            FilterType::Highpass => {
                let k = 1.0 / q;
                (tan, k, 1.0, -k, -1.0)
            }
            FilterType::Notch => {
                let k = 1.0 / q;
                (tan, k, 1.0, -k, 0.0)
            }
            FilterType::Bell => {
                let k = 1.0 / (q * a);
                (tan, k, 1.0, k * (a * a - 1.0), 0.0)
            }
            FilterType::Lowshelf => {
                let k = 1.0 / q;
                (tan / a.sqrt(), k, 1.0, k * (a - 1.0), a * a - 1.0)
            }
            FilterType::Highshelf => {
                let k = 1.0 / q;
                (tan / a.sqrt(), k, a * a, k * (1.0 - a) * a, 1.0 - a * a)
            }
        };

        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        Self { a1, a2, a3, m0, m1, m2 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    ic1eq: f32,
    ic2eq: f32,
}

impl ChannelState {
    #[inline]
    fn tick(&mut self, c: &SvfCoefficients, v0: f32) -> f32 {
        let v3 = v0 - self.ic2eq;
        let v1 = c.a1 * self.ic1eq + c.a2 * v3;
        let v2 = self.ic2eq + c.a2 * self.ic1eq + c.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        c.m0 * v0 + c.m1 * v1 + c.m2 * v2
    }
}

/// Stereo SVF: input port 0 → output port 0
#[derive(Debug, Clone, Default)]
pub struct SvfKernel {
    left: ChannelState,
    right: ChannelState,
}

impl SvfKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter defaults with a different response
    pub fn defaults_for(filter: FilterType) -> [f32; 4] {
        [filter.as_param(), 1500.0, 0.707, 0.0]
    }
}

impl AudioKernel for SvfKernel {
    fn param_defaults(&self) -> &'static [f32] {
        &[0.0, 1500.0, 0.707, 0.0]
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) {
        let frames = ctx.frames;
        let params = ctx.params;
        let coeffs = SvfCoefficients::design(
            FilterType::from_param(params.get(SvfParam::Type, 0)),
            params.get(SvfParam::Cutoff, 0) / ctx.sample_rate as f32,
            params.get(SvfParam::Q, 0),
            params.get(SvfParam::GainDb, 0),
        );

        let input = ctx.inputs.first().and_then(|p| p.stereo(frames));
        let Some(out) = ctx.outputs.first_mut().and_then(|p| p.stereo_mut(frames)) else {
            return;
        };
        let Some(input) = input else {
            out.fill(StereoSample::silence());
            return;
        };

        for (dst, src) in out.iter_mut().zip(input.iter()) {
            dst.left = self.left.tick(&coeffs, src.left);
            dst.right = self.right.tick(&coeffs, src.right);
        }
    }

    fn dispose(&mut self) {
        self.left = ChannelState::default();
        self.right = ChannelState::default();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
