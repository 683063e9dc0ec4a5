//! Per-channel gain kernel

use std::any::Any;

use super::{AudioKernel, ExecuteContext, ParamKey};
use crate::types::StereoSample;

/// Gain parameters (linear)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainParam {
    VolLeft = 0,
    VolRight = 1,
}

impl ParamKey for GainParam {
    fn index(self) -> usize {
        self as usize
    }
}

/// Stereo gain: input port 0 → output port 0, interpolated per sample
#[derive(Debug, Clone, Copy, Default)]
pub struct GainKernel;

impl GainKernel {
    pub fn new() -> Self {
        Self
    }
}

impl AudioKernel for GainKernel {
    fn param_defaults(&self) -> &'static [f32] {
        &[1.0, 1.0]
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) {
        let frames = ctx.frames;
        let params = ctx.params;
        let input = ctx.inputs.first().and_then(|p| p.stereo(frames));
        let Some(out) = ctx.outputs.first_mut().and_then(|p| p.stereo_mut(frames)) else {
            return;
        };
        let Some(input) = input else {
            out.fill(StereoSample::silence());
            return;
        };

        for (i, (dst, src)) in out.iter_mut().zip(input.iter()).enumerate() {
            dst.left = src.left * params.get(GainParam::VolLeft, i);
            dst.right = src.right * params.get(GainParam::VolRight, i);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
