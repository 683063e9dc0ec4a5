//! Brick-wall peak limiter kernel
//!
//! Squared-peak envelope follower. The envelope jumps up instantly when the
//! (pre-gained) peak crosses the threshold and decays by a release factor on
//! every sample below it. Gain is `threshold² / envelope` while the envelope
//! is above threshold; once the envelope releases below it the last reduction
//! is held until the next crossing.
//!
//! Parameters are read once per buffer at sample 0.

use std::any::Any;

use super::{AudioKernel, ExecuteContext, ParamKey};
use crate::types::StereoSample;

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterParam {
    PreGainDb = 0,
    ThresholdDb = 1,
    ReleaseMs = 2,
}

impl ParamKey for LimiterParam {
    fn index(self) -> usize {
        self as usize
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Stereo limiter: input port 0 → output port 0
#[derive(Debug, Clone)]
pub struct LimiterKernel {
    envelope: f32,
    gain: f32,
}

impl LimiterKernel {
    pub fn new() -> Self {
        Self {
            envelope: 0.0,
            gain: 1.0,
        }
    }

    /// Current gain reduction factor (1.0 = no reduction)
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for LimiterKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioKernel for LimiterKernel {
    fn param_defaults(&self) -> &'static [f32] {
        &[1.0, -1.5, 50.0]
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) {
        let frames = ctx.frames;
        let params = ctx.params;

        let pre_gain = db_to_linear(params.get(LimiterParam::PreGainDb, 0));
        let threshold = db_to_linear(params.get(LimiterParam::ThresholdDb, 0));
        let threshold_sq = threshold * threshold;
        // release_ms == 0 gives exp(-inf) = 0: the envelope drops immediately
        let decay = (-1.0 / (params.get(LimiterParam::ReleaseMs, 0) / 1000.0)).exp();

        let input = ctx.inputs.first().and_then(|p| p.stereo(frames));
        let Some(out) = ctx.outputs.first_mut().and_then(|p| p.stereo_mut(frames)) else {
            return;
        };
        let Some(input) = input else {
            out.fill(StereoSample::silence());
            return;
        };

        for (dst, src) in out.iter_mut().zip(input.iter()) {
            let peak = (src.left * src.left).max(src.right * src.right) * pre_gain;

            if peak > threshold_sq && peak > self.envelope {
                self.envelope = peak;
            }
            if self.envelope > threshold_sq {
                self.gain = threshold_sq / self.envelope;
            }
            if peak < threshold_sq {
                self.envelope *= decay;
            }

            let g = self.gain * pre_gain;
            dst.left = src.left * g;
            dst.right = src.right * g;
        }
    }

    fn dispose(&mut self) {
        self.envelope = 0.0;
        self.gain = 1.0;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::testing::KernelHarness;

    fn harness_with(kernel: &mut LimiterKernel, pre_gain_db: f32, threshold_db: f32) -> KernelHarness {
        let mut harness = KernelHarness::new(kernel, 1, 1, 512);
        harness.params.set_index(LimiterParam::PreGainDb.index(), pre_gain_db, 0);
        harness.params.set_index(LimiterParam::ThresholdDb.index(), threshold_db, 0);
        harness
    }

    #[test]
    fn test_quiet_signal_only_sees_pre_gain() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -1.5);
        harness.fill_input(0, 512, |_| StereoSample::new(0.1, -0.1));
        harness.run(&mut kernel, 512);
        for s in harness.output(0, 512) {
            assert!((s.left - 0.1).abs() < 1e-6);
            assert!((s.right + 0.1).abs() < 1e-6);
        }
        assert_eq!(kernel.gain(), 1.0);
    }

    #[test]
    fn test_hot_signal_stays_under_ceiling() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -1.5);
        let ceiling = db_to_linear(-1.5);
        harness.fill_input(0, 512, |_| StereoSample::new(4.95, 4.95));
        for _ in 0..4 {
            harness.run(&mut kernel, 512);
            for s in harness.output(0, 512) {
                assert!(s.peak() <= ceiling + 1e-6, "{} > {}", s.peak(), ceiling);
            }
        }
    }

    #[test]
    fn test_loudest_channel_drives_gain() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -6.0);
        harness.fill_input(0, 64, |_| StereoSample::new(0.0, 2.0));
        harness.run(&mut kernel, 64);
        assert!(kernel.gain() < 1.0);
        assert!(harness.output(0, 64).iter().all(|s| s.left == 0.0));
    }

    #[test]
    fn test_gain_holds_after_envelope_releases() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -1.5);
        harness.fill_input(0, 512, |i| {
            if i == 0 {
                StereoSample::new(3.0, 3.0)
            } else {
                StereoSample::new(0.1, 0.1)
            }
        });
        harness.run(&mut kernel, 512);

        let threshold_sq = db_to_linear(-1.5).powi(2);
        let held = threshold_sq / 9.0;
        assert!((kernel.gain() - held).abs() < 1e-6, "gain {}", kernel.gain());
        assert!(kernel.envelope < threshold_sq, "envelope {} never released", kernel.envelope);

        let out = harness.output(0, 512);
        assert!((out[0].left - 3.0 * held).abs() < 1e-5);
        assert!((out[511].left - 0.1 * held).abs() < 1e-6);
    }

    #[test]
    fn test_next_crossing_replaces_held_gain() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -1.5);
        harness.fill_input(0, 64, |i| if i == 0 { StereoSample::new(3.0, 3.0) } else { StereoSample::silence() });
        harness.run(&mut kernel, 64);
        harness.fill_input(0, 64, |i| if i == 0 { StereoSample::new(2.0, 2.0) } else { StereoSample::silence() });
        harness.run(&mut kernel, 64);

        let threshold_sq = db_to_linear(-1.5).powi(2);
        assert!((kernel.gain() - threshold_sq / 4.0).abs() < 1e-6, "gain {}", kernel.gain());
    }

    #[test]
    fn test_dispose_resets_state() {
        let mut kernel = LimiterKernel::new();
        let mut harness = harness_with(&mut kernel, 0.0, -1.5);
        harness.fill_input(0, 8, |_| StereoSample::new(5.0, 5.0));
        harness.run(&mut kernel, 8);
        kernel.dispose();
        assert_eq!(kernel.gain(), 1.0);
    }
}
