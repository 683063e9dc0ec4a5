//! Interpolated parameter values
//!
//! A [`Ramp`] holds the value at the start of the current buffer plus an
//! optional linear ramp toward a target. Kernel parameters and connection
//! attenuations are both ramps, so `get(key, i)` inside a kernel and the
//! per-sample gain applied when summing a connection follow the same curve.
//!
//! Ramps are advanced by the graph after every buffer. Setting a new target
//! always starts from the current value, so a ramp interrupted mid-way never
//! jumps.

use super::ParamKey;

/// Linear ramp toward a target value over a fixed number of samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    /// Value at sample 0 of the current buffer
    value: f32,
    /// Value reached after `remaining` samples
    target: f32,
    /// Samples left until `target` is reached (0 = settled)
    remaining: u32,
}

impl Ramp {
    /// Settled ramp at `value`
    pub const fn new(value: f32) -> Self {
        Self {
            value,
            target: value,
            remaining: 0,
        }
    }

    /// Start ramping from the current value to `target` over `lerp_samples`
    ///
    /// `lerp_samples == 0` jumps immediately.
    pub fn set(&mut self, target: f32, lerp_samples: u32) {
        if lerp_samples == 0 {
            self.value = target;
            self.target = target;
            self.remaining = 0;
        } else {
            self.target = target;
            self.remaining = lerp_samples;
        }
    }

    /// Interpolated value at sample `i` of the current buffer
    ///
    /// Sample `i` sees `(i + 1) / remaining` of the way to the target, so the
    /// target is reached exactly on the last sample of the ramp.
    #[inline]
    pub fn at(&self, i: usize) -> f32 {
        if self.remaining == 0 {
            return self.value;
        }
        let step = (i as u64 + 1).min(self.remaining as u64) as f32;
        self.value + (self.target - self.value) * (step / self.remaining as f32)
    }

    /// Move the start of the ramp forward by one buffer of `frames`
    pub fn advance(&mut self, frames: usize) {
        if self.remaining == 0 || frames == 0 {
            return;
        }
        if frames as u64 >= self.remaining as u64 {
            self.value = self.target;
            self.remaining = 0;
        } else {
            self.value = self.at(frames - 1);
            self.remaining -= frames as u32;
        }
    }

    /// Value at the start of the current buffer
    #[inline]
    pub fn current(&self) -> f32 {
        self.value
    }

    /// Value the ramp is heading to
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the ramp has reached its target
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Enum-keyed table of interpolated kernel parameters
///
/// Sized once when the node is built; never grows on the audio thread.
#[derive(Debug, Clone, Default)]
pub struct ParamTable {
    slots: Vec<Ramp>,
}

impl ParamTable {
    /// Table initialised from a kernel's declared defaults
    pub fn from_defaults(defaults: &[f32]) -> Self {
        Self {
            slots: defaults.iter().copied().map(Ramp::new).collect(),
        }
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the kernel declared no parameters
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Interpolated value of `key` at sample `i`
    ///
    /// Unknown keys read as 0.0.
    #[inline]
    pub fn get<P: ParamKey>(&self, key: P, i: usize) -> f32 {
        self.slots.get(key.index()).map_or(0.0, |r| r.at(i))
    }

    /// Target value of `key` (what the last `set_float` asked for)
    pub fn target<P: ParamKey>(&self, key: P) -> f32 {
        self.slots.get(key.index()).map_or(0.0, |r| r.target())
    }

    /// Post a new end value; returns false when `index` is out of range
    pub fn set_index(&mut self, index: usize, value: f32, lerp_samples: u32) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.set(value, lerp_samples);
                true
            }
            None => false,
        }
    }

    /// Advance every ramp by one buffer
    pub fn advance(&mut self, frames: usize) {
        for slot in &mut self.slots {
            slot.advance(frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_lerp_is_instant() {
        let mut ramp = Ramp::new(0.0);
        ramp.set(1.0, 0);
        assert_eq!(ramp.at(0), 1.0);
        assert!(ramp.is_settled());
    }

    #[test]
    fn test_ramp_reaches_target_on_last_sample() {
        let mut ramp = Ramp::new(0.0);
        ramp.set(1.0, 4);
        let values: Vec<f32> = (0..6).map(|i| ramp.at(i)).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_ramp_continues_across_buffers() {
        let mut ramp = Ramp::new(0.0);
        ramp.set(1.0, 8);
        let first: Vec<f32> = (0..4).map(|i| ramp.at(i)).collect();
        ramp.advance(4);
        let second: Vec<f32> = (0..4).map(|i| ramp.at(i)).collect();
        let all: Vec<f32> = first.into_iter().chain(second).collect();
        for (i, v) in all.iter().enumerate() {
            let expected = (i + 1) as f32 / 8.0;
            assert!((v - expected).abs() < 1e-6, "sample {} = {}, expected {}", i, v, expected);
        }
        ramp.advance(4);
        assert!(ramp.is_settled());
        assert_eq!(ramp.current(), 1.0);
    }

    #[test]
    fn test_ramp_integrated_gain_matches_half_delta() {
        // Integrated gain above the start value over the ramp is Δ·n/2 within one sample
        let n = 1024u32;
        let delta = 0.8f32;
        let mut ramp = Ramp::new(0.2);
        ramp.set(0.2 + delta, n);
        let area: f64 = (0..n as usize).map(|i| (ramp.at(i) - 0.2) as f64).sum();
        let expected = (delta * n as f32 / 2.0) as f64;
        assert!(
            (area - expected).abs() <= delta as f64,
            "integrated gain {} vs {}",
            area,
            expected
        );
    }

    #[test]
    fn test_retarget_mid_ramp_starts_from_current() {
        let mut ramp = Ramp::new(0.0);
        ramp.set(1.0, 4);
        ramp.advance(2);
        assert!((ramp.current() - 0.5).abs() < 1e-6);
        ramp.set(0.0, 2);
        assert!((ramp.at(0) - 0.25).abs() < 1e-6);
        assert_eq!(ramp.at(1), 0.0);
    }

    #[derive(Clone, Copy)]
    enum TestParam {
        A,
        B,
    }

    impl ParamKey for TestParam {
        fn index(self) -> usize {
            self as usize
        }
    }

    #[test]
    fn test_param_table_defaults_and_set() {
        let mut table = ParamTable::from_defaults(&[1.0, 2.0]);
        assert_eq!(table.get(TestParam::A, 0), 1.0);
        assert_eq!(table.get(TestParam::B, 10), 2.0);
        assert!(table.set_index(1, 4.0, 2));
        assert_eq!(table.get(TestParam::B, 0), 3.0);
        assert_eq!(table.target(TestParam::B), 4.0);
        assert!(!table.set_index(5, 1.0, 0));
    }
}
