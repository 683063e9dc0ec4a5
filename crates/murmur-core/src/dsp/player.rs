//! Clip player kernel with a linear-interpolating resampler
//!
//! The resampler keeps a window of `RESAMPLE_WINDOW` stereo frames. Slot 0
//! always holds the last frame of the previous window so interpolation across
//! a refill is seamless. `position` is a fractional frame index into the
//! window; it starts at the end so the first output frame forces a read.

use std::any::Any;

use super::provider::ClipReader;
use super::{AudioKernel, ExecuteContext, KernelEvent, KernelInit, KernelUpdate, ParamKey, ProviderKey};
use crate::types::{Sample, StereoSample};

/// Stereo frames held by the resampling window (one carried + 1024 fresh)
pub const RESAMPLE_WINDOW: usize = 1025;

/// Player parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerParam {
    /// Input frames consumed per output frame
    Rate = 0,
}

impl ParamKey for PlayerParam {
    fn index(self) -> usize {
        self as usize
    }
}

/// Player sample providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerProvider {
    Clip = 0,
}

impl ProviderKey for PlayerProvider {
    fn index(self) -> usize {
        self as usize
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resampler
// ═══════════════════════════════════════════════════════════════════════════════

/// Linear-interpolating variable-rate resampler
#[derive(Debug, Clone)]
pub struct Resampler {
    position: f64,
    /// Interleaved stereo window, `RESAMPLE_WINDOW` frames
    window: Vec<Sample>,
    /// Last window slot holding clip audio once the reader came up short
    exhausted_at: Option<usize>,
}

const SPAN: f64 = (RESAMPLE_WINDOW - 1) as f64;

impl Resampler {
    pub fn new() -> Self {
        Self {
            position: SPAN,
            window: vec![0.0; RESAMPLE_WINDOW * 2],
            exhausted_at: None,
        }
    }

    /// Forget buffered audio and force a read on the next frame
    pub fn reset(&mut self) {
        self.position = SPAN;
        self.window.fill(0.0);
        self.exhausted_at = None;
    }

    /// Fractional read position inside the window
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Render `out.len()` frames, pulling from `reader` as the window drains
    ///
    /// `rate(i)` is the resampling factor for output frame `i`. Returns true
    /// once playback has moved past the last frame the reader delivered; the
    /// rest of `out` is silenced.
    pub fn process(
        &mut self,
        out: &mut [StereoSample],
        rate: impl Fn(usize) -> f32,
        reader: &mut ClipReader,
    ) -> bool {
        for i in 0..out.len() {
            self.position += rate(i).max(0.0) as f64;

            while self.position >= SPAN {
                let last = (RESAMPLE_WINDOW - 1) * 2;
                self.window[0] = self.window[last];
                self.window[1] = self.window[last + 1];
                let read = fill_window(&mut self.window[2..], reader);
                if read < RESAMPLE_WINDOW - 1 && self.exhausted_at.is_none() {
                    self.exhausted_at = Some(read);
                }
                self.position -= SPAN;
            }

            if let Some(end) = self.exhausted_at {
                if self.position > end as f64 {
                    out[i..].fill(StereoSample::silence());
                    return true;
                }
            }

            let index = self.position.floor();
            let frac = (self.position - index) as f32;
            let a = index as usize * 2;
            let (l0, r0) = (self.window[a], self.window[a + 1]);
            let (l1, r1) = (self.window[a + 2], self.window[a + 3]);
            out[i] = StereoSample::new(l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac);
        }

        false
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Read up to `dst.len() / 2` stereo frames, duplicating mono and
/// zero-filling a short read. Returns the frames read.
fn fill_window(dst: &mut [Sample], reader: &mut ClipReader) -> usize {
    let frames = dst.len() / 2;
    let read = if reader.channels() == 1 {
        let n = reader.read(&mut dst[..frames], frames);
        // Expand in place from the back so unread mono samples are never clobbered
        for i in (0..n).rev() {
            let v = dst[i];
            dst[2 * i + 1] = v;
            dst[2 * i] = v;
        }
        n
    } else {
        reader.read(dst, frames)
    };
    dst[read * 2..].fill(0.0);
    read
}

// ═══════════════════════════════════════════════════════════════════════════════
// Player kernel
// ═══════════════════════════════════════════════════════════════════════════════

/// Plays the clip bound to [`PlayerProvider::Clip`] at [`PlayerParam::Rate`]
///
/// Output port 0 (stereo). A new player is idle until a
/// [`PlayerControl::Start`] update runs.
pub struct PlayerKernel {
    resampler: Resampler,
    playing: bool,
    stop_posted: bool,
}

impl PlayerKernel {
    pub fn new() -> Self {
        Self {
            resampler: Resampler::new(),
            playing: false,
            stop_posted: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl Default for PlayerKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioKernel for PlayerKernel {
    fn param_defaults(&self) -> &'static [f32] {
        &[1.0]
    }

    fn provider_slots(&self) -> usize {
        1
    }

    fn init(&mut self, _init: &KernelInit) {
        self.resampler.reset();
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) {
        let frames = ctx.frames;
        let Some(out) = ctx.outputs.first_mut().and_then(|p| p.stereo_mut(frames)) else {
            return;
        };

        if !self.playing {
            out.fill(StereoSample::silence());
            return;
        }
        let Some(reader) = ctx.providers.get_mut(PlayerProvider::Clip) else {
            out.fill(StereoSample::silence());
            return;
        };

        let params = ctx.params;
        let ran_dry = self
            .resampler
            .process(out, |i| params.get(PlayerParam::Rate, i), reader);

        if ran_dry {
            if !self.stop_posted {
                ctx.events.post(KernelEvent::ClipStopped);
                self.stop_posted = true;
            }
            self.playing = false;
        }
    }

    fn dispose(&mut self) {
        self.playing = false;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Update kernels that start and stop a [`PlayerKernel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    /// Begin a new playback run from the bound provider's current position
    Start,
    /// Go silent; the node stays allocated
    Stop,
}

impl KernelUpdate for PlayerControl {
    fn update(&mut self, kernel: &mut dyn AudioKernel) {
        let Some(player) = kernel.as_any_mut().downcast_mut::<PlayerKernel>() else {
            return;
        };
        match self {
            PlayerControl::Start => {
                player.resampler.reset();
                player.playing = true;
                player.stop_posted = false;
            }
            PlayerControl::Stop => {
                player.playing = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::provider::ClipData;
    use crate::dsp::testing::KernelHarness;
    use std::sync::Arc;

    fn counting_clip(frames: usize, channels: u16) -> Arc<ClipData> {
        let samples = (0..frames * channels as usize)
            .map(|i| (i / channels as usize) as f32)
            .collect();
        Arc::new(ClipData::from_interleaved(samples, channels, 48000).unwrap())
    }

    fn started_player(clip: Arc<ClipData>, looping: bool) -> (PlayerKernel, KernelHarness) {
        let mut player = PlayerKernel::new();
        let mut harness = KernelHarness::new(&mut player, 0, 1, 512);
        harness
            .providers
            .replace(PlayerProvider::Clip.index(), Some(ClipReader::new(clip, looping)))
            .unwrap();
        PlayerControl::Start.update(&mut player);
        (player, harness)
    }

    #[test]
    fn test_idle_player_is_silent() {
        let mut player = PlayerKernel::new();
        let mut harness = KernelHarness::new(&mut player, 0, 1, 64);
        harness.run(&mut player, 64);
        assert!(harness.output(0, 64).iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_unity_rate_reproduces_clip() {
        let (mut player, mut harness) = started_player(counting_clip(4000, 2), false);
        harness.run(&mut player, 256);
        let out = harness.output(0, 256);
        // First frame lands on window slot 1 (slot 0 is the carried frame)
        for (i, s) in out.iter().enumerate() {
            assert!((s.left - i as f32).abs() < 1e-4, "frame {}: {}", i, s.left);
            assert_eq!(s.left, s.right);
        }
    }

    #[test]
    fn test_half_rate_interpolates() {
        let (mut player, mut harness) = started_player(counting_clip(4000, 1), false);
        harness.params.set_index(PlayerParam::Rate.index(), 0.5, 0);
        harness.run(&mut player, 8);
        let out = harness.output(0, 8);
        let lefts: Vec<f32> = out.iter().map(|s| s.left).collect();
        // Slot 0 carries silence into the first window
        let expected = [0.0, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
        for (got, want) in lefts.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-4, "{:?}", lefts);
        }
    }

    #[test]
    fn test_mono_clip_is_duplicated() {
        let (mut player, mut harness) = started_player(counting_clip(2000, 1), false);
        harness.run(&mut player, 32);
        for s in harness.output(0, 32) {
            assert_eq!(s.left, s.right);
        }
    }

    #[test]
    fn test_window_refill_is_continuous() {
        let (mut player, mut harness) = started_player(counting_clip(8000, 2), false);
        let mut previous = -1.0f32;
        for _ in 0..8 {
            harness.run(&mut player, 512);
            for s in harness.output(0, 512) {
                assert!((s.left - previous - 1.0).abs() < 1e-3, "jump {} -> {}", previous, s.left);
                previous = s.left;
            }
        }
    }

    #[test]
    fn test_short_clip_plays_to_the_end() {
        let (mut player, mut harness) = started_player(counting_clip(100, 2), false);
        harness.run(&mut player, 256);
        let out = harness.output(0, 256);
        assert!((out[99].left - 99.0).abs() < 1e-4);
        assert!(out[100..].iter().all(|s| s.peak() == 0.0));
        assert_eq!(harness.events, vec![KernelEvent::ClipStopped]);
    }

    #[test]
    fn test_underrun_posts_clip_stopped_once() {
        let (mut player, mut harness) = started_player(counting_clip(100, 2), false);
        for _ in 0..4 {
            harness.run(&mut player, 256);
        }
        assert_eq!(harness.events, vec![KernelEvent::ClipStopped]);
        assert!(!player.is_playing());
        assert!(harness.output(0, 256).iter().all(|s| s.peak() == 0.0));
    }

    #[test]
    fn test_restart_allows_another_stop_event() {
        let (mut player, mut harness) = started_player(counting_clip(100, 2), false);
        harness.run(&mut player, 256);
        harness
            .providers
            .replace(PlayerProvider::Clip.index(), Some(ClipReader::new(counting_clip(100, 2), false)))
            .unwrap();
        PlayerControl::Start.update(&mut player);
        harness.run(&mut player, 256);
        assert_eq!(harness.events.len(), 2);
    }

    #[test]
    fn test_looping_clip_never_stops() {
        let (mut player, mut harness) = started_player(counting_clip(100, 2), true);
        for _ in 0..10 {
            harness.run(&mut player, 512);
        }
        assert!(harness.events.is_empty());
        assert!(player.is_playing());
    }

    #[test]
    fn test_stop_silences() {
        let (mut player, mut harness) = started_player(counting_clip(4000, 2), true);
        harness.run(&mut player, 64);
        PlayerControl::Stop.update(&mut player);
        harness.run(&mut player, 64);
        assert!(harness.output(0, 64).iter().all(|s| s.peak() == 0.0));
    }
}
