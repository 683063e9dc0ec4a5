//! Shared value types
//!
//! Stable integer ids the host uses to address clips, emitters, definitions
//! and playback entities; listener and player poses; stereo frames.

use glam::{Mat4, Vec3};

/// Engine rate when neither config nor device asks for another (Hz)
pub const SAMPLE_RATE: u32 = 48000;

/// 32-bit float; graph ports hold them interleaved
pub type Sample = f32;

// ═══════════════════════════════════════════════════════════════════════════════
// Stable ids
// ═══════════════════════════════════════════════════════════════════════════════

/// Registered clip in the append-only asset store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u32);

/// Host-owned emitter entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub u32);

/// Emitter definition (shared, immutable parameters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(pub u32);

/// Logical sample entity owned by the playback registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u32);

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "definition#{}", self.0)
    }
}

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "playback#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Poses
// ═══════════════════════════════════════════════════════════════════════════════

/// World pose of the listener or the player
///
/// `world_to_local` maps world positions into the pose's local frame where
/// +x is right and +z is forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub world_to_local: Mat4,
}

impl Pose {
    /// Pose at `position` looking down +z with +x to the right
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            world_to_local: Mat4::from_translation(-position),
        }
    }

    /// Pose from a local-to-world transform (what scene graphs usually store)
    pub fn from_local_to_world(local_to_world: Mat4) -> Self {
        Self {
            position: local_to_world.w_axis.truncate(),
            world_to_local: local_to_world.inverse(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stereo samples and buffers
// ═══════════════════════════════════════════════════════════════════════════════

/// One stereo frame, laid out `[left, right]`
///
/// `Pod` so port buffers and device buffers can be viewed as frames or as
/// interleaved samples without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Larger of the two magnitudes
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

/// Rendered output frames
///
/// Offline renders and tests hand one of these to
/// [`GraphRenderer::render`](crate::graph::GraphRenderer::render); its length
/// decides how many frames are produced.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    frames: Vec<StereoSample>,
}

impl StereoBuffer {
    /// `len` frames of silence
    pub fn silence(len: usize) -> Self {
        Self {
            frames: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.frames
    }

    /// Interleaved view `[L, R, L, R, ...]`, ready for a WAV writer
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.frames)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.frames.iter()
    }

    /// Largest magnitude on either channel
    pub fn peak(&self) -> Sample {
        self.frames.iter().map(StereoSample::peak).fold(0.0, Sample::max)
    }

    /// Per-channel RMS as (left, right); accumulated in f64
    pub fn rms(&self) -> (Sample, Sample) {
        if self.frames.is_empty() {
            return (0.0, 0.0);
        }
        let mut energy = (0.0f64, 0.0f64);
        for s in &self.frames {
            energy.0 += f64::from(s.left).powi(2);
            energy.1 += f64::from(s.right).powi(2);
        }
        let n = self.frames.len() as f64;
        ((energy.0 / n).sqrt() as Sample, (energy.1 / n).sqrt() as Sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_view_matches_layout() {
        let mut buf = StereoBuffer::silence(2);
        buf.as_mut_slice()[0] = StereoSample::new(0.1, 0.2);
        buf.as_mut_slice()[1] = StereoSample::new(0.3, -0.4);
        assert_eq!(buf.as_interleaved(), &[0.1, 0.2, 0.3, -0.4]);
        assert_eq!(buf.peak(), 0.4);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let mut buf = StereoBuffer::silence(64);
        for s in buf.as_mut_slice() {
            *s = StereoSample::new(0.5, -0.25);
        }
        let (l, r) = buf.rms();
        assert!((l - 0.5).abs() < 1e-6, "left rms {}", l);
        assert!((r - 0.25).abs() < 1e-6, "right rms {}", r);
    }

    #[test]
    fn test_pose_at_maps_world_to_local() {
        let pose = Pose::at(Vec3::new(1.0, 2.0, 3.0));
        let local = pose.world_to_local.transform_point3(Vec3::new(2.0, 2.0, 3.0));
        assert!((local - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6);
    }
}
