//! DSP kernels
//!
//! Per-buffer sample math that runs on the audio thread. Every kernel follows
//! the same contract:
//!
//! - `init()` once, on the main thread, before the node is handed to the graph
//! - `execute(ctx)` once per audio buffer
//! - `dispose()` once, on the audio thread, when the node is released
//!
//! The [`ExecuteContext`] gives a kernel its interleaved input/output port
//! buffers, an enum-keyed [`ParamTable`] with per-sample interpolation, an
//! enum-keyed [`ProviderTable`] of clip readers, the sample rate, and a sink
//! for events destined to the main thread.
//!
//! # Real-Time Safety
//!
//! `execute` and `dispose` must not allocate, lock or log. Anything that
//! needs the heap happens in `init` or in the update kernels scheduled from
//! the main thread.

pub mod filter;
pub mod gain;
pub mod limiter;
pub mod params;
pub mod player;
pub mod provider;

use std::any::Any;

use crate::types::{Sample, StereoSample};

pub use filter::{FilterType, SvfCoefficients, SvfKernel, SvfParam};
pub use gain::{GainKernel, GainParam};
pub use limiter::{LimiterKernel, LimiterParam};
pub use params::{ParamTable, Ramp};
pub use player::{PlayerControl, PlayerKernel, PlayerParam, PlayerProvider, Resampler};
pub use provider::{ClipData, ClipReader, ProviderTable};

/// Typed key into a kernel's parameter table
pub trait ParamKey: Copy {
    fn index(self) -> usize;
}

/// Typed key into a kernel's provider table
pub trait ProviderKey: Copy {
    fn index(self) -> usize;
}

/// Events a kernel can post to the main thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEvent {
    /// The bound clip ran out of samples; posted once per playback run
    ClipStopped,
}

/// Destination for kernel events
pub trait EventSink {
    fn post(&mut self, event: KernelEvent);
}

impl EventSink for Vec<KernelEvent> {
    fn post(&mut self, event: KernelEvent) {
        self.push(event);
    }
}

/// Settings passed to `init`
#[derive(Debug, Clone, Copy)]
pub struct KernelInit {
    pub sample_rate: u32,
    pub max_frames: usize,
}

/// A unit of per-buffer DSP owned by a graph node
pub trait AudioKernel: Send + 'static {
    /// Default values of the parameter table, indexed by the kernel's key enum
    fn param_defaults(&self) -> &'static [f32] {
        &[]
    }

    /// Number of sample-provider slots the kernel reads from
    fn provider_slots(&self) -> usize {
        0
    }

    /// One-time setup on the main thread (may allocate)
    fn init(&mut self, _init: &KernelInit) {}

    /// Render one buffer
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>);

    /// Release state when the node is removed (audio thread, must not allocate)
    fn dispose(&mut self) {}

    /// Downcast hook for update kernels
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Deferred mutation of a kernel's state, run on the audio thread between
/// buffers with exclusive access to the kernel
pub trait KernelUpdate: Send + 'static {
    fn update(&mut self, kernel: &mut dyn AudioKernel);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Port buffers
// ═══════════════════════════════════════════════════════════════════════════════

/// Interleaved sample buffer behind one node port
///
/// Allocated at `channels × max_frames` when the port is created; only the
/// first `channels × frames` samples are meaningful in a given buffer.
#[derive(Debug, Clone, Default)]
pub struct PortBuffer {
    channels: usize,
    data: Vec<Sample>,
}

impl PortBuffer {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self {
            channels,
            data: vec![0.0; channels * max_frames],
        }
    }

    /// Channel count fixed at creation
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Largest buffer this port can hold, in frames
    #[inline]
    pub fn max_frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }

    /// Working samples for a buffer of `frames`
    #[inline]
    pub fn samples(&self, frames: usize) -> &[Sample] {
        let n = (frames * self.channels).min(self.data.len());
        &self.data[..n]
    }

    /// Mutable working samples for a buffer of `frames`
    #[inline]
    pub fn samples_mut(&mut self, frames: usize) -> &mut [Sample] {
        let n = (frames * self.channels).min(self.data.len());
        &mut self.data[..n]
    }

    /// Stereo view of the working samples; `None` unless the port is stereo
    #[inline]
    pub fn stereo(&self, frames: usize) -> Option<&[StereoSample]> {
        if self.channels != 2 {
            return None;
        }
        Some(bytemuck::cast_slice(self.samples(frames)))
    }

    /// Mutable stereo view of the working samples
    #[inline]
    pub fn stereo_mut(&mut self, frames: usize) -> Option<&mut [StereoSample]> {
        if self.channels != 2 {
            return None;
        }
        Some(bytemuck::cast_slice_mut(self.samples_mut(frames)))
    }

    /// Zero the working samples
    #[inline]
    pub fn clear(&mut self, frames: usize) {
        self.samples_mut(frames).fill(0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execute context
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a kernel may touch while rendering one buffer
///
/// Fields are public so a kernel can borrow its outputs mutably while
/// reading parameters and inputs.
pub struct ExecuteContext<'a> {
    /// Frames in this buffer
    pub frames: usize,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    pub inputs: &'a [PortBuffer],
    pub outputs: &'a mut [PortBuffer],
    pub params: &'a ParamTable,
    pub providers: &'a mut ProviderTable,
    pub events: &'a mut dyn EventSink,
}

impl ExecuteContext<'_> {
    /// Zero every output port
    pub fn silence_outputs(&mut self) {
        let frames = self.frames;
        for port in self.outputs.iter_mut() {
            port.clear(frames);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Drive a single kernel outside of a graph

    use super::*;

    pub struct KernelHarness {
        pub inputs: Vec<PortBuffer>,
        pub outputs: Vec<PortBuffer>,
        pub params: ParamTable,
        pub providers: ProviderTable,
        pub events: Vec<KernelEvent>,
        pub sample_rate: u32,
    }

    impl KernelHarness {
        /// Stereo ports, parameter defaults and provider slots taken from `kernel`
        pub fn new<K: AudioKernel>(kernel: &mut K, inputs: usize, outputs: usize, max_frames: usize) -> Self {
            let sample_rate = 48000;
            kernel.init(&KernelInit {
                sample_rate,
                max_frames,
            });
            Self {
                inputs: (0..inputs).map(|_| PortBuffer::new(2, max_frames)).collect(),
                outputs: (0..outputs).map(|_| PortBuffer::new(2, max_frames)).collect(),
                params: ParamTable::from_defaults(kernel.param_defaults()),
                providers: ProviderTable::with_slots(kernel.provider_slots()),
                events: Vec::new(),
                sample_rate,
            }
        }

        /// Fill input `port` with `f(frame)`
        pub fn fill_input(&mut self, port: usize, frames: usize, f: impl Fn(usize) -> StereoSample) {
            if let Some(view) = self.inputs[port].stereo_mut(frames) {
                for (i, s) in view.iter_mut().enumerate() {
                    *s = f(i);
                }
            }
        }

        /// Execute one buffer and advance parameter ramps
        pub fn run<K: AudioKernel>(&mut self, kernel: &mut K, frames: usize) {
            let mut ctx = ExecuteContext {
                frames,
                sample_rate: self.sample_rate,
                inputs: &self.inputs,
                outputs: &mut self.outputs,
                params: &self.params,
                providers: &mut self.providers,
                events: &mut self.events,
            };
            kernel.execute(&mut ctx);
            self.params.advance(frames);
        }

        /// Stereo view of output `port`
        pub fn output(&self, port: usize, frames: usize) -> &[StereoSample] {
            self.outputs[port].stereo(frames).unwrap_or(&[])
        }
    }
}
