//! Graph nodes and connections

use std::any::Any;

use super::{PortRef, MAX_PORTS};
use crate::dsp::{
    AudioKernel, ExecuteContext, KernelInit, ParamTable, PortBuffer, ProviderTable, Ramp,
};

/// A kernel plus everything it needs to execute
///
/// Built and initialised on the main thread. Port vectors reserve
/// [`MAX_PORTS`] up front so adding a port on the audio thread never
/// reallocates.
pub struct Node {
    pub(crate) kernel: Box<dyn AudioKernel>,
    pub(crate) params: ParamTable,
    pub(crate) providers: ProviderTable,
    pub(crate) inputs: Vec<PortBuffer>,
    pub(crate) outputs: Vec<PortBuffer>,
}

impl Node {
    /// Box up `kernel`, size its tables and run `init`
    pub fn new(mut kernel: Box<dyn AudioKernel>, init: &KernelInit) -> Self {
        kernel.init(init);
        let params = ParamTable::from_defaults(kernel.param_defaults());
        let providers = ProviderTable::with_slots(kernel.provider_slots());
        Self {
            kernel,
            params,
            providers,
            inputs: Vec::with_capacity(MAX_PORTS),
            outputs: Vec::with_capacity(MAX_PORTS),
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    /// Run the kernel for one buffer
    pub(crate) fn execute(&mut self, frames: usize, sample_rate: u32, events: &mut dyn crate::dsp::EventSink) {
        let mut ctx = ExecuteContext {
            frames,
            sample_rate,
            inputs: &self.inputs,
            outputs: &mut self.outputs,
            params: &self.params,
            providers: &mut self.providers,
            events,
        };
        self.kernel.execute(&mut ctx);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("params", &self.params)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Directed edge from an output port to an input port with a stereo
/// attenuation ramp
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub src: PortRef,
    pub dst: PortRef,
    pub(crate) left: Ramp,
    pub(crate) right: Ramp,
}

impl Connection {
    pub fn new(src: PortRef, dst: PortRef, left: f32, right: f32) -> Self {
        Self {
            src,
            dst,
            left: Ramp::new(left),
            right: Ramp::new(right),
        }
    }

    /// Settled at unity on both channels
    #[inline]
    pub fn is_unity(&self) -> bool {
        self.left.is_settled()
            && self.right.is_settled()
            && self.left.current() == 1.0
            && self.right.current() == 1.0
    }

    /// Attenuation ramp for channel `channel` (even = left, odd = right)
    #[inline]
    pub(crate) fn ramp(&self, channel: usize) -> &Ramp {
        if channel % 2 == 0 {
            &self.left
        } else {
            &self.right
        }
    }

    /// Current (left, right) attenuation at the start of the buffer
    pub fn attenuation(&self) -> (f32, f32) {
        (self.left.current(), self.right.current())
    }
}

/// Kernel of the root node: its input port 0 is read by the renderer
#[derive(Debug, Default)]
pub(crate) struct RootKernel;

impl AudioKernel for RootKernel {
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) {
        ctx.silence_outputs();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
