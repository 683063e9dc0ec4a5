//! Audio → main feedback: fault bits, counters and kernel events

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::NodeId;
use crate::dsp::KernelEvent;

/// Set of graph faults raised on the audio thread
///
/// A fault means a command was ignored or a queue overflowed. The audio
/// thread keeps running; the main thread reports the bits on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphFaults(pub u32);

impl GraphFaults {
    /// A command referenced a node slot that is empty (or already occupied
    /// for a create)
    pub const UNKNOWN_NODE: u32 = 1 << 0;
    /// A connection command referenced an empty or occupied connection slot
    pub const BAD_CONNECTION: u32 = 1 << 1;
    /// Port index out of range or channel counts disagree
    pub const PORT_MISMATCH: u32 = 1 << 2;
    /// Topology contains a cycle; the closing edge is ignored
    pub const CYCLE: u32 = 1 << 3;
    /// Event queue full; events were lost
    pub const EVENT_OVERFLOW: u32 = 1 << 4;
    /// Retire queue full; memory was freed on the audio thread
    pub const RETIRE_OVERFLOW: u32 = 1 << 5;
    /// Parameter or provider index out of range for the kernel
    pub const BAD_KEY: u32 = 1 << 6;

    const NAMES: [(u32, &'static str); 7] = [
        (Self::UNKNOWN_NODE, "unknown node"),
        (Self::BAD_CONNECTION, "bad connection"),
        (Self::PORT_MISMATCH, "port mismatch"),
        (Self::CYCLE, "cycle"),
        (Self::EVENT_OVERFLOW, "event overflow"),
        (Self::RETIRE_OVERFLOW, "retire overflow"),
        (Self::BAD_KEY, "bad parameter key"),
    ];

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

impl std::fmt::Display for GraphFaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Lock-free graph state shared between the renderer and the main thread
#[derive(Debug, Default)]
pub struct GraphAtomics {
    /// Accumulated [`GraphFaults`] bits since the last `take_faults`
    pub faults: AtomicU32,
    /// Buffers delivered to the driver (or offline sink)
    pub buffers_rendered: AtomicU64,
    /// Frames delivered to the driver (or offline sink)
    pub frames_rendered: AtomicU64,
}

impl GraphAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a fault bit (audio thread)
    #[inline]
    pub fn raise(&self, bit: u32) {
        self.faults.fetch_or(bit, Ordering::Relaxed);
    }

    /// Read and clear all fault bits (main thread)
    #[inline]
    pub fn take_faults(&self) -> GraphFaults {
        GraphFaults(self.faults.swap(0, Ordering::Relaxed))
    }

    #[inline]
    pub fn buffers_rendered(&self) -> u64 {
        self.buffers_rendered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

/// Kernel event tagged with the node that posted it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEvent {
    pub node: NodeId,
    pub event: KernelEvent,
}
