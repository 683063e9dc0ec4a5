//! DSP graph runtime
//!
//! The graph is split across two threads:
//!
//! - [`GraphHandle`] lives on the main thread. It allocates node and
//!   connection ids, validates mutations against a mirror of the topology and
//!   records them into [`CommandBlock`]s.
//! - [`GraphRenderer`] lives on the audio thread. It owns the nodes and
//!   connections, applies completed blocks between buffers, orders nodes
//!   from the root and executes their kernels.
//!
//! ```text
//!  main thread                          audio thread
//!  ───────────                          ────────────
//!  CommandBlock ── complete() ──▶ rtrb ──▶ apply between buffers
//!  GraphHandle::collect() ◀── rtrb ◀── retired nodes / batches
//!  GraphHandle::poll_event() ◀── rtrb ◀── kernel events
//!  GraphHandle::take_faults() ◀── GraphAtomics (fault bits)
//! ```
//!
//! Anything that owns heap memory crosses back to the main thread through
//! the retire queue and is dropped there, so the audio thread never frees.

mod atomics;
mod command;
mod handle;
mod node;
mod renderer;

pub use atomics::{GraphAtomics, GraphEvent, GraphFaults};
pub use command::{CommandBlock, GraphCommand};
pub use handle::GraphHandle;
pub use node::{Connection, Node};
pub use renderer::GraphRenderer;

use crate::config::EngineConfig;
use crate::dsp::KernelInit;

/// Maximum inputs or outputs on a single node
pub const MAX_PORTS: usize = 8;

/// The node whose input port 0 is delivered to the driver
pub const ROOT_NODE: NodeId = NodeId(0);

/// Slot index of a live graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Slot index of a live graph connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ConnectionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One end of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub node: NodeId,
    pub port: usize,
}

impl PortRef {
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

/// Create a connected handle/renderer pair sized from `config`
///
/// Both sides start with the root node: one stereo input, no outputs.
pub fn graph_channel(config: &EngineConfig) -> (GraphHandle, GraphRenderer) {
    let init = KernelInit {
        sample_rate: config.sample_rate,
        max_frames: config.effective_buffer_frames(),
    };
    let max_nodes = config.max_nodes.max(1);
    let max_connections = config.max_connections.max(1);

    let (command_tx, command_rx) = rtrb::RingBuffer::new(config.command_queue_capacity.max(1));
    let (event_tx, event_rx) = rtrb::RingBuffer::new(config.event_queue_capacity.max(1));
    // Worst case per buffer: every node released plus the batches that carried them
    let (retire_tx, retire_rx) =
        rtrb::RingBuffer::new(max_nodes + config.command_queue_capacity.max(1) * 2);
    let atomics = std::sync::Arc::new(GraphAtomics::new());

    let handle = GraphHandle::new(
        command_tx,
        retire_rx,
        event_rx,
        atomics.clone(),
        init,
        max_nodes,
        max_connections,
    );
    let renderer = GraphRenderer::new(
        command_rx,
        retire_tx,
        event_tx,
        atomics,
        init,
        max_nodes,
        max_connections,
    );
    (handle, renderer)
}
