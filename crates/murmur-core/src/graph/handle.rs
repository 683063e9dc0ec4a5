//! Main-thread side of the graph

use std::collections::VecDeque;
use std::sync::Arc;

use rtrb::{Consumer, Producer};

use super::command::{CommandBlock, GraphCommand};
use super::renderer::Retired;
use super::{ConnectionId, GraphAtomics, GraphEvent, GraphFaults, NodeId, PortRef, MAX_PORTS, ROOT_NODE};
use crate::dsp::KernelInit;
use crate::error::{EngineError, EngineResult};

/// Channel counts of a node's ports as the main thread believes them to be
#[derive(Debug, Clone, Default)]
struct NodeMirror {
    inputs: Vec<usize>,
    outputs: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionMirror {
    src: PortRef,
    dst: PortRef,
}

/// Main-thread handle to the graph
///
/// Keeps a mirror of the topology so that mutations can be validated and
/// ids allocated without a round trip to the audio thread. Id slots are
/// reused through free lists; since blocks are applied in order, a release
/// always lands before any create that reuses its slot.
pub struct GraphHandle {
    commands: Producer<Vec<GraphCommand>>,
    /// Blocks that did not fit in the queue, oldest first
    backlog: VecDeque<Vec<GraphCommand>>,
    retired: Consumer<Retired>,
    events: Consumer<GraphEvent>,
    atomics: Arc<GraphAtomics>,
    init: KernelInit,

    nodes: Vec<Option<NodeMirror>>,
    free_nodes: Vec<u32>,
    max_nodes: usize,

    connections: Vec<Option<ConnectionMirror>>,
    free_connections: Vec<u32>,
    max_connections: usize,
}

impl GraphHandle {
    pub(crate) fn new(
        commands: Producer<Vec<GraphCommand>>,
        retired: Consumer<Retired>,
        events: Consumer<GraphEvent>,
        atomics: Arc<GraphAtomics>,
        init: KernelInit,
        max_nodes: usize,
        max_connections: usize,
    ) -> Self {
        let root = NodeMirror {
            inputs: vec![2],
            outputs: Vec::new(),
        };
        Self {
            commands,
            backlog: VecDeque::new(),
            retired,
            events,
            atomics,
            init,
            nodes: vec![Some(root)],
            free_nodes: Vec::new(),
            max_nodes,
            connections: Vec::new(),
            free_connections: Vec::new(),
            max_connections,
        }
    }

    /// Open a new command block
    pub fn create_command_block(&mut self) -> CommandBlock<'_> {
        CommandBlock::new(self)
    }

    /// Sample rate and buffer size handed to kernel `init`
    pub fn kernel_init(&self) -> KernelInit {
        self.init
    }

    pub fn atomics(&self) -> &Arc<GraphAtomics> {
        &self.atomics
    }

    pub fn is_node_live(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    pub fn is_connection_live(&self, id: ConnectionId) -> bool {
        matches!(self.connections.get(id.index()), Some(Some(_)))
    }

    /// Live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_some()).count()
    }

    /// Blocks waiting for room in the command queue
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    // ─────────────────────────────────────────────────────────────
    // Feedback from the audio thread
    // ─────────────────────────────────────────────────────────────

    /// Drop everything the renderer has retired; returns how many objects
    /// were freed
    pub fn collect(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(retired) = self.retired.pop() {
            drop(retired);
            freed += 1;
        }
        self.flush();
        freed
    }

    /// Next kernel event, if any
    pub fn poll_event(&mut self) -> Option<GraphEvent> {
        self.events.pop().ok()
    }

    /// Read and clear fault bits raised since the last call
    pub fn take_faults(&self) -> GraphFaults {
        self.atomics.take_faults()
    }

    // ─────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn submit(&mut self, commands: Vec<GraphCommand>) {
        if commands.is_empty() {
            return;
        }
        self.backlog.push_back(commands);
        self.flush();
    }

    /// Push backlogged blocks while the queue has room
    pub fn flush(&mut self) {
        while let Some(block) = self.backlog.pop_front() {
            match self.commands.push(block) {
                Ok(()) => {}
                Err(rtrb::PushError::Full(block)) => {
                    self.backlog.push_front(block);
                    log::warn!(
                        "Graph command queue full, {} blocks held back",
                        self.backlog.len()
                    );
                    break;
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mirror bookkeeping (called by CommandBlock)
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn alloc_node(&mut self) -> EngineResult<NodeId> {
        let index = match self.free_nodes.pop() {
            Some(index) => index as usize,
            None if self.nodes.len() < self.max_nodes => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
            None => return Err(EngineError::CapacityExhausted("graph nodes")),
        };
        self.nodes[index] = Some(NodeMirror::default());
        Ok(NodeId(index as u32))
    }

    pub(crate) fn free_node(&mut self, id: NodeId) -> EngineResult<()> {
        if id == ROOT_NODE {
            return Err(EngineError::InvalidState("the root node cannot be released".into()));
        }
        self.check_node(id)?;
        for (index, slot) in self.connections.iter_mut().enumerate() {
            if let Some(conn) = slot {
                if conn.src.node == id || conn.dst.node == id {
                    *slot = None;
                    self.free_connections.push(index as u32);
                }
            }
        }
        self.nodes[id.index()] = None;
        self.free_nodes.push(id.0);
        Ok(())
    }

    pub(crate) fn mirror_add_port(&mut self, id: NodeId, channels: usize, input: bool) -> EngineResult<usize> {
        if channels == 0 {
            return Err(EngineError::Port("ports need at least one channel".into()));
        }
        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(|n| n.as_mut())
            .ok_or(EngineError::UnknownNode(id))?;
        let ports = if input { &mut node.inputs } else { &mut node.outputs };
        if ports.len() >= MAX_PORTS {
            return Err(EngineError::Port(format!("{:?} already has {} ports", id, MAX_PORTS)));
        }
        ports.push(channels);
        Ok(ports.len() - 1)
    }

    pub(crate) fn alloc_connection(&mut self, src: PortRef, dst: PortRef) -> EngineResult<ConnectionId> {
        if src.node == dst.node {
            return Err(EngineError::Port(format!("{:?} cannot feed itself", src.node)));
        }
        let src_channels = self.port_channels(src, false)?;
        let dst_channels = self.port_channels(dst, true)?;
        if src_channels != dst_channels {
            return Err(EngineError::Port(format!(
                "{}-channel output cannot feed {}-channel input",
                src_channels, dst_channels
            )));
        }

        let index = match self.free_connections.pop() {
            Some(index) => index as usize,
            None if self.connections.len() < self.max_connections => {
                self.connections.push(None);
                self.connections.len() - 1
            }
            None => return Err(EngineError::CapacityExhausted("graph connections")),
        };
        self.connections[index] = Some(ConnectionMirror { src, dst });
        Ok(ConnectionId(index as u32))
    }

    pub(crate) fn free_connection(&mut self, id: ConnectionId) -> EngineResult<()> {
        self.check_connection(id)?;
        self.connections[id.index()] = None;
        self.free_connections.push(id.0);
        Ok(())
    }

    pub(crate) fn check_node(&self, id: NodeId) -> EngineResult<()> {
        if self.is_node_live(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownNode(id))
        }
    }

    pub(crate) fn check_connection(&self, id: ConnectionId) -> EngineResult<()> {
        if self.is_connection_live(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownConnection(id))
        }
    }

    fn port_channels(&self, port: PortRef, input: bool) -> EngineResult<usize> {
        let node = self
            .nodes
            .get(port.node.index())
            .and_then(|n| n.as_ref())
            .ok_or(EngineError::UnknownNode(port.node))?;
        let ports = if input { &node.inputs } else { &node.outputs };
        ports.get(port.port).copied().ok_or_else(|| {
            EngineError::Port(format!(
                "{:?} has no {} port {}",
                port.node,
                if input { "input" } else { "output" },
                port.port
            ))
        })
    }
}
