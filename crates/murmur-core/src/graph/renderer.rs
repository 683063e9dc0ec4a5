//! Audio-thread side of the graph
//!
//! Per buffer:
//!
//! 1. Apply every completed command block, in order
//! 2. If the topology changed, rebuild the inbound edge lists and the
//!    execution order (depth-first from the root, producers first)
//! 3. For each node in order, fill its input ports and execute its kernel
//! 4. Copy the root's input port 0 to the destination
//! 5. Advance parameter and attenuation ramps by the buffer length
//!
//! An input port fed by exactly one unity connection whose producer port has
//! no other consumer takes the producer's buffer instead of summing into its
//! own. Every other input is zeroed and summed across its connections with
//! the connections' per-sample attenuation.
//!
//! All tables are sized at construction. Nothing in this file allocates,
//! frees or locks after `new`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rtrb::{Consumer, Producer};

use super::command::GraphCommand;
use super::node::RootKernel;
use super::{
    Connection, ConnectionId, GraphAtomics, GraphEvent, GraphFaults, Node, NodeId, PortRef, MAX_PORTS,
    ROOT_NODE,
};
use crate::dsp::{ClipReader, EventSink, KernelEvent, KernelInit, KernelUpdate, PortBuffer};
use crate::types::{Sample, StereoBuffer, StereoSample};

/// Heap objects handed back to the main thread for dropping
pub(crate) enum Retired {
    Node(Box<Node>),
    Batch(Vec<GraphCommand>),
    Update(Box<dyn KernelUpdate>),
    Provider(ClipReader),
    Port(PortBuffer),
}

/// Event sink bound to one node for the duration of its `execute`
struct NodeEvents<'a> {
    node: NodeId,
    queue: &'a mut Producer<GraphEvent>,
    atomics: &'a GraphAtomics,
}

impl EventSink for NodeEvents<'_> {
    fn post(&mut self, event: KernelEvent) {
        let event = GraphEvent {
            node: self.node,
            event,
        };
        if self.queue.push(event).is_err() {
            self.atomics.raise(GraphFaults::EVENT_OVERFLOW);
        }
    }
}

const UNVISITED: u8 = 0;
const ON_STACK: u8 = 1;
const DONE: u8 = 2;

/// Mutable references to two distinct elements
fn two_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = slice.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// Audio-thread graph executor
pub struct GraphRenderer {
    commands: Consumer<Vec<GraphCommand>>,
    retire: Producer<Retired>,
    events: Producer<GraphEvent>,
    atomics: Arc<GraphAtomics>,
    init: KernelInit,

    nodes: Vec<Option<Box<Node>>>,
    connections: Vec<Option<Connection>>,

    // Topology scratch, rebuilt when `topology_dirty`
    topology_dirty: bool,
    /// CSR offsets into `inbound`, one past each node
    inbound_start: Vec<u32>,
    /// Connection ids grouped by destination node
    inbound: Vec<u32>,
    /// Fill cursor for `inbound` while building
    cursor: Vec<u32>,
    /// Consumers per (node, output port)
    consumers: Vec<u16>,
    visit: Vec<u8>,
    stack: Vec<(u32, u32)>,
    order: Vec<u32>,

    stolen_last_buffer: usize,
}

impl GraphRenderer {
    pub(crate) fn new(
        commands: Consumer<Vec<GraphCommand>>,
        retire: Producer<Retired>,
        events: Producer<GraphEvent>,
        atomics: Arc<GraphAtomics>,
        init: KernelInit,
        max_nodes: usize,
        max_connections: usize,
    ) -> Self {
        let mut nodes: Vec<Option<Box<Node>>> = (0..max_nodes).map(|_| None).collect();
        let mut root = Node::new(Box::new(RootKernel), &init);
        root.inputs.push(PortBuffer::new(2, init.max_frames));
        nodes[ROOT_NODE.index()] = Some(Box::new(root));

        Self {
            commands,
            retire,
            events,
            atomics,
            init,
            nodes,
            connections: vec![None; max_connections],
            topology_dirty: true,
            inbound_start: vec![0; max_nodes + 1],
            inbound: vec![0; max_connections],
            cursor: vec![0; max_nodes],
            consumers: vec![0; max_nodes * MAX_PORTS],
            visit: vec![UNVISITED; max_nodes],
            stack: Vec::with_capacity(max_nodes),
            order: Vec::with_capacity(max_nodes),
            stolen_last_buffer: 0,
        }
    }

    /// Largest buffer processed in one pass; longer renders are chunked
    pub fn max_frames(&self) -> usize {
        self.init.max_frames.max(1)
    }

    pub fn sample_rate(&self) -> u32 {
        self.init.sample_rate
    }

    pub fn atomics(&self) -> &Arc<GraphAtomics> {
        &self.atomics
    }

    /// Live node in slot `id`
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|n| n.as_deref())
    }

    /// Live connection in slot `id`
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.index()).and_then(|c| c.as_ref())
    }

    /// Nodes executed in the last buffer, producers first, root last
    pub fn execution_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().map(|&n| NodeId(n))
    }

    /// Input ports that took their producer's buffer in the last pass
    pub fn stolen_last_buffer(&self) -> usize {
        self.stolen_last_buffer
    }

    // ─────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────

    /// Render `out.len()` frames into a stereo buffer
    pub fn render(&mut self, out: &mut StereoBuffer) {
        let max_frames = self.max_frames();
        for chunk in out.as_mut_slice().chunks_mut(max_frames) {
            self.process(chunk.len());
            match self.root_output(chunk.len()) {
                Some(root) => chunk.copy_from_slice(root),
                None => chunk.fill(StereoSample::silence()),
            }
        }
    }

    /// Render into an interleaved device buffer with `channels` channels
    ///
    /// Mono devices get the average of left and right; channels beyond the
    /// second are silent.
    pub fn render_interleaved(&mut self, out: &mut [Sample], channels: usize) {
        if channels == 0 {
            return;
        }
        let max_samples = self.max_frames() * channels;
        for chunk in out.chunks_mut(max_samples) {
            let frames = chunk.len() / channels;
            self.process(frames);
            let Some(root) = self.root_output(frames) else {
                chunk.fill(0.0);
                continue;
            };
            for (frame, s) in chunk.chunks_exact_mut(channels).zip(root.iter()) {
                if channels == 1 {
                    frame[0] = 0.5 * (s.left + s.right);
                } else {
                    frame[0] = s.left;
                    frame[1] = s.right;
                    frame[2..].fill(0.0);
                }
            }
        }
    }

    fn root_output(&self, frames: usize) -> Option<&[StereoSample]> {
        self.nodes[ROOT_NODE.index()]
            .as_ref()
            .and_then(|root| root.inputs.first())
            .and_then(|port| port.stereo(frames))
    }

    /// Run one pass of at most `max_frames` frames
    fn process(&mut self, frames: usize) {
        self.apply_commands();
        if self.topology_dirty {
            self.rebuild_topology();
            self.topology_dirty = false;
        }

        self.stolen_last_buffer = 0;
        for k in 0..self.order.len() {
            let id = self.order[k] as usize;
            self.gather_inputs(id, frames);
            if id == ROOT_NODE.index() {
                continue;
            }
            if let Some(node) = self.nodes[id].as_mut() {
                let mut sink = NodeEvents {
                    node: NodeId(id as u32),
                    queue: &mut self.events,
                    atomics: &self.atomics,
                };
                node.execute(frames, self.init.sample_rate, &mut sink);
            }
        }

        for node in self.nodes.iter_mut().flatten() {
            node.params.advance(frames);
        }
        for conn in self.connections.iter_mut().flatten() {
            conn.left.advance(frames);
            conn.right.advance(frames);
        }

        self.atomics.buffers_rendered.fetch_add(1, Ordering::Relaxed);
        self.atomics
            .frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Fill every input port of node `id`
    fn gather_inputs(&mut self, id: usize, frames: usize) {
        let input_count = match self.nodes[id].as_ref() {
            Some(node) => node.inputs.len(),
            None => return,
        };
        let start = self.inbound_start[id] as usize;
        let end = self.inbound_start[id + 1] as usize;

        for port in 0..input_count {
            let mut count = 0;
            let mut single = None;
            for &conn_id in &self.inbound[start..end] {
                if let Some(conn) = &self.connections[conn_id as usize] {
                    if conn.dst.port == port {
                        count += 1;
                        single = Some(*conn);
                    }
                }
            }

            if count == 1 {
                if let Some(conn) = single {
                    if self.try_steal(&conn, id, port) {
                        self.stolen_last_buffer += 1;
                        continue;
                    }
                }
            }

            if let Some(node) = self.nodes[id].as_mut() {
                node.inputs[port].clear(frames);
            }
            if count == 0 {
                continue;
            }
            for k in start..end {
                let conn_id = self.inbound[k] as usize;
                let Some(conn) = self.connections[conn_id] else {
                    continue;
                };
                if conn.dst.port != port {
                    continue;
                }
                self.sum_connection(&conn, id, port, frames);
            }
        }
    }

    /// Hand the producer's output buffer to the consumer's input
    fn try_steal(&mut self, conn: &Connection, id: usize, port: usize) -> bool {
        let src = conn.src.node.index();
        if src == id || !conn.is_unity() {
            return false;
        }
        if self.consumers[src * MAX_PORTS + conn.src.port] != 1 {
            return false;
        }
        let (dst_node, src_node) = two_mut(&mut self.nodes, id, src);
        let (Some(dst_node), Some(src_node)) = (dst_node.as_mut(), src_node.as_mut()) else {
            return false;
        };
        let (Some(input), Some(output)) = (
            dst_node.inputs.get_mut(port),
            src_node.outputs.get_mut(conn.src.port),
        ) else {
            return false;
        };
        if input.channels() != output.channels() || input.max_frames() != output.max_frames() {
            return false;
        }
        std::mem::swap(input, output);
        true
    }

    fn sum_connection(&mut self, conn: &Connection, id: usize, port: usize, frames: usize) {
        let src = conn.src.node.index();
        if src == id {
            return;
        }
        let (dst_node, src_node) = two_mut(&mut self.nodes, id, src);
        let (Some(dst_node), Some(src_node)) = (dst_node.as_mut(), src_node.as_mut()) else {
            return;
        };
        let (Some(input), Some(output)) = (
            dst_node.inputs.get_mut(port),
            src_node.outputs.get(conn.src.port),
        ) else {
            return;
        };
        let channels = input.channels();
        if channels != output.channels() {
            return;
        }

        let dst = input.samples_mut(frames);
        let src = output.samples(frames);
        for c in 0..channels {
            let ramp = conn.ramp(c);
            for (i, (d, s)) in dst
                .iter_mut()
                .skip(c)
                .step_by(channels)
                .zip(src.iter().skip(c).step_by(channels))
                .enumerate()
            {
                *d += s * ramp.at(i);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Topology
    // ─────────────────────────────────────────────────────────────

    fn rebuild_topology(&mut self) {
        let node_slots = self.nodes.len();

        self.inbound_start.fill(0);
        self.consumers.fill(0);
        for conn in self.connections.iter().flatten() {
            self.inbound_start[conn.dst.node.index() + 1] += 1;
            let slot = conn.src.node.index() * MAX_PORTS + conn.src.port;
            self.consumers[slot] = self.consumers[slot].saturating_add(1);
        }
        for n in 0..node_slots {
            self.inbound_start[n + 1] += self.inbound_start[n];
        }
        self.cursor.copy_from_slice(&self.inbound_start[..node_slots]);
        for (conn_id, conn) in self.connections.iter().enumerate() {
            if let Some(conn) = conn {
                let dst = conn.dst.node.index();
                self.inbound[self.cursor[dst] as usize] = conn_id as u32;
                self.cursor[dst] += 1;
            }
        }

        // Iterative post-order DFS over inbound edges
        self.visit.fill(UNVISITED);
        self.order.clear();
        self.stack.clear();
        let root = ROOT_NODE.0;
        self.visit[root as usize] = ON_STACK;
        self.stack.push((root, self.inbound_start[root as usize]));

        while let Some(top) = self.stack.last_mut() {
            let (node, next) = *top;
            let end = self.inbound_start[node as usize + 1];
            if next < end {
                top.1 += 1;
                let conn_id = self.inbound[next as usize] as usize;
                let Some(conn) = &self.connections[conn_id] else {
                    continue;
                };
                let src = conn.src.node.0;
                match self.visit[src as usize] {
                    UNVISITED => {
                        self.visit[src as usize] = ON_STACK;
                        self.stack.push((src, self.inbound_start[src as usize]));
                    }
                    ON_STACK => self.atomics.raise(GraphFaults::CYCLE),
                    _ => {}
                }
            } else {
                self.stack.pop();
                self.visit[node as usize] = DONE;
                self.order.push(node);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────

    fn apply_commands(&mut self) {
        while let Ok(mut batch) = self.commands.pop() {
            for command in batch.drain(..) {
                self.apply(command);
            }
            self.retire(Retired::Batch(batch));
        }
    }

    fn retire(&mut self, object: Retired) {
        if self.retire.push(object).is_err() {
            self.atomics.raise(GraphFaults::RETIRE_OVERFLOW);
        }
    }

    fn live_node(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|n| n.as_deref_mut())
    }

    fn port_channels(&self, port: PortRef, input: bool) -> Option<usize> {
        let node = self.nodes.get(port.node.index())?.as_ref()?;
        let ports = if input { &node.inputs } else { &node.outputs };
        ports.get(port.port).map(|p| p.channels())
    }

    fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::CreateNode { id, node } => {
                if matches!(self.nodes.get(id.index()), Some(None)) {
                    self.nodes[id.index()] = Some(node);
                    self.topology_dirty = true;
                } else {
                    self.atomics.raise(GraphFaults::UNKNOWN_NODE);
                    self.retire(Retired::Node(node));
                }
            }

            GraphCommand::ReleaseNode { id } => {
                let taken = if id == ROOT_NODE {
                    None
                } else {
                    self.nodes.get_mut(id.index()).and_then(|n| n.take())
                };
                let Some(mut node) = taken else {
                    self.atomics.raise(GraphFaults::UNKNOWN_NODE);
                    return;
                };
                node.kernel.dispose();
                for slot in self.connections.iter_mut() {
                    if matches!(slot, Some(c) if c.src.node == id || c.dst.node == id) {
                        *slot = None;
                    }
                }
                self.topology_dirty = true;
                self.retire(Retired::Node(node));
            }

            GraphCommand::AddInput { node, buffer } => {
                match self.live_node(node) {
                    Some(n) if n.inputs.len() < MAX_PORTS => n.inputs.push(buffer),
                    _ => {
                        self.atomics.raise(GraphFaults::PORT_MISMATCH);
                        self.retire(Retired::Port(buffer));
                    }
                }
            }

            GraphCommand::AddOutput { node, buffer } => {
                match self.live_node(node) {
                    Some(n) if n.outputs.len() < MAX_PORTS => n.outputs.push(buffer),
                    _ => {
                        self.atomics.raise(GraphFaults::PORT_MISMATCH);
                        self.retire(Retired::Port(buffer));
                    }
                }
            }

            GraphCommand::Connect {
                id,
                src,
                dst,
                left,
                right,
            } => {
                if !matches!(self.connections.get(id.index()), Some(None)) {
                    self.atomics.raise(GraphFaults::BAD_CONNECTION);
                    return;
                }
                if src.node == dst.node {
                    self.atomics.raise(GraphFaults::PORT_MISMATCH);
                    return;
                }
                match (self.port_channels(src, false), self.port_channels(dst, true)) {
                    (Some(a), Some(b)) if a == b => {
                        self.connections[id.index()] = Some(Connection::new(src, dst, left, right));
                        self.topology_dirty = true;
                    }
                    _ => self.atomics.raise(GraphFaults::PORT_MISMATCH),
                }
            }

            GraphCommand::Disconnect { id } => match self.connections.get_mut(id.index()) {
                Some(slot @ Some(_)) => {
                    *slot = None;
                    self.topology_dirty = true;
                }
                _ => self.atomics.raise(GraphFaults::BAD_CONNECTION),
            },

            GraphCommand::SetAttenuation {
                id,
                left,
                right,
                lerp_samples,
            } => match self.connections.get_mut(id.index()).and_then(|c| c.as_mut()) {
                Some(conn) => {
                    conn.left.set(left, lerp_samples);
                    conn.right.set(right, lerp_samples);
                }
                None => self.atomics.raise(GraphFaults::BAD_CONNECTION),
            },

            GraphCommand::SetFloat {
                node,
                index,
                value,
                lerp_samples,
            } => match self.live_node(node) {
                Some(n) => {
                    if !n.params.set_index(index, value, lerp_samples) {
                        self.atomics.raise(GraphFaults::BAD_KEY);
                    }
                }
                None => self.atomics.raise(GraphFaults::UNKNOWN_NODE),
            },

            GraphCommand::SetProvider {
                node,
                index,
                provider,
            } => {
                let result = match self.live_node(node) {
                    Some(n) => n.providers.replace(index, provider),
                    None => {
                        self.atomics.raise(GraphFaults::UNKNOWN_NODE);
                        Err(provider)
                    }
                };
                match result {
                    Ok(Some(previous)) => self.retire(Retired::Provider(previous)),
                    Ok(None) => {}
                    Err(rejected) => {
                        self.atomics.raise(GraphFaults::BAD_KEY);
                        if let Some(rejected) = rejected {
                            self.retire(Retired::Provider(rejected));
                        }
                    }
                }
            }

            GraphCommand::Update { node, mut update } => {
                match self.live_node(node) {
                    Some(n) => update.update(n.kernel.as_mut()),
                    None => self.atomics.raise(GraphFaults::UNKNOWN_NODE),
                }
                self.retire(Retired::Update(update));
            }
        }
    }
}
