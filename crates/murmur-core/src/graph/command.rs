//! Graph mutations and the command block that batches them
//!
//! A [`CommandBlock`] is opened with [`GraphHandle::create_command_block`],
//! filled with mutations and committed with [`CommandBlock::complete`]. The
//! whole block crosses to the audio thread as one queue item and is applied
//! between two buffers, so the renderer never sees half of a block.
//!
//! Ids are handed out immediately, which lets later commands in the same
//! block refer to nodes and connections created earlier in it.

use super::handle::GraphHandle;
use super::{ConnectionId, Node, NodeId, PortRef};
use crate::dsp::{AudioKernel, ClipReader, KernelUpdate, ParamKey, PortBuffer, ProviderKey};
use crate::error::EngineResult;

/// One graph mutation, applied on the audio thread
pub enum GraphCommand {
    CreateNode {
        id: NodeId,
        node: Box<Node>,
    },
    ReleaseNode {
        id: NodeId,
    },
    AddInput {
        node: NodeId,
        buffer: PortBuffer,
    },
    AddOutput {
        node: NodeId,
        buffer: PortBuffer,
    },
    Connect {
        id: ConnectionId,
        src: PortRef,
        dst: PortRef,
        left: f32,
        right: f32,
    },
    Disconnect {
        id: ConnectionId,
    },
    SetAttenuation {
        id: ConnectionId,
        left: f32,
        right: f32,
        lerp_samples: u32,
    },
    SetFloat {
        node: NodeId,
        index: usize,
        value: f32,
        lerp_samples: u32,
    },
    SetProvider {
        node: NodeId,
        index: usize,
        provider: Option<ClipReader>,
    },
    Update {
        node: NodeId,
        update: Box<dyn KernelUpdate>,
    },
}

impl std::fmt::Debug for GraphCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphCommand::CreateNode { id, .. } => write!(f, "CreateNode({:?})", id),
            GraphCommand::ReleaseNode { id } => write!(f, "ReleaseNode({:?})", id),
            GraphCommand::AddInput { node, buffer } => {
                write!(f, "AddInput({:?}, {}ch)", node, buffer.channels())
            }
            GraphCommand::AddOutput { node, buffer } => {
                write!(f, "AddOutput({:?}, {}ch)", node, buffer.channels())
            }
            GraphCommand::Connect { id, src, dst, .. } => {
                write!(f, "Connect({:?}, {:?} -> {:?})", id, src, dst)
            }
            GraphCommand::Disconnect { id } => write!(f, "Disconnect({:?})", id),
            GraphCommand::SetAttenuation {
                id,
                left,
                right,
                lerp_samples,
            } => write!(f, "SetAttenuation({:?}, {}, {}, {})", id, left, right, lerp_samples),
            GraphCommand::SetFloat {
                node,
                index,
                value,
                lerp_samples,
            } => write!(f, "SetFloat({:?}, {}, {}, {})", node, index, value, lerp_samples),
            GraphCommand::SetProvider { node, index, provider } => write!(
                f,
                "SetProvider({:?}, {}, {})",
                node,
                index,
                if provider.is_some() { "bound" } else { "none" }
            ),
            GraphCommand::Update { node, .. } => write!(f, "Update({:?})", node),
        }
    }
}

/// Batch of graph mutations committed atomically
///
/// Dropping a block without calling [`complete`](Self::complete) still
/// commits it (ids were already allocated against it) and logs a warning.
pub struct CommandBlock<'a> {
    handle: &'a mut GraphHandle,
    commands: Vec<GraphCommand>,
}

impl<'a> CommandBlock<'a> {
    pub(crate) fn new(handle: &'a mut GraphHandle) -> Self {
        Self {
            handle,
            commands: Vec::new(),
        }
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Create a node running `kernel`; ports are added separately
    pub fn create_node<K: AudioKernel>(&mut self, kernel: K) -> EngineResult<NodeId> {
        let id = self.handle.alloc_node()?;
        let node = Box::new(Node::new(Box::new(kernel), &self.handle.kernel_init()));
        self.commands.push(GraphCommand::CreateNode { id, node });
        Ok(id)
    }

    /// Release a node and every connection touching it
    pub fn release_node(&mut self, id: NodeId) -> EngineResult<()> {
        self.handle.free_node(id)?;
        self.commands.push(GraphCommand::ReleaseNode { id });
        Ok(())
    }

    /// Append an input port; returns its index
    pub fn add_input(&mut self, node: NodeId, channels: usize) -> EngineResult<usize> {
        let port = self.handle.mirror_add_port(node, channels, true)?;
        let buffer = PortBuffer::new(channels, self.handle.kernel_init().max_frames);
        self.commands.push(GraphCommand::AddInput { node, buffer });
        Ok(port)
    }

    /// Append an output port; returns its index
    pub fn add_output(&mut self, node: NodeId, channels: usize) -> EngineResult<usize> {
        let port = self.handle.mirror_add_port(node, channels, false)?;
        let buffer = PortBuffer::new(channels, self.handle.kernel_init().max_frames);
        self.commands.push(GraphCommand::AddOutput { node, buffer });
        Ok(port)
    }

    /// Connect at unity attenuation
    pub fn connect(&mut self, src: PortRef, dst: PortRef) -> EngineResult<ConnectionId> {
        self.connect_with(src, dst, 1.0, 1.0)
    }

    /// Connect with an initial (left, right) attenuation
    pub fn connect_with(
        &mut self,
        src: PortRef,
        dst: PortRef,
        left: f32,
        right: f32,
    ) -> EngineResult<ConnectionId> {
        let id = self.handle.alloc_connection(src, dst)?;
        self.commands.push(GraphCommand::Connect {
            id,
            src,
            dst,
            left,
            right,
        });
        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> EngineResult<()> {
        self.handle.free_connection(id)?;
        self.commands.push(GraphCommand::Disconnect { id });
        Ok(())
    }

    /// Ramp a connection to `(left, right)` over `lerp_samples` (0 = instant)
    pub fn set_attenuation(
        &mut self,
        id: ConnectionId,
        left: f32,
        right: f32,
        lerp_samples: u32,
    ) -> EngineResult<()> {
        self.handle.check_connection(id)?;
        self.commands.push(GraphCommand::SetAttenuation {
            id,
            left,
            right,
            lerp_samples,
        });
        Ok(())
    }

    /// Ramp a kernel parameter to `value` over `lerp_samples` (0 = instant)
    pub fn set_float<P: ParamKey>(
        &mut self,
        node: NodeId,
        key: P,
        value: f32,
        lerp_samples: u32,
    ) -> EngineResult<()> {
        self.handle.check_node(node)?;
        self.commands.push(GraphCommand::SetFloat {
            node,
            index: key.index(),
            value,
            lerp_samples,
        });
        Ok(())
    }

    /// Bind (or unbind with `None`) a sample provider
    pub fn set_provider<P: ProviderKey>(
        &mut self,
        node: NodeId,
        key: P,
        provider: Option<ClipReader>,
    ) -> EngineResult<()> {
        self.handle.check_node(node)?;
        self.commands.push(GraphCommand::SetProvider {
            node,
            index: key.index(),
            provider,
        });
        Ok(())
    }

    /// Schedule an update kernel against `node`'s kernel
    pub fn update<U: KernelUpdate>(&mut self, node: NodeId, update: U) -> EngineResult<()> {
        self.handle.check_node(node)?;
        self.commands.push(GraphCommand::Update {
            node,
            update: Box::new(update),
        });
        Ok(())
    }

    /// Commit the block; the audio thread applies it before its next buffer
    pub fn complete(mut self) {
        let commands = std::mem::take(&mut self.commands);
        self.handle.submit(commands);
    }
}

impl Drop for CommandBlock<'_> {
    fn drop(&mut self) {
        if !self.commands.is_empty() {
            log::warn!(
                "Command block with {} commands dropped without complete(), committing",
                self.commands.len()
            );
            let commands = std::mem::take(&mut self.commands);
            self.handle.submit(commands);
        }
    }
}
