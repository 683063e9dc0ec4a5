//! Engine error types
//!
//! Main-thread API calls return [`EngineResult`]. The audio thread never
//! produces these directly: it raises fault bits which the main context turns
//! into [`EngineError::Internal`] on the next tick.

use thiserror::Error;

use crate::audio::AudioError;
use crate::graph::{ConnectionId, NodeId};
use crate::types::{ClipId, DefinitionId, EmitterId, PlaybackId};

/// Errors reported by the engine's host-facing API
#[derive(Error, Debug)]
pub enum EngineError {
    /// Clip id was never registered
    #[error("Unknown clip: {0}")]
    UnknownClip(ClipId),

    /// Emitter id is not present in the scene
    #[error("Unknown emitter: {0}")]
    UnknownEmitter(EmitterId),

    /// Definition id was never defined
    #[error("Unknown emitter definition: {0}")]
    UnknownDefinition(DefinitionId),

    /// Playback entity does not exist
    #[error("Invalid playback entity: {0}")]
    InvalidEntity(PlaybackId),

    /// Clip data could not be used (empty, bad channel count, ...)
    #[error("Invalid clip data: {0}")]
    InvalidClip(String),

    /// Graph node is not live
    #[error("Graph node {0:?} is not live")]
    UnknownNode(NodeId),

    /// Graph connection is not live
    #[error("Graph connection {0:?} is not live")]
    UnknownConnection(ConnectionId),

    /// Port index out of range or channel counts disagree
    #[error("Port error: {0}")]
    Port(String),

    /// Node or connection table is full
    #[error("Graph capacity exhausted: {0}")]
    CapacityExhausted(&'static str),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A graph invariant was violated on the audio thread
    #[error("Internal graph fault: {0}")]
    Internal(String),

    /// Job worker pool could not be started
    #[error("Worker pool: {0}")]
    WorkerPool(String),

    /// Output driver failure
    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl EngineError {
    /// Whether this error falls in the bad-argument class
    pub fn is_bad_argument(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownClip(_)
                | EngineError::UnknownEmitter(_)
                | EngineError::UnknownDefinition(_)
                | EngineError::InvalidEntity(_)
                | EngineError::InvalidClip(_)
                | EngineError::UnknownNode(_)
                | EngineError::UnknownConnection(_)
                | EngineError::Port(_)
        )
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
