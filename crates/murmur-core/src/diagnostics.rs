//! Diagnostics posted by frame jobs
//!
//! Workers never log from inside the parallel mix. They post a
//! [`Diagnostic`] to a crossbeam channel which the main context drains and
//! logs after the frame.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::types::{DefinitionId, EmitterId, PlaybackId};

/// Something a frame job wants the host to know about
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The emitter references a definition that was never defined
    UnresolvedDefinition {
        emitter: EmitterId,
        definition: DefinitionId,
    },
    /// The definition's voice range points past the registered field voices
    VoiceOutOfRange {
        emitter: EmitterId,
        voice: usize,
        voices: usize,
    },
    /// The emitter's field voice lost its playback and was unbound
    VoiceLost { emitter: EmitterId, voice: usize },
    /// A move-by could not be installed on its voice entity
    MoveByRejected { entity: PlaybackId, reason: String },
}

impl Diagnostic {
    /// Write the diagnostic to the log at a fitting level
    pub fn log(&self) {
        match self {
            Diagnostic::UnresolvedDefinition {
                emitter,
                definition,
            } => log::warn!("{} references unknown {}", emitter, definition),
            Diagnostic::VoiceOutOfRange {
                emitter,
                voice,
                voices,
            } => log::warn!(
                "{} maps to field voice {} but only {} are registered",
                emitter,
                voice,
                voices
            ),
            Diagnostic::VoiceLost { emitter, voice } => {
                log::debug!("{} unbound from lost field voice {}", emitter, voice)
            }
            Diagnostic::MoveByRejected { entity, reason } => {
                log::error!("Move-by on {} rejected: {}", entity, reason)
            }
        }
    }
}

/// Multi-producer queue of diagnostics, drained on the main thread
#[derive(Debug)]
pub struct DiagnosticQueue {
    tx: Sender<Diagnostic>,
    rx: Receiver<Diagnostic>,
}

impl DiagnosticQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Handle for jobs; cheap to clone and safe to share across workers
    pub fn sender(&self) -> &Sender<Diagnostic> {
        &self.tx
    }

    /// Take everything posted so far
    pub fn drain(&self) -> Vec<Diagnostic> {
        self.rx.try_iter().collect()
    }
}

impl Default for DiagnosticQueue {
    fn default() -> Self {
        Self::new()
    }
}
