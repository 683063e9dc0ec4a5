//! Emitter table

use std::collections::HashMap;

use glam::Vec3;
use rayon::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::field::DefinitionHandle;
use crate::types::{DefinitionId, EmitterId};

/// What the host publishes for an emitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterAttributes {
    pub position: Vec3,
    /// Direction the emitter's cone points at (any length; zero = omni)
    pub cone_direction: Vec3,
    pub definition: DefinitionId,
}

impl EmitterAttributes {
    /// Omnidirectional emitter at `position`
    pub fn new(position: Vec3, definition: DefinitionId) -> Self {
        Self {
            position,
            cone_direction: Vec3::ZERO,
            definition,
        }
    }

    pub fn with_cone(mut self, direction: Vec3) -> Self {
        self.cone_direction = direction;
        self
    }
}

/// Per-frame derived state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmitterTracking {
    /// Distance to the listener this frame
    pub distance: f32,
    /// Distance to the listener last frame
    pub prev_distance: f32,
    /// Pan pair (before cone and distance attenuation)
    pub left: f32,
    pub right: f32,
    /// Smoothed loudness used to scale move-by panning
    pub presence: f32,
}

impl EmitterTracking {
    /// Fresh state for an emitter first seen at `distance`
    pub fn at(distance: f32) -> Self {
        Self {
            distance,
            prev_distance: distance,
            ..Self::default()
        }
    }

    /// Speed toward the listener over the last frame (negative when receding)
    pub fn closing_speed(&self, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        (self.prev_distance - self.distance) / dt
    }
}

/// Engine-side copy of one emitter
#[derive(Debug, Clone)]
pub struct Emitter {
    pub id: EmitterId,
    pub attributes: EmitterAttributes,
    pub tracking: EmitterTracking,
    /// Resolved definition (cached after the first successful lookup)
    pub(crate) definition: Option<DefinitionHandle>,
    /// Bound field voice index
    pub(crate) voice: Option<usize>,
    /// An unresolved definition was already reported
    pub(crate) reported: bool,
}

impl Emitter {
    fn new(id: EmitterId, attributes: EmitterAttributes) -> Self {
        Self {
            id,
            attributes,
            tracking: EmitterTracking::default(),
            definition: None,
            voice: None,
            reported: false,
        }
    }

    /// Field voice this emitter mixes into, once bound
    pub fn voice(&self) -> Option<usize> {
        self.voice
    }

    pub fn is_resolved(&self) -> bool {
        self.definition.is_some()
    }
}

/// Structural change recorded by a frame job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    /// Forget the emitter's field voice so it binds again
    UnbindVoice(EmitterId),
}

/// Dense emitter storage with deferred attach/detach
#[derive(Debug, Default)]
pub struct EmitterTable {
    emitters: Vec<Emitter>,
    index: HashMap<EmitterId, usize>,
    /// New emitters waiting for `attach_new`
    pending: Vec<(EmitterId, EmitterAttributes)>,
    /// Live emitters waiting for `detach_dead`
    removals: Vec<EmitterId>,
}

impl EmitterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an emitter
    ///
    /// Updates to a live emitter take effect immediately. A changed
    /// definition id drops the cached definition and voice.
    pub fn upsert(&mut self, id: EmitterId, attributes: EmitterAttributes) {
        if let Some(&i) = self.index.get(&id) {
            let emitter = &mut self.emitters[i];
            if emitter.attributes.definition != attributes.definition {
                emitter.definition = None;
                emitter.voice = None;
                emitter.reported = false;
            }
            emitter.attributes = attributes;
            self.removals.retain(|r| *r != id);
            return;
        }
        match self.pending.iter_mut().find(|(p, _)| *p == id) {
            Some(entry) => entry.1 = attributes,
            None => self.pending.push((id, attributes)),
        }
    }

    /// Schedule an emitter for removal
    pub fn remove(&mut self, id: EmitterId) -> EngineResult<()> {
        if self.index.contains_key(&id) {
            if !self.removals.contains(&id) {
                self.removals.push(id);
            }
            return Ok(());
        }
        let before = self.pending.len();
        self.pending.retain(|(p, _)| *p != id);
        if self.pending.len() == before {
            return Err(EngineError::UnknownEmitter(id));
        }
        Ok(())
    }

    /// Apply queued removals; returns the ids that left the table
    pub fn detach_dead(&mut self) -> Vec<EmitterId> {
        let mut detached = Vec::with_capacity(self.removals.len());
        for id in self.removals.drain(..) {
            let Some(i) = self.index.remove(&id) else {
                continue;
            };
            self.emitters.swap_remove(i);
            if let Some(moved) = self.emitters.get(i) {
                self.index.insert(moved.id, i);
            }
            detached.push(id);
        }
        detached
    }

    /// Apply queued insertions, initialising tracking from `listener`
    ///
    /// Returns the number of emitters attached.
    pub fn attach_new(&mut self, listener: Vec3) -> usize {
        let start = self.emitters.len();
        for (id, attributes) in self.pending.drain(..) {
            self.index.insert(id, self.emitters.len());
            self.emitters.push(Emitter::new(id, attributes));
        }
        self.emitters[start..].par_iter_mut().for_each(|emitter| {
            let distance = emitter.attributes.position.distance(listener);
            emitter.tracking = EmitterTracking::at(distance);
        });
        self.emitters.len() - start
    }

    pub fn apply(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::UnbindVoice(id) => {
                if let Some(emitter) = self.get_mut(id) {
                    emitter.voice = None;
                }
            }
        }
    }

    pub fn contains(&self, id: EmitterId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: EmitterId) -> Option<&Emitter> {
        self.index.get(&id).map(|&i| &self.emitters[i])
    }

    pub(crate) fn get_mut(&mut self, id: EmitterId) -> Option<&mut Emitter> {
        self.index.get(&id).map(|&i| &mut self.emitters[i])
    }

    /// Live emitters
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// Emitters queued for attach
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Emitter> {
        self.emitters.iter()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Emitter] {
        &mut self.emitters
    }
}
