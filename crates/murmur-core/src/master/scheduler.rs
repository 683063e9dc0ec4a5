//! Per-frame job DAG
//!
//! ```text
//! detach_dead ─▶ attach_new ─┬─▶ mix (parallel chunks) ─▶ select ─▶ setup ─▶ update_alive
//!                            └─▶ clear additive gains                           │
//!                                                       move-by barrier ◀───────┘
//!                                                              │
//!                                            fold fields ─▶ audio barrier ─▶ sync
//! ```
//!
//! Jobs run on a dedicated rayon pool. Parallel jobs only write their own
//! scratch row or record into a [`BarrierBuffer`]; the buffers are replayed
//! in order at the two barriers.

use rayon::ThreadPool;

use crate::config::{MoveByParams, SpatialParams};
use crate::diagnostics::{Diagnostic, DiagnosticQueue};
use crate::field::{DefinitionTable, FieldMixer, MixFrame, VoiceMix};
use crate::moveby::{AliveStats, MoveByAllocator, MoveBySpawn, SetupStats};
use crate::playback::{AssetStore, SamplePlaybackRegistry, SyncStats};
use crate::graph::GraphHandle;
use crate::scene::{BarrierBuffer, EmitterTable, SceneCommand};
use crate::types::{PlaybackId, Pose};

/// What one frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub emitters: usize,
    pub attached: usize,
    pub detached: usize,
    pub candidates: usize,
    pub selected: usize,
    pub setup: SetupStats,
    pub alive: AliveStats,
    /// Move-bys installed at the move-by barrier
    pub installed: usize,
    /// Emitters unbound from a field voice that lost its playback
    pub unbound: usize,
    pub sync: SyncStats,
}

/// Scene state the frame reads and mutates
pub struct FrameInputs<'a> {
    pub listener: Pose,
    pub dt: f32,
    pub spatial: SpatialParams,
    pub move_by: MoveByParams,
    pub emitters: &'a mut EmitterTable,
    pub definitions: &'a DefinitionTable,
    /// Playback entity of each field voice, by voice index
    pub field_voices: &'a [PlaybackId],
    pub registry: &'a mut SamplePlaybackRegistry,
    pub assets: &'a AssetStore,
    pub graph: &'a mut GraphHandle,
}

/// Frame-local workers and buffers
pub struct FrameScheduler {
    pool: ThreadPool,
    mixer: FieldMixer,
    allocator: MoveByAllocator,
    move_by_barrier: BarrierBuffer<MoveBySpawn>,
    audio_barrier: BarrierBuffer<SceneCommand>,
    diagnostics: DiagnosticQueue,
}

impl FrameScheduler {
    pub fn new(pool: ThreadPool, rng_seed: u64) -> Self {
        let mixer = FieldMixer::new(pool.current_num_threads());
        Self {
            pool,
            mixer,
            allocator: MoveByAllocator::new(rng_seed),
            move_by_barrier: BarrierBuffer::new(),
            audio_barrier: BarrierBuffer::new(),
            diagnostics: DiagnosticQueue::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn mixer(&self) -> &FieldMixer {
        &self.mixer
    }

    pub(crate) fn mixer_mut(&mut self) -> &mut FieldMixer {
        &mut self.mixer
    }

    pub fn allocator(&self) -> &MoveByAllocator {
        &self.allocator
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut MoveByAllocator {
        &mut self.allocator
    }

    /// Diagnostics posted since the last call
    pub fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    /// Throw away anything recorded for an abandoned frame
    pub fn discard(&mut self) {
        let spawns = self.move_by_barrier.drain();
        if !spawns.is_empty() {
            self.allocator.cancel_spawns(spawns);
        }
        self.audio_barrier.discard();
    }

    /// Run every job of one frame and submit the resulting graph changes
    pub fn run(&mut self, inputs: FrameInputs<'_>) -> FrameStats {
        let FrameInputs {
            listener,
            dt,
            spatial,
            move_by,
            emitters,
            definitions,
            field_voices,
            registry,
            assets,
            graph,
        } = inputs;
        let mut stats = FrameStats::default();
        let pool = &self.pool;
        let mixer = &mut self.mixer;
        let allocator = &mut self.allocator;
        let sender = self.diagnostics.sender();

        // Structure
        stats.detached = emitters.detach_dead().len();
        stats.attached = pool.install(|| emitters.attach_new(listener.position));
        stats.emitters = emitters.len();

        // Contributions, in parallel with resetting the additive voices
        let frame = MixFrame { listener, dt, spatial };
        let (candidates, ()) = pool.join(
            || mixer.mix(pool, &frame, emitters.as_mut_slice(), definitions, sender),
            || registry.clear_additive_gains(),
        );
        stats.candidates = candidates.len();

        // Move-bys
        let selection = allocator.select(&candidates, emitters);
        stats.selected = selection.len();
        stats.setup = allocator.setup(&selection, emitters, &move_by, dt, &self.move_by_barrier);
        stats.alive = allocator.update_alive(dt, emitters, registry);
        stats.installed = allocator.apply_spawns(self.move_by_barrier.drain(), registry, sender);

        // Field voices
        fold_fields(
            mixer.final_mix(),
            field_voices,
            spatial.volume,
            registry,
            emitters,
            &self.audio_barrier,
            &self.diagnostics,
        );
        for command in self.audio_barrier.drain() {
            emitters.apply(command);
            stats.unbound += 1;
        }

        let mut block = graph.create_command_block();
        stats.sync = registry.sync(&mut block, assets);
        block.complete();
        stats
    }
}

/// Write the final mix into each field voice's request
///
/// Emitters bound to a voice whose request is gone are unbound through the
/// audio barrier so they bind again next frame.
fn fold_fields(
    final_mix: &[VoiceMix],
    field_voices: &[PlaybackId],
    volume: f32,
    registry: &mut SamplePlaybackRegistry,
    emitters: &EmitterTable,
    audio_barrier: &BarrierBuffer<SceneCommand>,
    diagnostics: &DiagnosticQueue,
) {
    let mut lost = Vec::new();
    for (voice, (mix, entity)) in final_mix.iter().zip(field_voices).enumerate() {
        match registry.request_mut(*entity) {
            Some(request) => {
                request.volume = volume;
                request.left += mix.direct_left;
                request.right += mix.direct_right;
                request.lpf_left += mix.lpf_left;
                request.lpf_right += mix.lpf_right;
            }
            None => lost.push(voice),
        }
    }
    if lost.is_empty() {
        return;
    }

    for emitter in emitters.iter() {
        if let Some(voice) = emitter.voice.filter(|v| lost.contains(v)) {
            audio_barrier.push(SceneCommand::UnbindVoice(emitter.id));
            let _ = diagnostics.sender().send(Diagnostic::VoiceLost {
                emitter: emitter.id,
                voice,
            });
        }
    }
}
