//! Parallel field mixer

use crossbeam::channel::Sender;
use crossbeam::queue::SegQueue;
use rayon::prelude::*;
use rayon::ThreadPool;

use super::definition::{spatial_seed, DefinitionTable};
use super::panning::{pan_gains, panning_additive, presence, VoiceMix};
use crate::config::SpatialParams;
use crate::diagnostics::Diagnostic;
use crate::scene::Emitter;
use crate::types::{EmitterId, Pose};

/// Emitters closer than this are move-by candidates
pub const MOVE_BY_RADIUS: f32 = 15.0;

/// Per-frame inputs shared by every mix job
#[derive(Debug, Clone, Copy)]
pub struct MixFrame {
    pub listener: Pose,
    /// Seconds since the previous frame
    pub dt: f32,
    pub spatial: SpatialParams,
}

/// Scratch matrix and final per-voice mix
///
/// `scratch` holds `rows × stride` cells; row `r` is written only by the
/// job that mixes partition `r` of the emitters. Between frames every cell
/// is [`VoiceMix::ZERO`].
pub struct FieldMixer {
    rows: usize,
    stride: usize,
    voices: usize,
    scratch: Vec<VoiceMix>,
    final_mix: Vec<VoiceMix>,
    candidates: SegQueue<EmitterId>,
}

impl FieldMixer {
    /// Mixer with one scratch row per worker
    pub fn new(rows: usize) -> Self {
        let rows = rows.max(1);
        Self {
            rows,
            stride: 1,
            voices: 0,
            scratch: vec![VoiceMix::ZERO; rows],
            final_mix: Vec::new(),
            candidates: SegQueue::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn voice_count(&self) -> usize {
        self.voices
    }

    /// Resize for `voices` field voices (main thread, between frames)
    pub fn set_voice_count(&mut self, voices: usize) {
        self.voices = voices;
        self.stride = voices.max(1);
        self.scratch = vec![VoiceMix::ZERO; self.rows * self.stride];
        self.final_mix = vec![VoiceMix::ZERO; voices];
    }

    /// Per-voice gains produced by the last [`integrate`](Self::integrate)
    pub fn final_mix(&self) -> &[VoiceMix] {
        &self.final_mix
    }

    /// Whether every scratch cell is zero
    pub fn scratch_is_clear(&self) -> bool {
        self.scratch.iter().all(VoiceMix::is_zero)
    }

    /// Contribute then integrate; returns the move-by candidates
    pub fn mix(
        &mut self,
        pool: &ThreadPool,
        frame: &MixFrame,
        emitters: &mut [Emitter],
        definitions: &DefinitionTable,
        diagnostics: &Sender<Diagnostic>,
    ) -> Vec<EmitterId> {
        self.contribute(pool, frame, emitters, definitions, diagnostics);
        self.integrate();
        self.take_candidates()
    }

    /// Parallel phase: track every emitter and add its gains to scratch
    pub fn contribute(
        &mut self,
        pool: &ThreadPool,
        frame: &MixFrame,
        emitters: &mut [Emitter],
        definitions: &DefinitionTable,
        diagnostics: &Sender<Diagnostic>,
    ) {
        let part_len = emitters.len().div_ceil(self.rows).max(1);
        let voices = self.voices;
        let stride = self.stride;
        let candidates = &self.candidates;
        let scratch = &mut self.scratch;

        pool.install(|| {
            scratch
                .par_chunks_mut(stride)
                .zip(emitters.par_chunks_mut(part_len))
                .for_each(|(row, part)| {
                    for emitter in part {
                        track(emitter, frame, candidates);
                        contribute_emitter(emitter, row, voices, frame, definitions, diagnostics);
                    }
                });
        });
    }

    /// Sequential phase: fold scratch rows into the final mix and zero them
    pub fn integrate(&mut self) {
        for (voice, out) in self.final_mix.iter_mut().enumerate() {
            let mut sum = VoiceMix::ZERO;
            for row in 0..self.rows {
                let cell = &mut self.scratch[row * self.stride + voice];
                sum += *cell;
                *cell = VoiceMix::ZERO;
            }
            *out = sum;
        }
    }

    /// Candidates queued since the last call
    pub fn take_candidates(&mut self) -> Vec<EmitterId> {
        let mut out = Vec::with_capacity(self.candidates.len());
        while let Some(id) = self.candidates.pop() {
            out.push(id);
        }
        out
    }
}

/// Update distance, pan and presence; queue close emitters as candidates
fn track(emitter: &mut Emitter, frame: &MixFrame, candidates: &SegQueue<EmitterId>) {
    let position = emitter.attributes.position;
    let local = frame.listener.world_to_local.transform_point3(position);
    let distance = position.distance(frame.listener.position);
    let (left, right) = pan_gains(local);

    let tracking = &mut emitter.tracking;
    tracking.prev_distance = tracking.distance;
    tracking.distance = distance;
    tracking.left = left;
    tracking.right = right;

    let target = presence(distance, frame.spatial.falloff_curve);
    tracking.presence = if target > tracking.presence {
        target
    } else {
        tracking.presence * frame.spatial.move_by_pole.powf(frame.dt)
    };

    if distance < MOVE_BY_RADIUS {
        candidates.push(emitter.id);
    }
}

fn contribute_emitter(
    emitter: &mut Emitter,
    row: &mut [VoiceMix],
    voices: usize,
    frame: &MixFrame,
    definitions: &DefinitionTable,
    diagnostics: &Sender<Diagnostic>,
) {
    let handle = match emitter.definition {
        Some(handle) => handle,
        None => match definitions.resolve(emitter.attributes.definition) {
            Some(handle) => {
                emitter.definition = Some(handle);
                handle
            }
            None => {
                if !emitter.reported {
                    emitter.reported = true;
                    let _ = diagnostics.send(Diagnostic::UnresolvedDefinition {
                        emitter: emitter.id,
                        definition: emitter.attributes.definition,
                    });
                }
                return;
            }
        },
    };
    let Some(definition) = definitions.get(handle) else {
        return;
    };

    let position = emitter.attributes.position;
    let seed = spatial_seed(position);
    if !definition.passes_probability(seed) {
        return;
    }
    let distance = emitter.tracking.distance;
    if distance > 2.0 * definition.max_distance {
        return;
    }

    let voice = match emitter.voice {
        Some(voice) => voice,
        None => {
            let voice = definition.voice_for(seed);
            if voice >= voices {
                if !emitter.reported {
                    emitter.reported = true;
                    let _ = diagnostics.send(Diagnostic::VoiceOutOfRange {
                        emitter: emitter.id,
                        voice,
                        voices,
                    });
                }
                return;
            }
            emitter.voice = Some(voice);
            voice
        }
    };

    if let Some(cell) = row.get_mut(voice) {
        *cell += panning_additive(
            &frame.listener,
            position,
            emitter.attributes.cone_direction,
            definition,
            distance,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticQueue;
    use crate::field::EmitterDefinition;
    use crate::scene::{EmitterAttributes, EmitterTable};
    use crate::types::DefinitionId;
    use glam::Vec3;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    struct Fixture {
        pool: ThreadPool,
        mixer: FieldMixer,
        table: EmitterTable,
        definitions: DefinitionTable,
        diagnostics: DiagnosticQueue,
        frame: MixFrame,
    }

    impl Fixture {
        fn new(voices: usize) -> Self {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
            let mut mixer = FieldMixer::new(pool.current_num_threads());
            mixer.set_voice_count(voices);
            let mut definitions = DefinitionTable::new();
            definitions.define(
                DefinitionId(0),
                EmitterDefinition {
                    voice_index_max: voices as u32,
                    ..EmitterDefinition::default()
                },
            );
            Self {
                pool,
                mixer,
                table: EmitterTable::new(),
                definitions,
                diagnostics: DiagnosticQueue::new(),
                frame: MixFrame {
                    listener: Pose::at(Vec3::ZERO),
                    dt: 1.0 / 60.0,
                    spatial: SpatialParams::default(),
                },
            }
        }

        fn add(&mut self, id: u32, position: Vec3) {
            self.table
                .upsert(EmitterId(id), EmitterAttributes::new(position, DefinitionId(0)));
        }

        fn mix(&mut self) -> Vec<EmitterId> {
            self.table.attach_new(self.frame.listener.position);
            self.mixer.mix(
                &self.pool,
                &self.frame,
                self.table.as_mut_slice(),
                &self.definitions,
                self.diagnostics.sender(),
            )
        }
    }

    #[test]
    fn test_scratch_is_clear_after_integration() {
        let mut fx = Fixture::new(3);
        for i in 0..50 {
            fx.add(i, Vec3::new(i as f32 - 25.0, 0.0, 7.0));
        }
        fx.table.attach_new(Vec3::ZERO);
        fx.mixer.contribute(
            &fx.pool,
            &fx.frame,
            fx.table.as_mut_slice(),
            &fx.definitions,
            fx.diagnostics.sender(),
        );
        assert!(!fx.mixer.scratch_is_clear(), "contributions should land in scratch");
        fx.mixer.integrate();
        assert!(fx.mixer.scratch_is_clear());
        assert!(fx.mixer.final_mix().iter().any(|m| m.total() > 0.0));
    }

    #[test]
    fn test_each_partition_writes_only_its_row() {
        let mut fx = Fixture::new(1);
        assert_eq!(fx.mixer.rows(), 4);
        // Three emitters over four rows: partitions of one, the last row idle
        for i in 0..3 {
            fx.add(i, Vec3::new(4.0 + i as f32, 0.0, 1.0));
        }
        fx.table.attach_new(Vec3::ZERO);
        fx.mixer.contribute(
            &fx.pool,
            &fx.frame,
            fx.table.as_mut_slice(),
            &fx.definitions,
            fx.diagnostics.sender(),
        );
        let stride = fx.mixer.stride;
        let rows: Vec<bool> = (0..4).map(|r| !fx.mixer.scratch[r * stride].is_zero()).collect();
        assert_eq!(rows, vec![true, true, true, false]);
    }

    #[test]
    fn test_single_emitter_lands_on_its_voice() {
        let mut fx = Fixture::new(4);
        fx.definitions.define(
            DefinitionId(0),
            EmitterDefinition {
                voice_index_min: 2,
                voice_index_max: 3,
                ..EmitterDefinition::default()
            },
        );
        fx.add(1, Vec3::new(5.0, 0.0, 0.0));
        fx.mix();
        let mix = fx.mixer.final_mix();
        assert!(mix[2].direct_right > mix[2].direct_left);
        for v in [0, 1, 3] {
            assert!(mix[v].is_zero(), "voice {} should be silent", v);
        }
        assert_eq!(fx.table.get(EmitterId(1)).unwrap().voice(), Some(2));
    }

    #[test]
    fn test_emitter_beyond_twice_max_contributes_nothing() {
        let mut fx = Fixture::new(1);
        fx.add(1, Vec3::new(0.0, 0.0, 200.5));
        fx.mix();
        assert!(fx.mixer.final_mix()[0].is_zero());

        fx.table
            .upsert(EmitterId(1), EmitterAttributes::new(Vec3::new(0.0, 0.0, 199.0), DefinitionId(0)));
        fx.mix();
        assert!(fx.mixer.final_mix()[0].total() > 0.0);
    }

    #[test]
    fn test_probability_culls_deterministically() {
        let mut fx = Fixture::new(1);
        fx.definitions.define(
            DefinitionId(0),
            EmitterDefinition {
                probability: 50.0,
                ..EmitterDefinition::default()
            },
        );
        // seed 5 → frac 0.85 (culled), seed 2 → frac 0.34 (kept)
        fx.add(1, Vec3::new(5.0, 0.0, 1.0));
        fx.mix();
        assert!(fx.mixer.final_mix()[0].is_zero());
        fx.add(2, Vec3::new(2.0, 0.0, 1.0));
        fx.mix();
        assert!(fx.mixer.final_mix()[0].total() > 0.0);
    }

    #[test]
    fn test_mixing_twice_is_idempotent() {
        let mut fx = Fixture::new(2);
        for i in 0..40 {
            fx.add(i, Vec3::new((i as f32 * 1.7).sin() * 30.0, 1.0, (i as f32 * 0.9).cos() * 30.0));
        }
        fx.mix();
        let first = fx.mixer.final_mix().to_vec();
        fx.mix();
        assert_eq!(fx.mixer.final_mix(), first.as_slice());
    }

    #[test]
    fn test_unresolved_definition_is_reported_once() {
        let mut fx = Fixture::new(1);
        fx.table
            .upsert(EmitterId(4), EmitterAttributes::new(Vec3::X, DefinitionId(42)));
        fx.mix();
        fx.mix();
        let diags = fx.diagnostics.drain();
        assert_eq!(
            diags,
            vec![Diagnostic::UnresolvedDefinition {
                emitter: EmitterId(4),
                definition: DefinitionId(42)
            }]
        );
        assert!(fx.mixer.final_mix()[0].is_zero());
        assert!(!fx.table.get(EmitterId(4)).unwrap().is_resolved());
    }

    #[test]
    fn test_voice_past_registered_voices_is_skipped() {
        let mut fx = Fixture::new(1);
        fx.definitions.define(
            DefinitionId(0),
            EmitterDefinition {
                voice_index_min: 5,
                voice_index_max: 6,
                ..EmitterDefinition::default()
            },
        );
        fx.add(1, Vec3::new(3.0, 0.0, 0.0));
        fx.mix();
        assert!(fx.mixer.final_mix()[0].is_zero());
        assert!(matches!(
            fx.diagnostics.drain().as_slice(),
            [Diagnostic::VoiceOutOfRange { voice: 5, voices: 1, .. }]
        ));
    }

    #[test]
    fn test_candidates_are_close_emitters() {
        let mut fx = Fixture::new(1);
        fx.add(1, Vec3::new(0.0, 0.0, 14.0));
        fx.add(2, Vec3::new(0.0, 0.0, 16.0));
        fx.add(3, Vec3::new(-3.0, 0.0, 0.0));
        let mut candidates = fx.mix();
        candidates.sort();
        assert_eq!(candidates, vec![EmitterId(1), EmitterId(3)]);
    }

    #[test]
    fn test_presence_rises_instantly_and_decays_with_pole() {
        let mut fx = Fixture::new(1);
        fx.frame.dt = 1.0;
        fx.add(1, Vec3::new(0.0, 0.0, 2.0));
        fx.mix();
        assert_eq!(fx.table.get(EmitterId(1)).unwrap().tracking.presence, 1.0);

        fx.table
            .upsert(EmitterId(1), EmitterAttributes::new(Vec3::new(0.0, 0.0, 50.0), DefinitionId(0)));
        fx.mix();
        let tracking = fx.table.get(EmitterId(1)).unwrap().tracking;
        assert!((tracking.presence - fx.frame.spatial.move_by_pole).abs() < 1e-6);
        assert_eq!(tracking.prev_distance, 2.0);
        assert_eq!(tracking.distance, 50.0);
    }

    fn final_mix_for(positions: &[Vec3], voices: usize) -> Vec<VoiceMix> {
        let mut fx = Fixture::new(voices);
        for (i, p) in positions.iter().enumerate() {
            fx.add(i as u32, *p);
        }
        fx.mix();
        fx.mixer.final_mix().to_vec()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_shuffled_emitters_mix_the_same(
            coords in prop::collection::vec((-150.0f32..150.0, -5.0f32..5.0, -150.0f32..150.0), 1..200),
            seed in any::<u64>(),
        ) {
            let positions: Vec<Vec3> = coords.iter().map(|&(x, y, z)| Vec3::new(x, y, z)).collect();
            let mut shuffled = positions.clone();
            shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

            let a = final_mix_for(&positions, 3);
            let b = final_mix_for(&shuffled, 3);
            // One rounding step per addition, scaled by the number of emitters
            let n = positions.len() as f32;
            let close = |x: f32, y: f32| (x - y).abs() <= 4.0 * f32::EPSILON * n * x.abs().max(1.0);
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert!(close(x.direct_left, y.direct_left), "{:?} vs {:?}", x, y);
                prop_assert!(close(x.direct_right, y.direct_right), "{:?} vs {:?}", x, y);
                prop_assert!(close(x.lpf_left, y.lpf_left), "{:?} vs {:?}", x, y);
                prop_assert!(close(x.lpf_right, y.lpf_right), "{:?} vs {:?}", x, y);
            }
        }
    }
}
