//! Move-by pools, spawning and lifetimes

use crossbeam::channel::Sender;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::MoveByParams;
use crate::diagnostics::Diagnostic;
use crate::playback::{PlaybackRequest, SamplePlaybackRegistry};
use crate::scene::{BarrierBuffer, Emitter, EmitterTable};
use crate::types::{ClipId, EmitterId, PlaybackId};

/// Distance inside which move-by volume stops growing
const NEAR_DISTANCE: f32 = 3.0;

/// Which pool a voice belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntensityClass {
    High,
    Low,
}

/// One pooled move-by voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveByVoice {
    /// Sample entity the move-by playback is installed on
    pub entity: PlaybackId,
    pub clip: ClipId,
    /// Clip length in seconds
    pub clip_length: f32,
    pub class: IntensityClass,
}

/// A move-by currently holding a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveMoveBy {
    /// Emitter driving the pan
    pub emitter: EmitterId,
    /// Index into the voice table
    pub voice: usize,
    /// Seconds left before the voice returns to its pool
    pub timeout: f32,
    pub pitch: f32,
    pub left: f32,
    pub right: f32,
}

/// A move-by created by `setup`, installed at the move-by barrier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveBySpawn {
    pub active: ActiveMoveBy,
    pub request: PlaybackRequest,
}

/// Outcome of one `setup` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupStats {
    pub spawned: usize,
    /// Candidates slower than `min_speed`
    pub too_slow: usize,
    /// Candidates dropped because both pools were empty
    pub dropped: usize,
}

/// Outcome of one `update_alive` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliveStats {
    pub alive: usize,
    pub expired: usize,
    /// Move-bys whose emitter disappeared
    pub orphaned: usize,
}

/// Pooled move-by voices and the move-bys holding them
#[derive(Debug)]
pub struct MoveByAllocator {
    voices: Vec<MoveByVoice>,
    high_free: Vec<usize>,
    low_free: Vec<usize>,
    active: Vec<ActiveMoveBy>,
    /// Voices popped by `setup` whose spawn has not been applied yet
    in_flight: usize,
    rng: StdRng,
}

impl MoveByAllocator {
    pub fn new(seed: u64) -> Self {
        Self {
            voices: Vec::new(),
            high_free: Vec::new(),
            low_free: Vec::new(),
            active: Vec::new(),
            in_flight: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Add a voice to the pool of its class; returns its index
    pub fn add_voice(&mut self, voice: MoveByVoice) -> usize {
        let index = self.voices.len();
        self.voices.push(voice);
        self.free_list_mut(voice.class).push(index);
        log::debug!(
            "Move-by voice {} ({:?}, {:.2}s) on {}",
            index,
            voice.class,
            voice.clip_length,
            voice.entity
        );
        index
    }

    pub fn voice(&self, index: usize) -> Option<&MoveByVoice> {
        self.voices.get(index)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn active(&self) -> &[ActiveMoveBy] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, emitter: EmitterId) -> bool {
        self.active.iter().any(|m| m.emitter == emitter)
    }

    /// Free voice indices of a class
    pub fn free(&self, class: IntensityClass) -> &[usize] {
        match class {
            IntensityClass::High => &self.high_free,
            IntensityClass::Low => &self.low_free,
        }
    }

    /// Every voice index is in exactly one free list or held by exactly one
    /// active move-by
    pub fn pools_consistent(&self) -> bool {
        let mut seen = vec![0u32; self.voices.len()];
        let held = self.active.iter().map(|m| m.voice);
        for index in self.high_free.iter().chain(&self.low_free).copied().chain(held) {
            match seen.get_mut(index) {
                Some(count) => *count += 1,
                None => return false,
            }
        }
        self.in_flight == 0 && seen.iter().all(|&c| c == 1)
    }

    // ─────────────────────────────────────────────────────────────
    // Frame steps
    // ─────────────────────────────────────────────────────────────

    /// Pick up to the free capacity of candidates, nearest first
    ///
    /// Distances are compared truncated to whole units; ties fall back to
    /// emitter id. Emitters that already drive a move-by are skipped.
    pub fn select(&self, candidates: &[EmitterId], emitters: &EmitterTable) -> Vec<EmitterId> {
        let capacity = self
            .voices
            .len()
            .saturating_sub(self.active.len() + self.in_flight);
        if capacity == 0 {
            return Vec::new();
        }

        let mut sorted: Vec<(i64, EmitterId)> = candidates
            .iter()
            .filter(|id| !self.is_active(**id))
            .filter_map(|id| emitters.get(*id).map(|e| (e.tracking.distance as i64, *id)))
            .collect();
        sorted.sort_unstable();
        sorted.dedup_by_key(|(_, id)| *id);
        sorted.into_iter().take(capacity).map(|(_, id)| id).collect()
    }

    /// Turn selected emitters into move-by spawns
    pub fn setup(
        &mut self,
        selection: &[EmitterId],
        emitters: &EmitterTable,
        params: &MoveByParams,
        dt: f32,
        spawns: &BarrierBuffer<MoveBySpawn>,
    ) -> SetupStats {
        let mut stats = SetupStats::default();
        let span = (params.max_speed - params.min_speed).max(f32::EPSILON);

        for (n, id) in selection.iter().enumerate() {
            let Some(emitter) = emitters.get(*id) else {
                continue;
            };
            let speed = emitter.tracking.closing_speed(dt);
            if speed < params.min_speed {
                stats.too_slow += 1;
                continue;
            }

            let is_fast = speed > params.fast_threshold;
            let intensity = (speed - params.min_speed) / span;
            let pitch = (0.5 + 0.5 * intensity) * if is_fast { params.fast_pitch_mul } else { 1.0 };
            let layer = if is_fast {
                params.high_layer
            } else {
                params.low_layer
            };

            let preferred = if is_fast {
                IntensityClass::High
            } else {
                IntensityClass::Low
            };
            let Some(index) = self.pop_voice(preferred) else {
                stats.dropped += selection.len() - n;
                break;
            };
            let voice = self.voices[index];
            self.in_flight += 1;

            let distance = emitter.tracking.distance;
            let attenuation = params.volume * (1.0 / (distance - NEAR_DISTANCE).max(1.0).sqrt()).min(0.5);
            let volume = layer * intensity.max(0.0).sqrt().min(1.0) * attenuation;
            let (left, right) = move_by_pan(emitter);

            spawns.push(MoveBySpawn {
                active: ActiveMoveBy {
                    emitter: *id,
                    voice: index,
                    timeout: voice.clip_length / pitch.max(f32::EPSILON),
                    pitch,
                    left,
                    right,
                },
                request: PlaybackRequest::one_shot(voice.clip, pitch, volume, left, right),
            });
            stats.spawned += 1;
        }
        stats
    }

    /// Age active move-bys, follow their emitters and retire the finished
    /// or orphaned ones
    pub fn update_alive(
        &mut self,
        dt: f32,
        emitters: &EmitterTable,
        registry: &mut SamplePlaybackRegistry,
    ) -> AliveStats {
        let mut stats = AliveStats::default();
        let mut i = 0;
        while i < self.active.len() {
            let mut current = self.active[i];
            let entity = self.voices[current.voice].entity;

            let Some(emitter) = emitters.get(current.emitter) else {
                self.retire(i, registry);
                stats.orphaned += 1;
                continue;
            };

            current.timeout -= dt;
            if current.timeout <= 0.0 {
                self.retire(i, registry);
                stats.expired += 1;
                continue;
            }

            let (left, right) = move_by_pan(emitter);
            current.left = left;
            current.right = right;
            if let Some(request) = registry.request_mut(entity) {
                request.left = left;
                request.right = right;
            }
            self.active[i] = current;
            stats.alive += 1;
            i += 1;
        }
        stats
    }

    /// Install spawned move-bys (move-by barrier)
    pub fn apply_spawns(
        &mut self,
        spawns: Vec<MoveBySpawn>,
        registry: &mut SamplePlaybackRegistry,
        diagnostics: &Sender<Diagnostic>,
    ) -> usize {
        let mut installed = 0;
        for spawn in spawns {
            self.in_flight = self.in_flight.saturating_sub(1);
            let voice = self.voices[spawn.active.voice];
            match registry.set_request(voice.entity, spawn.request) {
                Ok(()) => {
                    self.active.push(spawn.active);
                    installed += 1;
                }
                Err(e) => {
                    self.free_list_mut(voice.class).push(spawn.active.voice);
                    let _ = diagnostics.send(Diagnostic::MoveByRejected {
                        entity: voice.entity,
                        reason: e.to_string(),
                    });
                }
            }
        }
        installed
    }

    /// Return spawns that will never be applied to their pools
    pub fn cancel_spawns(&mut self, spawns: Vec<MoveBySpawn>) {
        for spawn in spawns {
            self.in_flight = self.in_flight.saturating_sub(1);
            let class = self.voices[spawn.active.voice].class;
            self.free_list_mut(class).push(spawn.active.voice);
        }
    }

    /// Stop every move-by (shutdown)
    pub fn release_all(&mut self, registry: &mut SamplePlaybackRegistry) {
        while !self.active.is_empty() {
            self.retire(self.active.len() - 1, registry);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Pools
    // ─────────────────────────────────────────────────────────────

    fn free_list_mut(&mut self, class: IntensityClass) -> &mut Vec<usize> {
        match class {
            IntensityClass::High => &mut self.high_free,
            IntensityClass::Low => &mut self.low_free,
        }
    }

    /// Pop a random free voice, preferring `class`
    fn pop_voice(&mut self, class: IntensityClass) -> Option<usize> {
        let (first, second) = match class {
            IntensityClass::High => (&mut self.high_free, &mut self.low_free),
            IntensityClass::Low => (&mut self.low_free, &mut self.high_free),
        };
        let list = if first.is_empty() { second } else { first };
        if list.is_empty() {
            return None;
        }
        let k = self.rng.gen_range(0..list.len());
        Some(list.swap_remove(k))
    }

    /// Free the voice of active move-by `i` and stop its playback
    fn retire(&mut self, i: usize, registry: &mut SamplePlaybackRegistry) {
        let done = self.active.swap_remove(i);
        let voice = self.voices[done.voice];
        self.free_list_mut(voice.class).push(done.voice);
        if let Err(e) = registry.remove_request(voice.entity) {
            log::error!("Move-by voice {} lost its entity: {}", done.voice, e);
        }
        log::debug!("Move-by on {} released voice {}", done.emitter, done.voice);
    }
}

/// Emitter pan scaled by its presence
fn move_by_pan(emitter: &Emitter) -> (f32, f32) {
    let t = &emitter.tracking;
    (t.left * t.presence, t.right * t.presence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticQueue;
    use crate::graph::{PortRef, ROOT_NODE};
    use crate::scene::{EmitterAttributes, EmitterTracking};
    use crate::types::DefinitionId;
    use glam::Vec3;

    const DT: f32 = 0.1;

    struct Fixture {
        allocator: MoveByAllocator,
        registry: SamplePlaybackRegistry,
        emitters: EmitterTable,
        spawns: BarrierBuffer<MoveBySpawn>,
        diagnostics: DiagnosticQueue,
        params: MoveByParams,
    }

    impl Fixture {
        fn new(high: usize, low: usize) -> Self {
            let mut registry = SamplePlaybackRegistry::new(PortRef::new(ROOT_NODE, 0), 48000, 64);
            let mut allocator = MoveByAllocator::new(7);
            for (count, class) in [(high, IntensityClass::High), (low, IntensityClass::Low)] {
                for _ in 0..count {
                    allocator.add_voice(MoveByVoice {
                        entity: registry.create_entity(),
                        clip: ClipId(0),
                        clip_length: 0.5,
                        class,
                    });
                }
            }
            Self {
                allocator,
                registry,
                emitters: EmitterTable::new(),
                spawns: BarrierBuffer::new(),
                diagnostics: DiagnosticQueue::new(),
                params: MoveByParams {
                    min_speed: 10.0,
                    max_speed: 200.0,
                    ..MoveByParams::default()
                },
            }
        }

        /// Emitter that moved from `prev` to `distance` over one frame
        fn approaching(&mut self, id: u32, prev: f32, distance: f32) -> EmitterId {
            let id = EmitterId(id);
            self.emitters
                .upsert(id, EmitterAttributes::new(Vec3::new(0.0, 0.0, distance), DefinitionId(0)));
            self.emitters.attach_new(Vec3::ZERO);
            let emitter = self.emitters.get_mut(id).unwrap();
            emitter.tracking = EmitterTracking {
                distance,
                prev_distance: prev,
                left: 0.25,
                right: 0.75,
                presence: 1.0,
            };
            id
        }

        fn frame(&mut self, candidates: &[EmitterId]) -> (SetupStats, AliveStats) {
            let selection = self.allocator.select(candidates, &self.emitters);
            let setup = self
                .allocator
                .setup(&selection, &self.emitters, &self.params, DT, &self.spawns);
            let alive = self
                .allocator
                .update_alive(DT, &self.emitters, &mut self.registry);
            let spawns = self.spawns.drain();
            self.allocator
                .apply_spawns(spawns, &mut self.registry, self.diagnostics.sender());
            assert!(self.allocator.pools_consistent(), "free lists out of sync");
            (setup, alive)
        }
    }

    #[test]
    fn test_fast_emitter_takes_high_voice() {
        let mut fx = Fixture::new(1, 1);
        // 7 units in 0.1s = 70 u/s, above the 60 u/s fast threshold
        let id = fx.approaching(1, 12.0, 5.0);
        let (setup, _) = fx.frame(&[id]);
        assert_eq!(setup.spawned, 1);
        assert!(fx.allocator.free(IntensityClass::High).is_empty());
        assert_eq!(fx.allocator.free(IntensityClass::Low).len(), 1);

        let active = fx.allocator.active()[0];
        let intensity = 60.0 / 190.0;
        let pitch = (0.5 + 0.5 * intensity) * 0.8;
        assert!((active.pitch - pitch).abs() < 1e-5);
        assert!((active.timeout - 0.5 / pitch).abs() < 1e-4);

        let entity = fx.allocator.voice(active.voice).unwrap().entity;
        let request = fx.registry.request(entity).unwrap();
        let expected_volume = 1.0 * intensity.sqrt() * (1.0 / 2f32.sqrt()).min(0.5);
        assert!((request.volume - expected_volume).abs() < 1e-5, "volume {}", request.volume);
        assert!(!request.looping && !request.filtered);
        assert_eq!((request.left, request.right), (0.25, 0.75));
    }

    #[test]
    fn test_slow_emitter_is_discarded() {
        let mut fx = Fixture::new(1, 1);
        let id = fx.approaching(1, 10.5, 10.0); // 5 u/s
        let (setup, _) = fx.frame(&[id]);
        assert_eq!(setup.too_slow, 1);
        assert_eq!(fx.allocator.active_count(), 0);
    }

    #[test]
    fn test_empty_class_falls_back_to_other_pool() {
        let mut fx = Fixture::new(0, 2);
        let id = fx.approaching(1, 14.0, 5.0);
        fx.frame(&[id]);
        assert_eq!(fx.allocator.active_count(), 1);
        let voice = fx.allocator.active()[0].voice;
        assert_eq!(fx.allocator.voice(voice).unwrap().class, IntensityClass::Low);
    }

    #[test]
    fn test_exhausted_pools_drop_candidates() {
        let mut fx = Fixture::new(4, 0);
        let ids: Vec<EmitterId> = (0..10).map(|i| fx.approaching(i, 14.0, 5.0 + i as f32 * 0.1)).collect();
        fx.frame(&ids);
        assert_eq!(fx.allocator.active_count(), 4);
        // Nearest first
        let mut held: Vec<u32> = fx.allocator.active().iter().map(|m| m.emitter.0).collect();
        held.sort_unstable();
        assert_eq!(held, vec![0, 1, 2, 3]);

        let (setup, _) = fx.frame(&ids);
        assert_eq!(setup.spawned, 0);
        assert_eq!(fx.allocator.active_count(), 4);
    }

    #[test]
    fn test_setup_drops_rest_when_pools_run_dry() {
        let mut fx = Fixture::new(1, 0);
        let a = fx.approaching(1, 14.0, 5.0);
        let b = fx.approaching(2, 14.0, 6.0);
        let stats = fx
            .allocator
            .setup(&[a, b], &fx.emitters, &fx.params, DT, &fx.spawns);
        assert_eq!(stats.spawned, 1);
        assert_eq!(stats.dropped, 1);
        let spawns = fx.spawns.drain();
        fx.allocator.cancel_spawns(spawns);
        assert!(fx.allocator.pools_consistent());
    }

    #[test]
    fn test_voice_returns_to_its_pool_after_timeout() {
        let mut fx = Fixture::new(1, 0);
        let id = fx.approaching(1, 14.0, 5.0);
        fx.frame(&[id]);
        let timeout = fx.allocator.active()[0].timeout;
        let entity = fx.allocator.voice(0).unwrap().entity;

        // Emitter stops moving; no new spawns
        fx.emitters.get_mut(id).unwrap().tracking.prev_distance = 5.0;
        let frames = (timeout / DT).ceil() as usize;
        for _ in 0..frames - 1 {
            fx.frame(&[]);
            assert_eq!(fx.allocator.active_count(), 1);
        }
        let (_, alive) = fx.frame(&[]);
        assert_eq!(alive.expired, 1);
        assert_eq!(fx.allocator.free(IntensityClass::High), &[0]);
        assert!(fx.registry.request(entity).is_none());
    }

    #[test]
    fn test_alive_move_by_follows_emitter_pan() {
        let mut fx = Fixture::new(1, 0);
        let id = fx.approaching(1, 14.0, 5.0);
        fx.frame(&[id]);
        {
            let tracking = &mut fx.emitters.get_mut(id).unwrap().tracking;
            tracking.left = 1.0;
            tracking.right = 0.0;
            tracking.presence = 0.5;
        }
        fx.frame(&[]);
        let entity = fx.allocator.voice(0).unwrap().entity;
        let request = fx.registry.request(entity).unwrap();
        assert_eq!((request.left, request.right), (0.5, 0.0));
    }

    #[test]
    fn test_orphaned_move_by_frees_voice() {
        let mut fx = Fixture::new(1, 0);
        let id = fx.approaching(1, 14.0, 5.0);
        fx.frame(&[id]);
        fx.emitters.remove(id).unwrap();
        fx.emitters.detach_dead();
        let (_, alive) = fx.frame(&[]);
        assert_eq!(alive.orphaned, 1);
        assert_eq!(fx.allocator.free(IntensityClass::High), &[0]);
    }

    #[test]
    fn test_rejected_spawn_returns_voice() {
        let mut fx = Fixture::new(1, 0);
        let entity = fx.allocator.voice(0).unwrap().entity;
        fx.registry.destroy_entity(entity).unwrap();
        let id = fx.approaching(1, 14.0, 5.0);
        fx.frame(&[id]);
        assert_eq!(fx.allocator.active_count(), 0);
        assert!(matches!(
            fx.diagnostics.drain().as_slice(),
            [Diagnostic::MoveByRejected { .. }]
        ));
    }

    #[test]
    fn test_pools_stay_consistent_under_churn() {
        let mut fx = Fixture::new(3, 3);
        let mut rng = StdRng::seed_from_u64(99);
        let mut next_id = 0;
        for _ in 0..300 {
            let mut candidates = Vec::new();
            for _ in 0..rng.gen_range(0..5) {
                let prev = rng.gen_range(5.0..15.0);
                let now = prev - rng.gen_range(0.0..12.0);
                candidates.push(fx.approaching(next_id, prev, now.max(0.0)));
                next_id += 1;
            }
            if rng.gen_bool(0.2) {
                if let Some(m) = fx.allocator.active().first().copied() {
                    fx.emitters.remove(m.emitter).unwrap();
                    fx.emitters.detach_dead();
                }
            }
            fx.frame(&candidates);
            assert!(fx.allocator.active_count() <= 6);
        }
        fx.allocator.release_all(&mut fx.registry);
        assert!(fx.allocator.pools_consistent());
        assert_eq!(fx.allocator.free(IntensityClass::High).len(), 3);
        assert_eq!(fx.allocator.free(IntensityClass::Low).len(), 3);
    }
}
