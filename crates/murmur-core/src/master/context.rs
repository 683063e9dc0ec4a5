//! Host-facing audio context
//!
//! [`AudioContext`] is the one object a host talks to. It owns the graph
//! handle, clips, emitter and definition tables, the playback registry, the
//! master chain and the frame scheduler. The matching [`GraphRenderer`] is
//! handed back from [`AudioContext::new`] and belongs to the audio thread
//! (a cpal callback or an offline render loop).
//!
//! # Frame contract
//!
//! Call [`tick`](AudioContext::tick) once per host frame with the elapsed
//! seconds. A tick is a no-op unless the context is enabled, both the
//! listener and player poses are set, and at least one clip is registered.

use std::collections::HashMap;
use std::path::Path;

use crate::config::{EngineConfig, MasterParams, MoveByParams, SpatialParams};
use crate::dsp::{ClipData, KernelEvent};
use crate::error::{EngineError, EngineResult};
use crate::field::{DefinitionHandle, DefinitionTable, EmitterDefinition, FieldMixer};
use crate::graph::{graph_channel, GraphEvent, GraphFaults, GraphHandle, GraphRenderer, NodeId};
use crate::moveby::{IntensityClass, MoveByAllocator, MoveByVoice};
use crate::playback::{AssetStore, PlaybackRequest, SamplePlaybackRegistry};
use crate::scene::{Emitter, EmitterAttributes, EmitterTable};
use crate::types::{ClipId, DefinitionId, EmitterId, PlaybackId, Pose, Sample};

use super::chain::MasterChain;
use super::scheduler::{FrameInputs, FrameScheduler, FrameStats};

/// Spatial audio engine state owned by the main thread
pub struct AudioContext {
    config: EngineConfig,
    graph: GraphHandle,
    assets: AssetStore,
    registry: SamplePlaybackRegistry,
    chain: MasterChain,
    emitters: EmitterTable,
    definitions: DefinitionTable,
    /// Playback entity of each field voice, by voice index
    field_voices: Vec<PlaybackId>,
    scheduler: FrameScheduler,

    listener: Option<Pose>,
    player: Option<Pose>,
    enabled: bool,
    spatial: SpatialParams,
    move_by: MoveByParams,

    events: Vec<GraphEvent>,
    clip_stops: HashMap<NodeId, u64>,
    faults: GraphFaults,
    frames: u64,
}

impl AudioContext {
    /// Build a context and the renderer for its audio thread
    pub fn new(config: EngineConfig) -> EngineResult<(Self, GraphRenderer)> {
        let mut config = config;
        config.master = config.master.clamped();
        config.spatial = config.spatial.clamped();
        config.move_by = config.move_by.clamped();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("murmur-job-{}", i))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
        let scheduler = FrameScheduler::new(pool, config.rng_seed);

        let (mut graph, renderer) = graph_channel(&config);
        let lerp = config.effective_buffer_frames() as u32;
        let mut block = graph.create_command_block();
        let chain = MasterChain::build(&mut block, config.master, lerp)?;
        block.complete();

        let registry = SamplePlaybackRegistry::new(chain.input(), config.sample_rate, lerp);

        log::info!(
            "Audio context: {} Hz, {}-frame buffers, {} job workers",
            config.sample_rate,
            config.effective_buffer_frames(),
            scheduler.worker_count()
        );

        let context = Self {
            spatial: config.spatial,
            move_by: config.move_by,
            config,
            graph,
            assets: AssetStore::new(),
            registry,
            chain,
            emitters: EmitterTable::new(),
            definitions: DefinitionTable::new(),
            field_voices: Vec::new(),
            scheduler,
            listener: None,
            player: None,
            enabled: false,
            events: Vec::new(),
            clip_stops: HashMap::new(),
            faults: GraphFaults::default(),
            frames: 0,
        };
        Ok((context, renderer))
    }

    // ─────────────────────────────────────────────────────────────
    // Clips and voices
    // ─────────────────────────────────────────────────────────────

    pub fn register_clip(&mut self, clip: ClipData) -> ClipId {
        self.assets.register(clip)
    }

    /// Register raw interleaved samples
    pub fn register_samples(&mut self, samples: Vec<Sample>, channels: u16, sample_rate: u32) -> EngineResult<ClipId> {
        let clip = ClipData::from_interleaved(samples, channels, sample_rate)?;
        Ok(self.assets.register(clip))
    }

    /// Decode and register a WAV file
    pub fn load_clip(&mut self, path: &Path) -> EngineResult<ClipId> {
        let clip = ClipData::from_wav(path)?;
        Ok(self.assets.register(clip))
    }

    /// Add a looping, low-pass-filtered field voice; returns its voice index
    pub fn add_field_voice(&mut self, clip: ClipId) -> EngineResult<usize> {
        self.assets.get(clip)?;
        let entity = self.registry.create_entity();
        self.registry.set_request(entity, PlaybackRequest::field(clip))?;
        self.field_voices.push(entity);
        self.scheduler.mixer_mut().set_voice_count(self.field_voices.len());
        let voice = self.field_voices.len() - 1;
        log::info!("Field voice {} plays {} on {}", voice, clip, entity);
        Ok(voice)
    }

    /// Add a voice to the high-intensity move-by pool
    pub fn add_high_move_voice(&mut self, clip: ClipId) -> EngineResult<usize> {
        self.add_move_voice(clip, IntensityClass::High)
    }

    /// Add a voice to the low-intensity move-by pool
    pub fn add_low_move_voice(&mut self, clip: ClipId) -> EngineResult<usize> {
        self.add_move_voice(clip, IntensityClass::Low)
    }

    fn add_move_voice(&mut self, clip: ClipId, class: IntensityClass) -> EngineResult<usize> {
        let clip_length = self.assets.length_seconds(clip)?;
        let entity = self.registry.create_entity();
        Ok(self.scheduler.allocator_mut().add_voice(MoveByVoice {
            entity,
            clip,
            clip_length,
            class,
        }))
    }

    // ─────────────────────────────────────────────────────────────
    // Scene
    // ─────────────────────────────────────────────────────────────

    pub fn set_listener(&mut self, pose: Option<Pose>) {
        self.listener = pose;
    }

    pub fn set_player(&mut self, pose: Option<Pose>) {
        self.player = pose;
    }

    /// Insert or update an emitter; new emitters join on the next tick
    pub fn upsert_emitter(&mut self, id: EmitterId, attributes: EmitterAttributes) {
        self.emitters.upsert(id, attributes);
    }

    pub fn remove_emitter(&mut self, id: EmitterId) -> EngineResult<()> {
        self.emitters.remove(id)
    }

    pub fn define_emitter(&mut self, id: DefinitionId, definition: EmitterDefinition) -> DefinitionHandle {
        self.definitions.define(id, definition)
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters and enable
    // ─────────────────────────────────────────────────────────────

    pub fn set_master_params(&mut self, params: MasterParams) -> EngineResult<()> {
        let mut block = self.graph.create_command_block();
        self.chain.set_params(&mut block, params)?;
        block.complete();
        Ok(())
    }

    pub fn set_spatial_params(&mut self, params: SpatialParams) {
        self.spatial = params.clamped();
    }

    pub fn set_move_by_params(&mut self, params: MoveByParams) {
        self.move_by = params.clamped();
    }

    /// Fade the master in or out over the configured enable fade
    pub fn enable(&mut self, on: bool) -> EngineResult<()> {
        if on == self.enabled {
            return Ok(());
        }
        self.enabled = on;
        let mut block = self.graph.create_command_block();
        self.chain.set_fade(&mut block, on, self.config.enable_fade_samples())?;
        block.complete();
        log::info!(
            "Audio {} ({:.0} ms fade)",
            if on { "enabled" } else { "disabled" },
            self.config.enable_fade_ms
        );
        Ok(())
    }

    /// Enable flag set and both poses known
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.listener.is_some() && self.player.is_some()
    }

    // ─────────────────────────────────────────────────────────────
    // Frame
    // ─────────────────────────────────────────────────────────────

    /// Run one frame
    ///
    /// New graph faults abort the frame with [`EngineError::Internal`].
    pub fn tick(&mut self, dt: f32) -> EngineResult<FrameStats> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.graph.flush();

        let faults = self.poll_graph();
        if !faults.is_empty() {
            self.scheduler.discard();
            return Err(EngineError::Internal(faults.to_string()));
        }

        let listener = match self.listener {
            Some(listener) if self.is_enabled() && !self.assets.is_empty() => listener,
            _ => {
                self.scheduler.discard();
                return Ok(FrameStats::default());
            }
        };

        let stats = self.scheduler.run(FrameInputs {
            listener,
            dt,
            spatial: self.spatial,
            move_by: self.move_by,
            emitters: &mut self.emitters,
            definitions: &self.definitions,
            field_voices: &self.field_voices,
            registry: &mut self.registry,
            assets: &self.assets,
            graph: &mut self.graph,
        });
        for diagnostic in self.scheduler.drain_diagnostics() {
            diagnostic.log();
        }
        self.frames += 1;
        Ok(stats)
    }

    /// Drain audio-thread feedback; returns fault bits raised since the last poll
    fn poll_graph(&mut self) -> GraphFaults {
        self.graph.collect();
        while let Some(event) = self.graph.poll_event() {
            match event.event {
                KernelEvent::ClipStopped => {
                    *self.clip_stops.entry(event.node).or_insert(0) += 1;
                    match self.registry.on_clip_stopped(event.node) {
                        Some(entity) => log::debug!("{} reached the end of its clip", entity),
                        None => log::debug!("Clip stopped on released node {:?}", event.node),
                    }
                }
            }
            if self.events.len() < self.config.event_queue_capacity {
                self.events.push(event);
            }
        }

        let faults = self.graph.take_faults();
        if !faults.is_empty() {
            log::error!("Audio graph faults: {}", faults);
            self.faults = GraphFaults(self.faults.0 | faults.0);
        }
        faults
    }

    /// Kernel events received since the last call
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// How often the player on `node` ran out of clip
    pub fn clip_stop_count(&self, node: NodeId) -> u64 {
        self.clip_stops.get(&node).copied().unwrap_or(0)
    }

    /// Report (and clear) graph faults accumulated since the last call
    pub fn take_faults(&mut self) -> EngineResult<()> {
        let faults = std::mem::take(&mut self.faults);
        if faults.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Internal(faults.to_string()))
        }
    }

    /// Stop every playback and move-by; the master chain stays wired
    pub fn shutdown(&mut self) {
        self.enabled = false;
        self.scheduler.discard();
        self.scheduler.allocator_mut().release_all(&mut self.registry);
        let mut block = self.graph.create_command_block();
        let released = self.registry.release_all(&mut block);
        block.complete();
        log::info!("Audio context shut down, released {} playbacks", released);
    }

    // ─────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn master_params(&self) -> MasterParams {
        self.chain.params()
    }

    pub fn spatial_params(&self) -> SpatialParams {
        self.spatial
    }

    pub fn move_by_params(&self) -> MoveByParams {
        self.move_by
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&Emitter> {
        self.emitters.get(id)
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn clip_count(&self) -> usize {
        self.assets.len()
    }

    pub fn field_voice(&self, voice: usize) -> Option<PlaybackId> {
        self.field_voices.get(voice).copied()
    }

    pub fn field_voice_count(&self) -> usize {
        self.field_voices.len()
    }

    pub fn mixer(&self) -> &FieldMixer {
        self.scheduler.mixer()
    }

    pub fn move_bys(&self) -> &MoveByAllocator {
        self.scheduler.allocator()
    }

    pub fn playbacks(&self) -> &SamplePlaybackRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    /// Frames run since creation (early exits excluded)
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoBuffer;
    use glam::Vec3;

    const FRAMES: usize = 480;
    const DT: f32 = FRAMES as f32 / 48000.0;

    struct Rig {
        ctx: AudioContext,
        renderer: GraphRenderer,
    }

    impl Rig {
        fn new() -> Self {
            let config = EngineConfig {
                buffer_frames: FRAMES,
                worker_threads: 2,
                max_nodes: 256,
                max_connections: 512,
                enable_fade_ms: 0.0,
                ..EngineConfig::default()
            };
            let (ctx, renderer) = AudioContext::new(config).unwrap();
            Self { ctx, renderer }
        }

        fn start(&mut self) {
            self.ctx.set_listener(Some(Pose::at(Vec3::ZERO)));
            self.ctx.set_player(Some(Pose::at(Vec3::ZERO)));
            self.ctx.enable(true).unwrap();
        }

        fn define(&mut self, max_distance: f32) {
            self.ctx.define_emitter(
                DefinitionId(1),
                EmitterDefinition {
                    probability: 100.0,
                    max_distance,
                    ..EmitterDefinition::default()
                },
            );
        }

        fn place(&mut self, id: u32, position: Vec3) {
            self.ctx
                .upsert_emitter(EmitterId(id), EmitterAttributes::new(position, DefinitionId(1)));
        }

        fn step(&mut self) -> StereoBuffer {
            self.ctx.tick(DT).unwrap();
            let mut out = StereoBuffer::silence(FRAMES);
            self.renderer.render(&mut out);
            out
        }

        fn move_by_entities(&self) -> Vec<PlaybackId> {
            let allocator = self.ctx.move_bys();
            (0..allocator.voice_count())
                .filter_map(|i| allocator.voice(i).map(|v| v.entity))
                .collect()
        }
    }

    #[test]
    fn test_silence_without_emitters() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.start();
        for n in 0..12 {
            let out = rig.step();
            assert!(
                out.as_interleaved().iter().all(|s| *s == 0.0),
                "buffer {} is not silent",
                n
            );
        }
    }

    #[test]
    fn test_static_emitter_pans_to_its_side() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.define(100.0);
        rig.place(1, Vec3::new(5.0, 0.0, 0.0));
        rig.start();

        for _ in 0..8 {
            rig.step();
        }
        let (left, right) = rig.step().rms();
        assert!(right > 0.05, "emitter inaudible: {}", right);
        assert!(right > left, "right {} should exceed left {}", right, left);
        assert_eq!(rig.ctx.emitter(EmitterId(1)).unwrap().voice(), Some(0));
    }

    #[test]
    fn test_distance_cutoff_fades_to_zero() {
        let mut rig = Rig::new();
        // 100 Hz: one whole cycle per buffer
        let tone = rig.ctx.register_clip(ClipData::sine(100.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.define(50.0);
        rig.place(1, Vec3::new(10.0, 0.0, 0.0));
        rig.start();
        for _ in 0..3 {
            rig.step();
        }

        let mut previous = rig.step().rms().1;
        assert!(previous > 0.0);
        let mut distance = 10.0;
        while distance < 500.0 {
            let last_distance = distance;
            distance += 10.0;
            rig.place(1, Vec3::new(distance, 0.0, 0.0));
            let out = rig.step();
            let rms = out.rms().1;
            assert!(
                rms <= previous,
                "rms rose from {} to {} at distance {}",
                previous,
                rms,
                distance
            );
            if last_distance > 100.0 {
                assert!(
                    out.as_interleaved().iter().all(|s| *s == 0.0),
                    "audible at distance {}",
                    distance
                );
            }
            previous = rms;
        }
    }

    #[test]
    fn test_fast_approach_triggers_one_high_move_by() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        let whoosh = rig.ctx.register_clip(ClipData::sine(300.0, 0.5, 0.25, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        let high = rig.ctx.add_high_move_voice(whoosh).unwrap();
        rig.ctx.add_low_move_voice(whoosh).unwrap();
        let params = MoveByParams {
            min_speed: 10.0,
            max_speed: 200.0,
            ..MoveByParams::default()
        };
        rig.ctx.set_move_by_params(params);
        rig.define(100.0);
        rig.start();

        let speed = params.fast_threshold + 10.0;
        let mut z = 14.0;
        rig.place(1, Vec3::new(0.0, 0.0, z));
        rig.step();
        assert_eq!(rig.ctx.move_bys().active_count(), 0);

        for _ in 0..3 {
            z -= speed * DT;
            rig.place(1, Vec3::new(0.0, 0.0, z));
            rig.step();
        }
        let allocator = rig.ctx.move_bys();
        assert_eq!(allocator.active_count(), 1);
        let active = allocator.active()[0];
        assert_eq!(active.voice, high);
        assert!(allocator.free(IntensityClass::High).is_empty());
        assert_eq!(allocator.free(IntensityClass::Low).len(), 1);

        let intensity = (speed - 10.0) / 190.0;
        let pitch = (0.5 + 0.5 * intensity) * params.fast_pitch_mul;
        assert!((active.pitch - pitch).abs() < 1e-3, "pitch {} vs {}", active.pitch, pitch);
        let entity = allocator.voice(high).unwrap().entity;
        assert!(rig.ctx.playbacks().state(entity).is_some());

        // Already aged by two frames since the spawn
        let expected_frames = (0.25 / active.pitch / DT).ceil() as usize;
        let mut frames = 0;
        while rig.ctx.move_bys().active_count() > 0 {
            rig.step();
            frames += 1;
            assert!(frames <= expected_frames, "move-by outlived its clip");
        }
        assert!(frames + 2 >= expected_frames - 1, "released after {} frames", frames);
        assert_eq!(rig.ctx.move_bys().free(IntensityClass::High), &[high]);
        assert!(rig.ctx.playbacks().state(entity).is_none());
    }

    #[test]
    fn test_voice_exhaustion_caps_move_bys() {
        let mut rig = Rig::new();
        let whoosh = rig.ctx.register_clip(ClipData::sine(300.0, 0.5, 1.0, 48000));
        for _ in 0..4 {
            rig.ctx.add_high_move_voice(whoosh).unwrap();
        }
        rig.define(100.0);
        rig.start();

        let directions: Vec<Vec3> = (0..10)
            .map(|i| {
                let angle = i as f32 * 0.6;
                Vec3::new(angle.cos(), 0.0, angle.sin())
            })
            .collect();
        let start = 12.0;
        for (i, dir) in directions.iter().enumerate() {
            rig.place(i as u32, *dir * (start + i as f32 * 0.25));
        }
        rig.step();

        for frame in 1..=3 {
            for (i, dir) in directions.iter().enumerate() {
                let d = start + i as f32 * 0.25 - frame as f32 * 80.0 * DT;
                rig.place(i as u32, *dir * d);
            }
            rig.step();
            assert_eq!(rig.ctx.move_bys().active_count(), 4);
            let playing = rig
                .move_by_entities()
                .into_iter()
                .filter(|e| rig.ctx.playbacks().state(*e).is_some())
                .count();
            assert_eq!(playing, 4, "frame {}", frame);
        }
        assert!(rig.ctx.move_bys().pools_consistent());
    }

    #[test]
    fn test_limiter_holds_ceiling() {
        let mut rig = Rig::new();
        let hot = rig.ctx.register_samples(vec![0.99; 2 * 48000], 2, 48000).unwrap();
        rig.ctx
            .set_master_params(MasterParams {
                master_volume: 5.0,
                pre_gain_db: 0.0,
                threshold_db: -1.5,
                release_ms: 50.0,
            })
            .unwrap();
        let entity = rig.ctx.registry.create_entity();
        let request = PlaybackRequest {
            looping: true,
            ..PlaybackRequest::one_shot(hot, 1.0, 1.0, 1.0, 1.0)
        };
        rig.ctx.registry.set_request(entity, request).unwrap();
        rig.start();

        let ceiling = 10f32.powf(-1.5 / 20.0);
        for n in 0..12 {
            let out = rig.step();
            if n < 2 {
                continue;
            }
            let peak = out.peak();
            assert!(peak <= ceiling + 1e-5, "buffer {} peaks at {}", n, peak);
            assert!(peak > 0.05, "buffer {} was silenced", n);
        }
    }

    #[test]
    fn test_tick_is_noop_until_enabled_with_both_poses() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.ctx.enable(true).unwrap();
        rig.ctx.set_listener(Some(Pose::default()));
        assert!(!rig.ctx.is_enabled());
        assert_eq!(rig.ctx.tick(DT).unwrap(), FrameStats::default());
        // root + master gain + limiter only
        assert_eq!(rig.ctx.graph().node_count(), 3);

        rig.ctx.set_player(Some(Pose::default()));
        assert!(rig.ctx.is_enabled());
        let stats = rig.ctx.tick(DT).unwrap();
        assert_eq!(stats.sync.created, 1);
        assert_eq!(rig.ctx.frames(), 1);
    }

    #[test]
    fn test_no_clips_means_no_frame() {
        let mut rig = Rig::new();
        rig.start();
        rig.place(1, Vec3::X);
        assert_eq!(rig.ctx.tick(DT).unwrap(), FrameStats::default());
        assert_eq!(rig.ctx.emitter_count(), 0);
    }

    #[test]
    fn test_bad_arguments() {
        let mut rig = Rig::new();
        assert!(matches!(rig.ctx.add_field_voice(ClipId(9)), Err(EngineError::UnknownClip(_))));
        assert!(rig.ctx.add_high_move_voice(ClipId(9)).unwrap_err().is_bad_argument());
        assert!(matches!(
            rig.ctx.remove_emitter(EmitterId(4)),
            Err(EngineError::UnknownEmitter(_))
        ));
        assert!(rig.ctx.register_samples(vec![0.0; 3], 2, 48000).is_err());
    }

    #[test]
    fn test_params_are_clamped() {
        let mut rig = Rig::new();
        rig.ctx.set_spatial_params(SpatialParams {
            volume: 10.0,
            ..SpatialParams::default()
        });
        assert_eq!(rig.ctx.spatial_params().volume, 3.0);
        rig.ctx
            .set_master_params(MasterParams {
                threshold_db: 6.0,
                ..MasterParams::default()
            })
            .unwrap();
        assert_eq!(rig.ctx.master_params().threshold_db, 0.0);
    }

    #[test]
    fn test_removed_emitter_leaves_the_scene() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.define(100.0);
        rig.place(1, Vec3::new(5.0, 0.0, 0.0));
        rig.start();
        rig.step();
        assert_eq!(rig.ctx.emitter_count(), 1);

        rig.ctx.remove_emitter(EmitterId(1)).unwrap();
        let stats = rig.ctx.tick(DT).unwrap();
        assert_eq!(stats.detached, 1);
        assert_eq!(rig.ctx.emitter_count(), 0);
        assert!(rig.ctx.mixer().final_mix()[0].is_zero());
    }

    #[test]
    fn test_shutdown_releases_every_playback() {
        let mut rig = Rig::new();
        let tone = rig.ctx.register_clip(ClipData::sine(1000.0, 0.5, 1.0, 48000));
        rig.ctx.add_field_voice(tone).unwrap();
        rig.ctx.add_field_voice(tone).unwrap();
        rig.start();
        rig.step();
        assert_eq!(rig.ctx.playbacks().playing_count(), 2);

        rig.ctx.shutdown();
        assert_eq!(rig.ctx.playbacks().playing_count(), 0);
        assert_eq!(rig.ctx.graph().node_count(), 3);
        assert!(!rig.ctx.is_enabled());
        rig.renderer.render(&mut StereoBuffer::silence(FRAMES));
        rig.ctx.tick(DT).unwrap();
        rig.ctx.take_faults().unwrap();
    }
}
