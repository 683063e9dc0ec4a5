//! Animated demo scene
//!
//! Emitters orbit the listener on a few rings at different heights, and one
//! emitter repeatedly flies straight past the listener to trigger move-bys.

use std::f32::consts::TAU;

use glam::Vec3;
use murmur_core::types::{DefinitionId, EmitterId};
use murmur_core::{EmitterAttributes, EmitterDefinition};

const RINGS: usize = 4;
const FLYBY_ID: EmitterId = EmitterId(u32::MAX);
/// Half-length of the flyby track
const FLYBY_REACH: f32 = 60.0;

struct Orbit {
    id: EmitterId,
    radius: f32,
    phase: f32,
    height: f32,
    direction: f32,
    definition: DefinitionId,
}

/// Positions of every demo emitter as a function of time
pub struct DemoScene {
    orbits: Vec<Orbit>,
    orbit_speed: f32,
    flyby_speed: f32,
}

impl DemoScene {
    pub fn new(emitters: usize, ring_radius: f32, orbit_speed: f32, flyby_speed: f32) -> Self {
        let orbits = (0..emitters)
            .map(|i| {
                let ring = i % RINGS;
                let radius = ring_radius * (ring + 1) as f32 / RINGS as f32;
                Orbit {
                    id: EmitterId(i as u32),
                    radius,
                    phase: TAU * i as f32 / emitters.max(1) as f32,
                    height: (ring as f32 - 1.5) * 2.0,
                    direction: if ring % 2 == 0 { 1.0 } else { -1.0 },
                    definition: DefinitionId(ring as u32 % 2),
                }
            })
            .collect();
        Self {
            orbits,
            orbit_speed,
            flyby_speed,
        }
    }

    /// Definitions referenced by the scene, spread over `voices` field voices
    pub fn definitions(voices: usize) -> Vec<(DefinitionId, EmitterDefinition)> {
        let voices = voices.max(1) as u32;
        let split = voices.div_ceil(2);
        vec![
            (
                DefinitionId(0),
                EmitterDefinition {
                    voice_index_min: 0,
                    voice_index_max: split,
                    ..EmitterDefinition::default()
                },
            ),
            (
                DefinitionId(1),
                EmitterDefinition {
                    probability: 60.0,
                    volume: 0.35,
                    cone_angle: 120.0,
                    cone_transition: 60.0,
                    min_distance: 3.0,
                    max_distance: 60.0,
                    voice_index_min: split.min(voices - 1),
                    voice_index_max: voices,
                },
            ),
        ]
    }

    /// Emitter attributes at time `t` seconds
    pub fn at(&self, t: f32) -> Vec<(EmitterId, EmitterAttributes)> {
        let mut out: Vec<(EmitterId, EmitterAttributes)> = self
            .orbits
            .iter()
            .map(|o| {
                let angle = o.phase + o.direction * self.orbit_speed * t;
                let position = Vec3::new(o.radius * angle.cos(), o.height, o.radius * angle.sin());
                let tangent = Vec3::new(-angle.sin(), 0.0, angle.cos()) * o.direction;
                (
                    o.id,
                    EmitterAttributes::new(position, o.definition).with_cone(tangent),
                )
            })
            .collect();

        // Back and forth along x, passing one unit in front of the listener
        let period = 2.0 * FLYBY_REACH / self.flyby_speed.max(1.0);
        let phase = (t / period).fract();
        let x = -FLYBY_REACH + 2.0 * FLYBY_REACH * phase;
        out.push((
            FLYBY_ID,
            EmitterAttributes::new(Vec3::new(x, 0.0, 1.0), DefinitionId(0)),
        ));
        out
    }
}
