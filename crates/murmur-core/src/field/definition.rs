//! Emitter definitions

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::types::DefinitionId;

/// Fractional part in `[0, 1)`, also for negative inputs
#[inline]
pub fn frac(x: f32) -> f32 {
    x - x.floor()
}

/// Position hash used for culling and voice choice
///
/// Stable across frames for a static emitter, so its fate does not flicker.
#[inline]
pub fn spatial_seed(p: Vec3) -> f32 {
    p.x * p.y + p.y * p.z + p.x * p.z
}

/// Parameters shared by every emitter that references the same id
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterDefinition {
    /// Percentage of emitters kept by the spatial cull, `[0, 100]`
    pub probability: f32,
    pub volume: f32,
    /// Full cone angle in degrees (360 = omnidirectional)
    pub cone_angle: f32,
    /// Degrees outside the cone over which gain fades to zero
    pub cone_transition: f32,
    /// Full-volume radius
    pub min_distance: f32,
    /// Attenuation radius; silent beyond twice this
    pub max_distance: f32,
    /// Field voices `[voice_index_min, voice_index_max)` this definition may use
    pub voice_index_min: u32,
    pub voice_index_max: u32,
}

impl Default for EmitterDefinition {
    fn default() -> Self {
        Self {
            probability: 100.0,
            volume: 0.5,
            cone_angle: 360.0,
            cone_transition: 0.0,
            min_distance: 5.0,
            max_distance: 100.0,
            voice_index_min: 0,
            voice_index_max: 1,
        }
    }
}

impl EmitterDefinition {
    /// Force every field into a usable range
    pub fn validated(self) -> Self {
        let min_distance = self.min_distance.max(1e-3);
        let fixed = Self {
            probability: self.probability.clamp(0.0, 100.0),
            volume: self.volume.max(0.0),
            cone_angle: self.cone_angle.clamp(0.0, 360.0),
            cone_transition: self.cone_transition.clamp(0.0, 360.0),
            min_distance,
            max_distance: self.max_distance.max(min_distance),
            voice_index_min: self.voice_index_min,
            voice_index_max: self.voice_index_max.max(self.voice_index_min),
        };
        if fixed != self {
            log::warn!("Emitter definition adjusted: {:?} -> {:?}", self, fixed);
        }
        fixed
    }

    /// Whether an emitter with this seed survives the probability cull
    #[inline]
    pub fn passes_probability(&self, seed: f32) -> bool {
        frac(0.17 * seed) <= self.probability / 100.0
    }

    /// Field voice picked for an emitter with this seed
    ///
    /// A range holding at most one voice (including the empty
    /// `voice_index_min == voice_index_max`) always picks `voice_index_min`.
    #[inline]
    pub fn voice_for(&self, seed: f32) -> usize {
        let lo = self.voice_index_min as usize;
        let hi = self.voice_index_max as usize;
        if hi <= lo + 1 {
            return lo;
        }
        let t = frac(0.31 * seed);
        let voice = (lo as f32 + (hi - lo) as f32 * t).floor() as usize;
        voice.clamp(lo, hi - 1)
    }
}

/// Index of a resolved definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefinitionHandle(usize);

/// Definitions in definition order
///
/// Lookups by id are a linear scan; emitters cache the returned handle so
/// the scan happens once per emitter. Redefining an id keeps its handle.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    entries: Vec<(DefinitionId, EmitterDefinition)>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the definition for `id`
    pub fn define(&mut self, id: DefinitionId, definition: EmitterDefinition) -> DefinitionHandle {
        let definition = definition.validated();
        match self.resolve(id) {
            Some(handle) => {
                self.entries[handle.0].1 = definition;
                handle
            }
            None => {
                self.entries.push((id, definition));
                DefinitionHandle(self.entries.len() - 1)
            }
        }
    }

    pub fn resolve(&self, id: DefinitionId) -> Option<DefinitionHandle> {
        self.entries
            .iter()
            .position(|(d, _)| *d == id)
            .map(DefinitionHandle)
    }

    pub fn get(&self, handle: DefinitionHandle) -> Option<&EmitterDefinition> {
        self.entries.get(handle.0).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frac_of_negative() {
        assert!((frac(-0.25) - 0.75).abs() < 1e-6);
        assert_eq!(frac(3.0), 0.0);
    }

    #[test]
    fn test_probability_cull() {
        let seed = spatial_seed(Vec3::new(5.0, 0.0, 1.0)); // 5.0 → frac(0.85)
        let mut def = EmitterDefinition::default();
        assert!(def.passes_probability(seed));
        def.probability = 80.0;
        assert!(!def.passes_probability(seed));
        def.probability = 90.0;
        assert!(def.passes_probability(seed));
    }

    #[test]
    fn test_voice_for_stays_in_range() {
        let def = EmitterDefinition {
            voice_index_min: 2,
            voice_index_max: 6,
            ..EmitterDefinition::default()
        };
        for i in 0..500 {
            let p = Vec3::new(i as f32 * 0.37 - 90.0, 1.5, i as f32 * -0.11);
            let v = def.voice_for(spatial_seed(p));
            assert!((2..6).contains(&v), "voice {} out of range", v);
        }
        let single = EmitterDefinition::default();
        assert_eq!(single.voice_for(123.4), 0);
    }

    #[test]
    fn test_collapsed_voice_range_picks_its_minimum() {
        let def = EmitterDefinition {
            voice_index_min: 3,
            voice_index_max: 3,
            ..EmitterDefinition::default()
        };
        for seed in [-41.7, 0.0, 0.5, 12.25, 999.9] {
            assert_eq!(def.voice_for(seed), 3);
        }
        let single = EmitterDefinition {
            voice_index_min: 3,
            voice_index_max: 4,
            ..EmitterDefinition::default()
        };
        assert_eq!(single.voice_for(77.7), 3);
    }

    #[test]
    fn test_validated_fixes_inverted_ranges() {
        let def = EmitterDefinition {
            probability: 150.0,
            min_distance: 20.0,
            max_distance: 10.0,
            voice_index_min: 4,
            voice_index_max: 1,
            ..EmitterDefinition::default()
        }
        .validated();
        assert_eq!(def.probability, 100.0);
        assert_eq!(def.max_distance, 20.0);
        assert_eq!(def.voice_index_max, 4);
    }

    #[test]
    fn test_redefine_keeps_handle() {
        let mut table = DefinitionTable::new();
        let a = table.define(DefinitionId(3), EmitterDefinition::default());
        let b = table.define(DefinitionId(8), EmitterDefinition::default());
        assert_ne!(a, b);
        let again = table.define(
            DefinitionId(3),
            EmitterDefinition {
                volume: 1.0,
                ..EmitterDefinition::default()
            },
        );
        assert_eq!(again, a);
        assert_eq!(table.get(a).unwrap().volume, 1.0);
        assert_eq!(table.resolve(DefinitionId(99)), None);
    }
}
