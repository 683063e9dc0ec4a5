//! Append-only clip store

use std::sync::Arc;

use crate::dsp::ClipData;
use crate::error::{EngineError, EngineResult};
use crate::types::ClipId;

/// Registered clips, addressed by [`ClipId`]
///
/// Clips are never removed during a session, so a `ClipId` stays valid for
/// as long as the store exists.
#[derive(Debug, Default)]
pub struct AssetStore {
    clips: Vec<Arc<ClipData>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clip and return its id
    pub fn register(&mut self, clip: ClipData) -> ClipId {
        let id = ClipId(self.clips.len() as u32);
        log::info!(
            "Registered {}: {} ch, {} Hz, {:.2}s",
            id,
            clip.channels(),
            clip.sample_rate(),
            clip.length_seconds()
        );
        self.clips.push(Arc::new(clip));
        id
    }

    pub fn get(&self, id: ClipId) -> EngineResult<&Arc<ClipData>> {
        self.clips.get(id.0 as usize).ok_or(EngineError::UnknownClip(id))
    }

    /// Clip length in seconds at its native rate
    pub fn length_seconds(&self, id: ClipId) -> EngineResult<f32> {
        self.get(id).map(|c| c.length_seconds())
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let mut store = AssetStore::new();
        let a = store.register(ClipData::sine(440.0, 0.5, 0.1, 48000));
        let b = store.register(ClipData::sine(880.0, 0.5, 0.2, 48000));
        assert_eq!(a, ClipId(0));
        assert_eq!(b, ClipId(1));
        assert!((store.length_seconds(b).unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_clip_is_bad_argument() {
        let store = AssetStore::new();
        let err = store.get(ClipId(3)).unwrap_err();
        assert!(err.is_bad_argument());
    }
}
