//! Sample-playback registry
//!
//! Every logical sample entity (a field voice, a move-by pool slot) owns one
//! entry. The host side expresses intent by attaching or removing a
//! [`PlaybackRequest`]; once per frame [`sync`](SamplePlaybackRegistry::sync)
//! moves each entry through exactly one transition:
//!
//! | request | graph state | transition |
//! |---------|-------------|------------|
//! | yes     | no          | create player (and low-pass branch), ramp in |
//! | yes     | yes         | ramp attenuation to the new gains |
//! | no      | yes         | stop player, unbind clip, release nodes |
//!
//! Replacing a request (rather than editing it in place) restarts the
//! player so a new one-shot always plays from the top.

use std::sync::Arc;

use rayon::prelude::*;

use super::assets::AssetStore;
use crate::dsp::{
    ClipData, ClipReader, FilterType, PlayerControl, PlayerKernel, PlayerParam, PlayerProvider,
    SvfKernel, SvfParam,
};
use crate::error::{EngineError, EngineResult};
use crate::graph::{CommandBlock, ConnectionId, NodeId, PortRef};
use crate::types::{ClipId, PlaybackId};

/// What an entity should be playing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackRequest {
    pub clip: ClipId,
    /// Playback speed multiplier on top of the clip/output rate ratio
    pub pitch: f32,
    pub volume: f32,
    /// Direct path gains
    pub left: f32,
    pub right: f32,
    /// Low-pass path gains (only used when `filtered`)
    pub lpf_left: f32,
    pub lpf_right: f32,
    pub looping: bool,
    /// Add a low-pass branch next to the direct path
    pub filtered: bool,
    /// Gains are re-accumulated from zero every frame
    pub additive: bool,
}

impl PlaybackRequest {
    /// Unfiltered, non-looping playback with fixed gains
    pub fn one_shot(clip: ClipId, pitch: f32, volume: f32, left: f32, right: f32) -> Self {
        Self {
            clip,
            pitch,
            volume,
            left,
            right,
            lpf_left: 0.0,
            lpf_right: 0.0,
            looping: false,
            filtered: false,
            additive: false,
        }
    }

    /// Looping, filtered voice whose gains are summed from emitters each frame
    pub fn field(clip: ClipId) -> Self {
        Self {
            clip,
            pitch: 1.0,
            volume: 1.0,
            left: 0.0,
            right: 0.0,
            lpf_left: 0.0,
            lpf_right: 0.0,
            looping: true,
            filtered: true,
            additive: true,
        }
    }

    /// Zero the accumulated gains
    pub fn clear_gains(&mut self) {
        self.left = 0.0;
        self.right = 0.0;
        self.lpf_left = 0.0;
        self.lpf_right = 0.0;
    }

    fn direct_gains(&self) -> (f32, f32) {
        (self.volume * self.left, self.volume * self.right)
    }

    fn lowpass_gains(&self) -> (f32, f32) {
        (self.volume * self.lpf_left, self.volume * self.lpf_right)
    }
}

/// Low-pass branch of a filtered playback: player → filter → master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowpassBranch {
    pub filter: NodeId,
    pub input: ConnectionId,
    pub output: ConnectionId,
}

/// Graph objects owned by one live playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub player: NodeId,
    /// Player → master
    pub direct: ConnectionId,
    pub lowpass: Option<LowpassBranch>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Entry {
    request: Option<PlaybackRequest>,
    /// Bumped by every `set_request`
    generation: u64,
    state: Option<PlaybackState>,
    /// The player ran out of clip since the request was set
    finished: bool,
    /// Free the slot once the state is gone
    destroy: bool,
}

/// Transitions performed by one `sync`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub failed: usize,
}

/// Maps sample entities to player nodes in the graph
#[derive(Debug)]
pub struct SamplePlaybackRegistry {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    /// Input port every playback connects into
    master_input: PortRef,
    output_rate: u32,
    /// Attenuation ramp length (one DSP buffer)
    lerp_samples: u32,
}

impl SamplePlaybackRegistry {
    pub fn new(master_input: PortRef, output_rate: u32, lerp_samples: u32) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            master_input,
            output_rate,
            lerp_samples,
        }
    }

    /// Allocate a sample entity with no request
    pub fn create_entity(&mut self) -> PlaybackId {
        let entry = Some(Entry::default());
        match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = entry;
                PlaybackId(index)
            }
            None => {
                self.entries.push(entry);
                PlaybackId(self.entries.len() as u32 - 1)
            }
        }
    }

    /// Drop the entity's request; its graph objects and slot are released
    /// on the next `sync`
    pub fn destroy_entity(&mut self, id: PlaybackId) -> EngineResult<()> {
        let entry = self.entry_mut(id)?;
        entry.request = None;
        entry.destroy = true;
        Ok(())
    }

    pub fn is_live(&self, id: PlaybackId) -> bool {
        self.entry(id).is_ok()
    }

    /// Attach a new request, replacing (and restarting) any previous one
    pub fn set_request(&mut self, id: PlaybackId, request: PlaybackRequest) -> EngineResult<()> {
        let entry = self.entry_mut(id)?;
        entry.request = Some(request);
        entry.generation += 1;
        entry.finished = false;
        Ok(())
    }

    /// Detach the request; the player is torn down on the next `sync`
    pub fn remove_request(&mut self, id: PlaybackId) -> EngineResult<Option<PlaybackRequest>> {
        Ok(self.entry_mut(id)?.request.take())
    }

    pub fn request(&self, id: PlaybackId) -> Option<&PlaybackRequest> {
        self.entry(id).ok().and_then(|e| e.request.as_ref())
    }

    /// Edit the live request in place (no restart)
    pub fn request_mut(&mut self, id: PlaybackId) -> Option<&mut PlaybackRequest> {
        self.entry_mut(id).ok().and_then(|e| e.request.as_mut())
    }

    pub fn state(&self, id: PlaybackId) -> Option<&PlaybackState> {
        self.entry(id).ok().and_then(|e| e.state.as_ref())
    }

    /// Whether the player reported the end of its clip
    pub fn is_finished(&self, id: PlaybackId) -> bool {
        self.entry(id).map(|e| e.finished).unwrap_or(false)
    }

    /// Entities that currently own graph nodes
    pub fn playing_count(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.state.is_some()).count()
    }

    /// Reset gains of every additive request (parallel)
    pub fn clear_additive_gains(&mut self) {
        self.entries.par_iter_mut().for_each(|entry| {
            if let Some(request) = entry.as_mut().and_then(|e| e.request.as_mut()) {
                if request.additive {
                    request.clear_gains();
                }
            }
        });
    }

    /// Mark the entity playing on `node` as finished
    pub fn on_clip_stopped(&mut self, node: NodeId) -> Option<PlaybackId> {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(entry) = entry {
                if entry.state.map(|s| s.player) == Some(node) {
                    entry.finished = true;
                    return Some(PlaybackId(index as u32));
                }
            }
        }
        None
    }

    /// Reconcile every entity with the graph
    pub fn sync(&mut self, block: &mut CommandBlock<'_>, assets: &AssetStore) -> SyncStats {
        let mut stats = SyncStats::default();
        let master = self.master_input;
        let output_rate = self.output_rate;
        let lerp = self.lerp_samples;

        for index in 0..self.entries.len() {
            let id = PlaybackId(index as u32);
            let Some(entry) = self.entries[index].as_mut() else {
                continue;
            };

            let stale = match (&entry.state, &entry.request) {
                (Some(state), Some(_)) => state.generation != entry.generation,
                (Some(_), None) => true,
                _ => false,
            };
            if stale {
                if let Some(state) = entry.state.take() {
                    destroy_playback(block, &state);
                    stats.destroyed += 1;
                    log::debug!("Released {} (player {:?})", id, state.player);
                }
            }

            if entry.destroy {
                self.entries[index] = None;
                self.free.push(index as u32);
                continue;
            }

            match (entry.request, entry.state) {
                (Some(request), None) => {
                    let created = assets.get(request.clip).and_then(|clip| {
                        create_playback(block, &request, clip, master, output_rate, lerp)
                    });
                    match created {
                        Ok(mut state) => {
                            state.generation = entry.generation;
                            entry.state = Some(state);
                            stats.created += 1;
                            log::debug!("Started {} on {} (player {:?})", id, request.clip, state.player);
                        }
                        Err(e) => {
                            log::error!("Cannot start {}: {}", id, e);
                            entry.request = None;
                            stats.failed += 1;
                        }
                    }
                }
                (Some(request), Some(state)) => {
                    match update_playback(block, &request, &state, lerp) {
                        Ok(()) => stats.updated += 1,
                        Err(e) => {
                            log::error!("Cannot update {}: {}", id, e);
                            stats.failed += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        stats
    }

    /// Tear down every live playback (shutdown)
    pub fn release_all(&mut self, block: &mut CommandBlock<'_>) -> usize {
        let mut released = 0;
        for entry in self.entries.iter_mut().flatten() {
            entry.request = None;
            if let Some(state) = entry.state.take() {
                destroy_playback(block, &state);
                released += 1;
            }
        }
        released
    }

    fn entry(&self, id: PlaybackId) -> EngineResult<&Entry> {
        self.entries
            .get(id.0 as usize)
            .and_then(|e| e.as_ref())
            .filter(|e| !e.destroy)
            .ok_or(EngineError::InvalidEntity(id))
    }

    fn entry_mut(&mut self, id: PlaybackId) -> EngineResult<&mut Entry> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(|e| e.as_mut())
            .filter(|e| !e.destroy)
            .ok_or(EngineError::InvalidEntity(id))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Graph wiring
// ═══════════════════════════════════════════════════════════════════════════════

fn create_playback(
    block: &mut CommandBlock<'_>,
    request: &PlaybackRequest,
    clip: &Arc<ClipData>,
    master: PortRef,
    output_rate: u32,
    lerp: u32,
) -> EngineResult<PlaybackState> {
    let player = block.create_node(PlayerKernel::new())?;
    match wire_playback(block, player, request, clip, master, output_rate, lerp) {
        Ok(state) => Ok(state),
        Err(e) => {
            let _ = block.release_node(player);
            Err(e)
        }
    }
}

fn wire_playback(
    block: &mut CommandBlock<'_>,
    player: NodeId,
    request: &PlaybackRequest,
    clip: &Arc<ClipData>,
    master: PortRef,
    output_rate: u32,
    lerp: u32,
) -> EngineResult<PlaybackState> {
    block.add_output(player, 2)?;
    block.set_provider(
        player,
        PlayerProvider::Clip,
        Some(ClipReader::new(clip.clone(), request.looping)),
    )?;
    let rate = clip.sample_rate() as f32 / output_rate.max(1) as f32 * request.pitch;
    block.set_float(player, PlayerParam::Rate, rate, 0)?;
    block.update(player, PlayerControl::Start)?;

    let output = PortRef::new(player, 0);
    let direct = block.connect_with(output, master, 0.0, 0.0)?;
    let (left, right) = request.direct_gains();
    block.set_attenuation(direct, left, right, lerp)?;

    let lowpass = if request.filtered {
        let filter = block.create_node(SvfKernel::new())?;
        match wire_lowpass(block, output, filter, master, request, lerp) {
            Ok(branch) => Some(branch),
            Err(e) => {
                let _ = block.release_node(filter);
                return Err(e);
            }
        }
    } else {
        None
    };

    Ok(PlaybackState {
        player,
        direct,
        lowpass,
        generation: 0,
    })
}

fn wire_lowpass(
    block: &mut CommandBlock<'_>,
    source: PortRef,
    filter: NodeId,
    master: PortRef,
    request: &PlaybackRequest,
    lerp: u32,
) -> EngineResult<LowpassBranch> {
    block.add_input(filter, 2)?;
    block.add_output(filter, 2)?;
    block.set_float(filter, SvfParam::Type, FilterType::Lowpass.as_param(), 0)?;
    let input = block.connect(source, PortRef::new(filter, 0))?;
    let output = block.connect_with(PortRef::new(filter, 0), master, 0.0, 0.0)?;
    let (left, right) = request.lowpass_gains();
    block.set_attenuation(output, left, right, lerp)?;
    Ok(LowpassBranch {
        filter,
        input,
        output,
    })
}

fn update_playback(
    block: &mut CommandBlock<'_>,
    request: &PlaybackRequest,
    state: &PlaybackState,
    lerp: u32,
) -> EngineResult<()> {
    let (left, right) = request.direct_gains();
    block.set_attenuation(state.direct, left, right, lerp)?;
    if let Some(branch) = state.lowpass {
        let (left, right) = request.lowpass_gains();
        block.set_attenuation(branch.output, left, right, lerp)?;
    }
    Ok(())
}

fn destroy_playback(block: &mut CommandBlock<'_>, state: &PlaybackState) {
    let result = block
        .update(state.player, PlayerControl::Stop)
        .and_then(|_| block.set_provider(state.player, PlayerProvider::Clip, None))
        .and_then(|_| match state.lowpass {
            Some(branch) => block.release_node(branch.filter),
            None => Ok(()),
        })
        .and_then(|_| block.release_node(state.player));
    if let Err(e) = result {
        log::error!("Releasing player {:?} failed: {}", state.player, e);
    }
}
