//! Master chain: voices → master gain → master volume → limiter → root

use crate::config::MasterParams;
use crate::dsp::{GainKernel, GainParam, LimiterKernel, LimiterParam};
use crate::error::EngineResult;
use crate::graph::{CommandBlock, ConnectionId, NodeId, PortRef, ROOT_NODE};

/// Graph objects of the master path
///
/// Every playback connects into [`input`](Self::input). The gain kernel
/// carries the enable fade, the gain → limiter connection carries
/// `master_volume`, and the limiter feeds the root node.
#[derive(Debug, Clone, Copy)]
pub struct MasterChain {
    gain: NodeId,
    limiter: NodeId,
    volume: ConnectionId,
    params: MasterParams,
    /// Parameter ramp length (one DSP buffer)
    lerp_samples: u32,
}

impl MasterChain {
    /// Create the chain; it starts muted until the first fade
    pub fn build(block: &mut CommandBlock<'_>, params: MasterParams, lerp_samples: u32) -> EngineResult<Self> {
        let params = params.clamped();

        let gain = block.create_node(GainKernel::new())?;
        block.add_input(gain, 2)?;
        block.add_output(gain, 2)?;
        block.set_float(gain, GainParam::VolLeft, 0.0, 0)?;
        block.set_float(gain, GainParam::VolRight, 0.0, 0)?;

        let limiter = block.create_node(LimiterKernel::new())?;
        block.add_input(limiter, 2)?;
        block.add_output(limiter, 2)?;

        let volume = block.connect_with(
            PortRef::new(gain, 0),
            PortRef::new(limiter, 0),
            params.master_volume,
            params.master_volume,
        )?;
        block.connect(PortRef::new(limiter, 0), PortRef::new(ROOT_NODE, 0))?;

        let chain = Self {
            gain,
            limiter,
            volume,
            params,
            lerp_samples,
        };
        chain.push_limiter(block, 0)?;

        log::info!(
            "Master chain: gain {:?} → limiter {:?} → root (volume {:.2}, threshold {:.1} dB)",
            gain,
            limiter,
            params.master_volume,
            params.threshold_db
        );
        Ok(chain)
    }

    /// Port every playback mixes into
    pub fn input(&self) -> PortRef {
        PortRef::new(self.gain, 0)
    }

    pub fn params(&self) -> MasterParams {
        self.params
    }

    pub fn gain_node(&self) -> NodeId {
        self.gain
    }

    pub fn limiter_node(&self) -> NodeId {
        self.limiter
    }

    /// Clamp and apply new parameters with a one-buffer ramp
    ///
    /// Returns false when nothing changed.
    pub fn set_params(&mut self, block: &mut CommandBlock<'_>, params: MasterParams) -> EngineResult<bool> {
        let params = params.clamped();
        if params == self.params {
            return Ok(false);
        }
        let previous = self.params;
        self.params = params;

        if params.master_volume != previous.master_volume {
            block.set_attenuation(
                self.volume,
                params.master_volume,
                params.master_volume,
                self.lerp_samples,
            )?;
        }
        if params.pre_gain_db != previous.pre_gain_db
            || params.threshold_db != previous.threshold_db
            || params.release_ms != previous.release_ms
        {
            self.push_limiter(block, self.lerp_samples)?;
        }
        log::debug!("Master parameters: {:?}", params);
        Ok(true)
    }

    /// Ramp the master gain to unity (`on`) or silence over `fade_samples`
    pub fn set_fade(&self, block: &mut CommandBlock<'_>, on: bool, fade_samples: u32) -> EngineResult<()> {
        let target = if on { 1.0 } else { 0.0 };
        block.set_float(self.gain, GainParam::VolLeft, target, fade_samples)?;
        block.set_float(self.gain, GainParam::VolRight, target, fade_samples)?;
        Ok(())
    }

    fn push_limiter(&self, block: &mut CommandBlock<'_>, lerp: u32) -> EngineResult<()> {
        block.set_float(self.limiter, LimiterParam::PreGainDb, self.params.pre_gain_db, lerp)?;
        block.set_float(self.limiter, LimiterParam::ThresholdDb, self.params.threshold_db, lerp)?;
        block.set_float(self.limiter, LimiterParam::ReleaseMs, self.params.release_ms, lerp)?;
        Ok(())
    }
}
