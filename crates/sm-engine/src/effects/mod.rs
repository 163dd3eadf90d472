//! Effect units and the trait they share.
//!
//! Every unit processes a stereo [`AudioBuffer`] in place. Parameters are
//! addressed by numeric id, clamped to the range in the unit's
//! [`ParamInfo`] table and glided over
//! [`SMOOTHING_TIME_CONSTANT`](crate::param::SMOOTHING_TIME_CONSTANT).

pub mod compressor;
mod convolver;
pub mod delay;
pub mod filter;
pub mod panner;
pub mod reverb;
pub mod soft_clip;

pub use compressor::Compressor;
pub use convolver::Convolver;
pub use delay::Delay;
pub use filter::{Filter, ThreeBandEq};
pub use panner::{ChannelStrip, Gain, StereoPanner};
pub use reverb::{generate_impulse, Reverb};
pub use soft_clip::SoftClip;

use sm_ir::{AudioBuffer, EffectKind, BLOCK_SIZE};

use crate::context::RenderContext;
use crate::param::AudioParam;

/// Metadata describing one effect parameter.
#[derive(Debug)]
pub struct ParamInfo {
    pub id: u16,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamInfo {
    /// Fresh automation timeline at this parameter's default.
    pub fn param(&self) -> AudioParam {
        AudioParam::new(self.default, self.min, self.max)
    }
}

/// Static metadata about an effect.
#[derive(Debug)]
pub struct EffectInfo {
    pub name: &'static str,
    pub kind: EffectKind,
    pub params: &'static [ParamInfo],
}

impl EffectInfo {
    pub fn param_info(&self, id: u16) -> Option<&'static ParamInfo> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Look a parameter id up by name, ignoring case.
    pub fn param_id(&self, name: &str) -> Option<u16> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.id)
    }
}

/// Core trait for in-place audio processors.
pub trait Effect: Send {
    fn info(&self) -> &EffectInfo;

    /// Process one block in place.
    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer);

    /// Glide parameter `id` to `value` starting at audio-clock time `at`.
    /// Unknown ids are ignored.
    fn set_param(&mut self, id: u16, value: f32, at: f64);

    /// Value the parameter is heading to.
    fn param(&self, id: u16) -> Option<f32>;

    /// Clear internal state (delay lines, detectors, filter memory).
    fn reset(&mut self);

    /// Level readout, for units that expose one.
    fn meter(&self) -> Option<f32> {
        None
    }
}

/// Create an effect unit with default settings.
pub fn create_effect(kind: EffectKind, sample_rate: u32) -> Box<dyn Effect> {
    match kind {
        EffectKind::Compressor => Box::new(Compressor::new(sample_rate)),
        EffectKind::Reverb => Box::new(Reverb::new(sample_rate)),
        EffectKind::Delay => Box::new(Delay::new(sample_rate)),
        EffectKind::Filter => Box::new(Filter::new()),
        EffectKind::Eq => Box::new(ThreeBandEq::new()),
        EffectKind::ChannelStrip => Box::new(ChannelStrip::new()),
        EffectKind::Gain => Box::new(Gain::new(1.0)),
        EffectKind::SoftClip => Box::new(SoftClip::new()),
    }
}

/// Per-frame values of `param` for this block.
pub(crate) fn param_values<'a>(
    param: &AudioParam,
    ctx: &RenderContext,
    out: &'a mut [f32; BLOCK_SIZE],
) -> &'a [f32] {
    let frames = ctx.frames.min(BLOCK_SIZE);
    param.fill(ctx.start_time, ctx.dt(), &mut out[..frames]);
    &out[..frames]
}

/// Decibels to linear amplitude.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Linear amplitude to decibels, floored at -120 dB.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-6 {
        -120.0
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub const SR: u32 = 44100;

    pub fn block_ctx(index: usize) -> RenderContext {
        RenderContext {
            sample_rate: SR,
            start_time: (index * BLOCK_SIZE) as f64 / SR as f64,
            frames: BLOCK_SIZE,
        }
    }

    pub fn constant_block(left: f32, right: f32) -> AudioBuffer {
        let mut buf = AudioBuffer::block();
        buf.channel_mut(0).fill(left);
        buf.channel_mut(1).fill(right);
        buf
    }

    /// Run `blocks` blocks of a constant signal and return the last output.
    pub fn run_constant(fx: &mut dyn Effect, left: f32, right: f32, blocks: usize) -> AudioBuffer {
        let mut last = AudioBuffer::block();
        for b in 0..blocks {
            let mut buf = constant_block(left, right);
            fx.process(&block_ctx(b), &mut buf);
            last = buf;
        }
        last
    }
}
