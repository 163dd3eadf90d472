//! Equal-power panning and smoothed gain stages.

use core::f32::consts::FRAC_PI_2;

use sm_ir::{AudioBuffer, EffectKind, BLOCK_SIZE};

use super::{param_values, Effect, EffectInfo, ParamInfo};
use crate::context::RenderContext;
use crate::param::AudioParam;

/// Highest gain a strip or gain stage accepts.
pub const MAX_GAIN: f32 = 2.0;

/// Equal-power pan of a stereo pair, transparent at the center.
///
/// Panning left folds the right channel into the left with a cosine law,
/// and the mirror image for panning right.
#[inline]
pub fn pan_stereo(pan: f32, left: f32, right: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

pub mod stereo_panner {
    pub const PAN: u16 = 0;
}

static PANNER_PARAMS: &[ParamInfo] = &[ParamInfo {
    id: stereo_panner::PAN,
    name: "Pan",
    min: -1.0,
    max: 1.0,
    default: 0.0,
}];

static PANNER_INFO: EffectInfo = EffectInfo {
    name: "Stereo Panner",
    kind: EffectKind::ChannelStrip,
    params: PANNER_PARAMS,
};

/// Pan-only stage.
pub struct StereoPanner {
    pan: AudioParam,
    pan_values: [f32; BLOCK_SIZE],
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl StereoPanner {
    pub fn new() -> Self {
        Self {
            pan: PANNER_PARAMS[0].param(),
            pan_values: [0.0; BLOCK_SIZE],
        }
    }
}

impl Effect for StereoPanner {
    fn info(&self) -> &EffectInfo {
        &PANNER_INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let pans = param_values(&self.pan, ctx, &mut self.pan_values);
        let Some((left, right)) = buffer.stereo_mut() else {
            return;
        };
        for ((l, r), p) in left.iter_mut().zip(right.iter_mut()).zip(pans) {
            (*l, *r) = pan_stereo(*p, *l, *r);
        }
        self.pan.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if id == stereo_panner::PAN {
            self.pan.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        (id == stereo_panner::PAN).then(|| self.pan.settled_value())
    }

    fn reset(&mut self) {}
}

pub mod channel_strip {
    pub const GAIN: u16 = 0;
    pub const PAN: u16 = 1;
}

static STRIP_PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: channel_strip::GAIN,
        name: "Gain",
        min: 0.0,
        max: MAX_GAIN,
        default: 1.0,
    },
    ParamInfo {
        id: channel_strip::PAN,
        name: "Pan",
        min: -1.0,
        max: 1.0,
        default: 0.0,
    },
];

static STRIP_INFO: EffectInfo = EffectInfo {
    name: "Channel Strip",
    kind: EffectKind::ChannelStrip,
    params: STRIP_PARAMS,
};

/// Gain followed by equal-power pan, one per track and per deck.
pub struct ChannelStrip {
    gain: AudioParam,
    pan: AudioParam,
    gain_values: [f32; BLOCK_SIZE],
    pan_values: [f32; BLOCK_SIZE],
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStrip {
    pub fn new() -> Self {
        Self {
            gain: STRIP_PARAMS[0].param(),
            pan: STRIP_PARAMS[1].param(),
            gain_values: [0.0; BLOCK_SIZE],
            pan_values: [0.0; BLOCK_SIZE],
        }
    }

    /// Strip that starts at `gain` and `pan` with no glide in.
    pub fn with_values(gain: f32, pan: f32) -> Self {
        let mut strip = Self::new();
        strip.gain.set_immediate(gain);
        strip.pan.set_immediate(pan);
        strip
    }
}

impl Effect for ChannelStrip {
    fn info(&self) -> &EffectInfo {
        &STRIP_INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let gains = param_values(&self.gain, ctx, &mut self.gain_values);
        let pans = param_values(&self.pan, ctx, &mut self.pan_values);
        let Some((left, right)) = buffer.stereo_mut() else {
            return;
        };
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate().take(gains.len()) {
            let g = gains[i];
            (*l, *r) = pan_stereo(pans[i], *l * g, *r * g);
        }
        self.gain.prune(ctx.end_time());
        self.pan.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        match id {
            channel_strip::GAIN => self.gain.smooth_to(value, at),
            channel_strip::PAN => self.pan.smooth_to(value, at),
            _ => {}
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        match id {
            channel_strip::GAIN => Some(self.gain.settled_value()),
            channel_strip::PAN => Some(self.pan.settled_value()),
            _ => None,
        }
    }

    fn reset(&mut self) {}
}

pub mod gain {
    pub const GAIN: u16 = 0;
}

static GAIN_PARAMS: &[ParamInfo] = &[ParamInfo {
    id: gain::GAIN,
    name: "Gain",
    min: 0.0,
    max: MAX_GAIN,
    default: 1.0,
}];

static GAIN_INFO: EffectInfo = EffectInfo {
    name: "Gain",
    kind: EffectKind::Gain,
    params: GAIN_PARAMS,
};

/// Smoothed linear gain, used for sends and master volume.
pub struct Gain {
    gain: AudioParam,
    values: [f32; BLOCK_SIZE],
}

impl Gain {
    pub fn new(initial: f32) -> Self {
        let mut gain = GAIN_PARAMS[0].param();
        gain.set_immediate(initial);
        Self {
            gain,
            values: [0.0; BLOCK_SIZE],
        }
    }
}

impl Effect for Gain {
    fn info(&self) -> &EffectInfo {
        &GAIN_INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        if !self.gain.is_automating() {
            let g = self.gain.value_at(ctx.start_time);
            if g != 1.0 {
                buffer.apply_gain(g);
            }
            return;
        }
        let gains = param_values(&self.gain, ctx, &mut self.values);
        for ch in 0..buffer.channels() {
            for (s, g) in buffer.channel_mut(ch).iter_mut().zip(gains) {
                *s *= g;
            }
        }
        self.gain.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if id == gain::GAIN {
            self.gain.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        (id == gain::GAIN).then(|| self.gain.settled_value())
    }

    fn reset(&mut self) {}
}
