//! `tanh` output saturation.

use sm_ir::{AudioBuffer, EffectKind, BLOCK_SIZE};

use super::{param_values, Effect, EffectInfo, ParamInfo};
use crate::context::RenderContext;
use crate::param::AudioParam;

/// 1 = clipping, 0 = bypassed. Glides, so toggling never clicks.
pub const ENABLED: u16 = 0;
/// Input gain ahead of the curve.
pub const DRIVE: u16 = 1;

static PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: ENABLED,
        name: "Enabled",
        min: 0.0,
        max: 1.0,
        default: 1.0,
    },
    ParamInfo {
        id: DRIVE,
        name: "Drive",
        min: 1.0,
        max: 10.0,
        default: 1.0,
    },
];

static INFO: EffectInfo = EffectInfo {
    name: "Soft Clip",
    kind: EffectKind::SoftClip,
    params: PARAMS,
};

pub struct SoftClip {
    enabled: AudioParam,
    drive: AudioParam,
    enabled_values: [f32; BLOCK_SIZE],
}

impl Default for SoftClip {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftClip {
    pub fn new() -> Self {
        Self {
            enabled: PARAMS[0].param(),
            drive: PARAMS[1].param(),
            enabled_values: [0.0; BLOCK_SIZE],
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, at: f64) {
        self.enabled.smooth_to(if enabled { 1.0 } else { 0.0 }, at);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.settled_value() > 0.5
    }
}

impl Effect for SoftClip {
    fn info(&self) -> &EffectInfo {
        &INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let settled_off = !self.enabled.is_automating() && self.enabled.value_at(ctx.start_time) == 0.0;
        if settled_off {
            return;
        }
        let drive = self.drive.value_at(ctx.start_time);
        let mix = param_values(&self.enabled, ctx, &mut self.enabled_values);
        for ch in 0..buffer.channels() {
            for (s, m) in buffer.channel_mut(ch).iter_mut().zip(mix) {
                let clipped = (*s * drive).tanh();
                *s += (clipped - *s) * m;
            }
        }
        self.enabled.prune(ctx.end_time());
        self.drive.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        match id {
            ENABLED => self.enabled.smooth_to(value, at),
            DRIVE => self.drive.smooth_to(value, at),
            _ => {}
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        match id {
            ENABLED => Some(self.enabled.settled_value()),
            DRIVE => Some(self.drive.settled_value()),
            _ => None,
        }
    }

    fn reset(&mut self) {}
}
