//! Soft-knee feed-forward compressor with a limiter preset.

use sm_ir::{AudioBuffer, EffectKind};

use super::{db_to_gain, gain_to_db, Effect, EffectInfo, ParamInfo};
use crate::context::RenderContext;
use crate::param::AudioParam;

pub const THRESHOLD: u16 = 0;
pub const KNEE: u16 = 1;
pub const RATIO: u16 = 2;
pub const ATTACK: u16 = 3;
pub const RELEASE: u16 = 4;
/// 1 switches to limiter settings, 0 restores the compressor settings.
pub const LIMITER: u16 = 5;

/// Threshold and ratio used in limiter mode.
pub const LIMITER_THRESHOLD: f32 = -0.1;
pub const LIMITER_RATIO: f32 = 20.0;

static PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: THRESHOLD,
        name: "Threshold",
        min: -100.0,
        max: 0.0,
        default: -24.0,
    },
    ParamInfo {
        id: KNEE,
        name: "Knee",
        min: 0.0,
        max: 40.0,
        default: 30.0,
    },
    ParamInfo {
        id: RATIO,
        name: "Ratio",
        min: 1.0,
        max: 20.0,
        default: 12.0,
    },
    ParamInfo {
        id: ATTACK,
        name: "Attack",
        min: 0.0,
        max: 1.0,
        default: 0.003,
    },
    ParamInfo {
        id: RELEASE,
        name: "Release",
        min: 0.0,
        max: 1.0,
        default: 0.25,
    },
    ParamInfo {
        id: LIMITER,
        name: "Limiter",
        min: 0.0,
        max: 1.0,
        default: 0.0,
    },
];

static INFO: EffectInfo = EffectInfo {
    name: "Compressor",
    kind: EffectKind::Compressor,
    params: PARAMS,
};

/// Static gain computer: output level in dB for an input level in dB.
pub fn compress_db(input_db: f32, threshold: f32, knee: f32, ratio: f32) -> f32 {
    let over = input_db - threshold;
    let slope = 1.0 / ratio.max(1.0) - 1.0;
    if knee > 0.0 && 2.0 * over.abs() <= knee {
        let x = over + knee / 2.0;
        input_db + slope * x * x / (2.0 * knee)
    } else if over > 0.0 {
        threshold + over / ratio.max(1.0)
    } else {
        input_db
    }
}

/// One-pole coefficient reaching ~63% in `seconds`.
fn time_coeff(seconds: f32, sample_rate: u32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate as f32)).exp()
    }
}

pub struct Compressor {
    params: [AudioParam; 5],
    /// Settings restored when limiter mode is switched off
    saved: Option<(f32, f32)>,
    envelope: f32,
    reduction_db: f32,
    sample_rate: u32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            params: [
                PARAMS[0].param(),
                PARAMS[1].param(),
                PARAMS[2].param(),
                PARAMS[3].param(),
                PARAMS[4].param(),
            ],
            saved: None,
            envelope: 0.0,
            reduction_db: 0.0,
            sample_rate,
        }
    }

    /// Switch between limiter settings and the previous compressor settings.
    pub fn set_limiter(&mut self, enabled: bool, at: f64) {
        match (enabled, self.saved) {
            (true, None) => {
                self.saved = Some((
                    self.params[THRESHOLD as usize].settled_value(),
                    self.params[RATIO as usize].settled_value(),
                ));
                self.params[THRESHOLD as usize].smooth_to(LIMITER_THRESHOLD, at);
                self.params[RATIO as usize].smooth_to(LIMITER_RATIO, at);
            }
            (false, Some((threshold, ratio))) => {
                self.saved = None;
                self.params[THRESHOLD as usize].smooth_to(threshold, at);
                self.params[RATIO as usize].smooth_to(ratio, at);
            }
            _ => {}
        }
    }

    pub fn is_limiting(&self) -> bool {
        self.saved.is_some()
    }

    /// Current gain reduction in dB (zero or negative).
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }
}

impl Effect for Compressor {
    fn info(&self) -> &EffectInfo {
        &INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let t = ctx.start_time;
        let threshold = self.params[THRESHOLD as usize].value_at(t);
        let knee = self.params[KNEE as usize].value_at(t);
        let ratio = self.params[RATIO as usize].value_at(t);
        let attack = time_coeff(self.params[ATTACK as usize].value_at(t), self.sample_rate);
        let release = time_coeff(self.params[RELEASE as usize].value_at(t), self.sample_rate);

        let frames = ctx.frames.min(buffer.frames());
        let Some((left, right)) = buffer.stereo_mut() else {
            return;
        };
        let mut reduction = 0.0f32;
        for i in 0..frames {
            let level = left[i].abs().max(right[i].abs());
            let coeff = if level > self.envelope { attack } else { release };
            self.envelope = level + coeff * (self.envelope - level);

            let input_db = gain_to_db(self.envelope);
            let gain_db = compress_db(input_db, threshold, knee, ratio) - input_db;
            let gain = db_to_gain(gain_db);
            left[i] *= gain;
            right[i] *= gain;
            reduction = reduction.min(gain_db);
        }
        self.reduction_db = reduction;
        for p in &mut self.params {
            p.prune(ctx.end_time());
        }
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if id == LIMITER {
            self.set_limiter(value >= 0.5, at);
        } else if let Some(p) = self.params.get_mut(id as usize) {
            p.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        if id == LIMITER {
            return Some(if self.is_limiting() { 1.0 } else { 0.0 });
        }
        self.params.get(id as usize).map(AudioParam::settled_value)
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.reduction_db = 0.0;
    }

    fn meter(&self) -> Option<f32> {
        Some(self.reduction_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_util::{run_constant, SR};

    #[test]
    fn gain_computer_regions() {
        // below the knee: untouched
        assert_eq!(compress_db(-60.0, -24.0, 30.0, 12.0), -60.0);
        // well above: threshold + over / ratio
        let out = compress_db(0.0, -24.0, 6.0, 12.0);
        assert!((out - (-22.0)).abs() < 1e-4);
        // hard knee at threshold is continuous
        assert!((compress_db(-24.0, -24.0, 0.0, 4.0) + 24.0).abs() < 1e-6);
    }

    #[test]
    fn soft_knee_is_continuous_at_edges() {
        let (t, k, r) = (-24.0, 30.0, 12.0);
        let lower = compress_db(t - k / 2.0, t, k, r);
        assert!((lower - (t - k / 2.0)).abs() < 1e-3);
        let upper = compress_db(t + k / 2.0, t, k, r);
        assert!((upper - (t + k / 2.0 / r)).abs() < 1e-3);
    }

    #[test]
    fn loud_signal_is_reduced_and_metered() {
        let mut comp = Compressor::new(SR);
        let out = run_constant(&mut comp, 1.0, 1.0, 20);
        assert!(out.channel(0)[100] < 0.3);
        assert!(comp.meter().is_some_and(|db| db < -10.0));
    }

    #[test]
    fn quiet_signal_passes() {
        let mut comp = Compressor::new(SR);
        let out = run_constant(&mut comp, 0.001, 0.001, 20);
        assert!((out.channel(0)[100] - 0.001).abs() < 1e-5);
        assert!(comp.meter().is_some_and(|db| db > -0.01));
    }

    #[test]
    fn limiter_toggle_restores_settings() {
        let mut comp = Compressor::new(SR);
        comp.set_param(THRESHOLD, -30.0, 0.0);
        comp.set_limiter(true, 0.0);
        assert!(comp.is_limiting());
        assert_eq!(comp.param(THRESHOLD), Some(LIMITER_THRESHOLD));
        assert_eq!(comp.param(RATIO), Some(LIMITER_RATIO));
        assert_eq!(comp.param(LIMITER), Some(1.0));
        comp.set_param(LIMITER, 0.0, 1.0);
        assert_eq!(comp.param(THRESHOLD), Some(-30.0));
        assert_eq!(comp.param(RATIO), Some(12.0));
    }

    #[test]
    fn limiter_holds_peaks_near_ceiling() {
        let mut comp = Compressor::new(SR);
        comp.set_param(KNEE, 0.0, 0.0);
        comp.set_limiter(true, 0.0);
        let out = run_constant(&mut comp, 2.0, 2.0, 60);
        let ceiling = db_to_gain(LIMITER_THRESHOLD + (gain_to_db(2.0) - LIMITER_THRESHOLD) / LIMITER_RATIO);
        assert!((out.channel(0)[200] - ceiling).abs() < 0.01);
    }
}
