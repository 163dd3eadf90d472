//! Two-input crossfader between deck A and deck B.

use core::f32::consts::FRAC_PI_2;

use sm_ir::{AudioBuffer, CrossfadeCurve, BLOCK_SIZE};

use crate::context::RenderContext;
use crate::param::AudioParam;

/// Deck A and deck B gains for a fader `position` in [-1, 1].
///
/// `x = (position + 1) / 2`, mirrored first when `reverse` is set.
pub fn crossfade_gains(position: f32, curve: CrossfadeCurve, reverse: bool) -> (f32, f32) {
    let position = if position.is_nan() { 0.0 } else { position.clamp(-1.0, 1.0) };
    let position = if reverse { -position } else { position };
    let x = (position + 1.0) / 2.0;
    match curve {
        CrossfadeCurve::Linear => (1.0 - x, x),
        CrossfadeCurve::Power => ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin()),
        CrossfadeCurve::Exponential => ((1.0 - x) * (1.0 - x), x * x),
        CrossfadeCurve::Cut => {
            if position < 0.0 {
                (1.0, 0.0)
            } else if position > 0.0 {
                (0.0, 1.0)
            } else {
                (1.0, 1.0)
            }
        }
    }
}

pub struct Crossfader {
    position: f32,
    curve: CrossfadeCurve,
    reverse: bool,
    gains: [AudioParam; 2],
    values: [[f32; BLOCK_SIZE]; 2],
}

impl Default for Crossfader {
    fn default() -> Self {
        Self::new()
    }
}

impl Crossfader {
    /// Centered, linear law.
    pub fn new() -> Self {
        let (a, b) = crossfade_gains(0.0, CrossfadeCurve::Linear, false);
        Self {
            position: 0.0,
            curve: CrossfadeCurve::Linear,
            reverse: false,
            gains: [AudioParam::new(a, 0.0, 1.0), AudioParam::new(b, 0.0, 1.0)],
            values: [[0.0; BLOCK_SIZE]; 2],
        }
    }

    pub fn set(&mut self, position: f32, curve: CrossfadeCurve, reverse: bool, at: f64) {
        self.position = if position.is_nan() { 0.0 } else { position.clamp(-1.0, 1.0) };
        self.curve = curve;
        self.reverse = reverse;
        let (a, b) = crossfade_gains(self.position, curve, reverse);
        self.gains[0].smooth_to(a, at);
        self.gains[1].smooth_to(b, at);
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn curve(&self) -> CrossfadeCurve {
        self.curve
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Gains the fader is heading to.
    pub fn target_gains(&self) -> (f32, f32) {
        (self.gains[0].settled_value(), self.gains[1].settled_value())
    }

    /// Blend `a` and `b` into `out`.
    pub fn process(&mut self, ctx: &RenderContext, a: &AudioBuffer, b: &AudioBuffer, out: &mut AudioBuffer) {
        let frames = ctx.frames.min(BLOCK_SIZE).min(out.frames());
        for (param, values) in self.gains.iter().zip(self.values.iter_mut()) {
            param.fill(ctx.start_time, ctx.dt(), &mut values[..frames]);
        }
        let [ga, gb] = &self.values;
        for ch in 0..out.channels() {
            let (sa, sb) = (a.channel(ch.min(a.channels() - 1)), b.channel(ch.min(b.channels() - 1)));
            for (i, o) in out.channel_mut(ch)[..frames].iter_mut().enumerate() {
                *o = sa[i] * ga[i] + sb[i] * gb[i];
            }
        }
        for g in &mut self.gains {
            g.prune(ctx.end_time());
        }
    }
}
