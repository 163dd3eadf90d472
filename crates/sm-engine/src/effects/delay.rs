//! Stereo feedback delay.

use sm_ir::{AudioBuffer, EffectKind, BLOCK_SIZE};

use super::{param_values, Effect, EffectInfo, ParamInfo};
use crate::context::RenderContext;
use crate::param::AudioParam;

pub const TIME: u16 = 0;
pub const FEEDBACK: u16 = 1;
pub const MIX: u16 = 2;

/// Longest supported delay, in seconds.
pub const MAX_DELAY: f32 = 2.0;

static PARAMS: &[ParamInfo] = &[
    ParamInfo {
        id: TIME,
        name: "Time",
        min: 0.001,
        max: MAX_DELAY,
        default: 0.375,
    },
    ParamInfo {
        id: FEEDBACK,
        name: "Feedback",
        min: 0.0,
        max: 0.95,
        default: 0.35,
    },
    ParamInfo {
        id: MIX,
        name: "Mix",
        min: 0.0,
        max: 1.0,
        default: 1.0,
    },
];

static INFO: EffectInfo = EffectInfo {
    name: "Delay",
    kind: EffectKind::Delay,
    params: PARAMS,
};

pub struct Delay {
    time: AudioParam,
    feedback: AudioParam,
    mix: AudioParam,
    lines: [Vec<f32>; 2],
    write: usize,
    sample_rate: u32,
    time_values: [f32; BLOCK_SIZE],
    mix_values: [f32; BLOCK_SIZE],
}

impl Delay {
    pub fn new(sample_rate: u32) -> Self {
        let len = (MAX_DELAY * sample_rate as f32) as usize + 2;
        Self {
            time: PARAMS[0].param(),
            feedback: PARAMS[1].param(),
            mix: PARAMS[2].param(),
            lines: [vec![0.0; len], vec![0.0; len]],
            write: 0,
            sample_rate,
            time_values: [0.0; BLOCK_SIZE],
            mix_values: [0.0; BLOCK_SIZE],
        }
    }

    fn param_mut(&mut self, id: u16) -> Option<&mut AudioParam> {
        match id {
            TIME => Some(&mut self.time),
            FEEDBACK => Some(&mut self.feedback),
            MIX => Some(&mut self.mix),
            _ => None,
        }
    }
}

impl Effect for Delay {
    fn info(&self) -> &EffectInfo {
        &INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let frames = ctx.frames.min(BLOCK_SIZE).min(buffer.frames());
        let feedback = self.feedback.value_at(ctx.start_time);
        let times = param_values(&self.time, ctx, &mut self.time_values);
        let mixes = param_values(&self.mix, ctx, &mut self.mix_values);
        let Some((left, right)) = buffer.stereo_mut() else {
            return;
        };
        let len = self.lines[0].len();
        let sr = self.sample_rate as f32;

        for i in 0..frames {
            let delay = (times[i] * sr).clamp(1.0, (len - 2) as f32);
            let read = (self.write as f32 - delay).rem_euclid(len as f32);
            let idx = read as usize % len;
            let frac = read - read.floor();
            let next = (idx + 1) % len;
            let m = mixes[i];
            for (ch, sample) in [&mut left[i], &mut right[i]].into_iter().enumerate() {
                let line = &mut self.lines[ch];
                let delayed = line[idx] + (line[next] - line[idx]) * frac;
                line[self.write] = *sample + delayed * feedback;
                *sample = *sample * (1.0 - m) + delayed * m;
            }
            self.write = (self.write + 1) % len;
        }
        self.time.prune(ctx.end_time());
        self.feedback.prune(ctx.end_time());
        self.mix.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if let Some(p) = self.param_mut(id) {
            p.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        match id {
            TIME => Some(self.time.settled_value()),
            FEEDBACK => Some(self.feedback.settled_value()),
            MIX => Some(self.mix.settled_value()),
            _ => None,
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write = 0;
    }
}
