//! Convolution reverb over a generated impulse response.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sm_ir::{AudioBuffer, EffectKind, BLOCK_SIZE};

use super::{param_values, Convolver, Effect, EffectInfo, ParamInfo};
use crate::context::RenderContext;
use crate::param::AudioParam;

pub const MIX: u16 = 0;

/// Impulse length used by [`Reverb::new`], in seconds.
pub const DEFAULT_SECONDS: f32 = 2.0;
/// Exponent of the `(1 - i/len)` decay curve.
pub const DEFAULT_DECAY: f32 = 3.0;

/// Loudness target for impulse normalization (matches the usual Web Audio
/// convolver calibration).
const GAIN_CALIBRATION: f32 = 0.00125;

const IMPULSE_SEED: u64 = 0x5eed;

static PARAMS: &[ParamInfo] = &[ParamInfo {
    id: MIX,
    name: "Mix",
    min: 0.0,
    max: 1.0,
    default: 0.5,
}];

static INFO: EffectInfo = EffectInfo {
    name: "Reverb",
    kind: EffectKind::Reverb,
    params: PARAMS,
};

/// Stereo noise burst shaped by `(1 - i/len)^decay`.
pub fn generate_impulse(sample_rate: u32, seconds: f32, decay: f32, seed: u64) -> AudioBuffer {
    let len = ((sample_rate as f32 * seconds.max(0.01)) as usize).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut impulse = AudioBuffer::new(2, len);
    for ch in 0..2 {
        for (i, s) in impulse.channel_mut(ch).iter_mut().enumerate() {
            let noise: f32 = rng.gen_range(-1.0..1.0);
            *s = noise * (1.0 - i as f32 / len as f32).powf(decay);
        }
    }
    impulse
}

/// Scale an impulse so its total power lands on a fixed target.
fn normalize(impulse: &mut AudioBuffer) {
    let count = (impulse.channels() * impulse.frames()).max(1);
    let mut power = 0.0f64;
    for ch in 0..impulse.channels() {
        power += impulse.channel(ch).iter().map(|s| (*s as f64).powi(2)).sum::<f64>();
    }
    let rms = (power / count as f64).sqrt() as f32;
    if rms > 1e-9 {
        impulse.apply_gain(GAIN_CALIBRATION / rms);
    }
}

pub struct Reverb {
    convolver: Convolver,
    mix: AudioParam,
    wet: AudioBuffer,
    mix_values: [f32; BLOCK_SIZE],
}

impl Reverb {
    /// Two seconds of cubic-decay noise from a fixed seed.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_length(sample_rate, DEFAULT_SECONDS)
    }

    /// Generated impulse of `seconds` length.
    pub fn with_length(sample_rate: u32, seconds: f32) -> Self {
        Self::with_impulse(generate_impulse(sample_rate, seconds, DEFAULT_DECAY, IMPULSE_SEED))
    }

    /// Reverb over a caller-provided impulse response, normalized on load.
    pub fn with_impulse(mut impulse: AudioBuffer) -> Self {
        normalize(&mut impulse);
        Self {
            convolver: Convolver::new(&impulse, BLOCK_SIZE),
            mix: PARAMS[0].param(),
            wet: AudioBuffer::block(),
            mix_values: [0.0; BLOCK_SIZE],
        }
    }

    /// Output delay of the wet path, in frames.
    pub fn latency(&self) -> usize {
        self.convolver.latency()
    }
}

impl Effect for Reverb {
    fn info(&self) -> &EffectInfo {
        &INFO
    }

    fn process(&mut self, ctx: &RenderContext, buffer: &mut AudioBuffer) {
        let frames = ctx.frames.min(BLOCK_SIZE).min(buffer.frames());
        let Some((left, right)) = buffer.stereo_mut() else {
            return;
        };
        let Some((wet_l, wet_r)) = self.wet.stereo_mut() else {
            return;
        };
        self.convolver
            .process(&left[..frames], &right[..frames], &mut wet_l[..frames], &mut wet_r[..frames]);

        let mix = param_values(&self.mix, ctx, &mut self.mix_values);
        for i in 0..frames {
            let m = mix[i];
            left[i] = left[i] * (1.0 - m) + wet_l[i] * m;
            right[i] = right[i] * (1.0 - m) + wet_r[i] * m;
        }
        self.mix.prune(ctx.end_time());
    }

    fn set_param(&mut self, id: u16, value: f32, at: f64) {
        if id == MIX {
            self.mix.smooth_to(value, at);
        }
    }

    fn param(&self, id: u16) -> Option<f32> {
        (id == MIX).then(|| self.mix.settled_value())
    }

    fn reset(&mut self) {
        self.convolver.reset();
    }
}
