//! Instruments: a synth or a sampler behind one node type.

mod sampler;
mod synth;

pub use sampler::{Sampler, SAMPLE_ENVELOPE};
pub use synth::SubtractiveSynth;

use sm_ir::{AudioBuffer, EnvelopeParams, InstrumentPreset, PresetKind, Velocity, Waveform};

use crate::biquad::{BiquadCoeffs, BiquadState, FilterType};
use crate::context::RenderContext;
use crate::param::AudioParam;
use crate::sample_bank::SampleBank;

/// Frames between filter coefficient updates while the cutoff glides.
const FILTER_UPDATE_FRAMES: usize = 32;

/// Lowest and highest cutoff an instrument filter accepts.
pub const CUTOFF_RANGE: (f32, f32) = (20.0, 20000.0);

/// A playable instrument, one per track.
#[derive(Debug)]
pub enum Instrument {
    Synth(SubtractiveSynth),
    Sampler(Sampler),
}

impl Instrument {
    /// Build the instrument a preset describes.
    pub fn from_preset(preset: &InstrumentPreset, sample_rate: u32, voice_limit: usize) -> Self {
        match &preset.kind {
            PresetKind::Synth(params) => {
                Instrument::Synth(SubtractiveSynth::new(*params, sample_rate, voice_limit))
            }
            PresetKind::Sample { zones } => {
                Instrument::Sampler(Sampler::new(zones.clone(), sample_rate, voice_limit))
            }
        }
    }

    /// Start `pitch` at audio-clock time `at`.
    pub fn play(&mut self, pitch: u8, velocity: Velocity, at: f64, bank: &SampleBank) {
        match self {
            Instrument::Synth(s) => s.play(pitch, velocity, at),
            Instrument::Sampler(s) => s.play(pitch, velocity, at, bank),
        }
    }

    /// Release `pitch` at `at`. Returns when the voice falls silent.
    pub fn stop(&mut self, pitch: u8, at: f64) -> Option<f64> {
        match self {
            Instrument::Synth(s) => s.stop(pitch, at),
            Instrument::Sampler(s) => s.stop(pitch, at),
        }
    }

    pub fn release_all(&mut self, at: f64) {
        match self {
            Instrument::Synth(s) => s.release_all(at),
            Instrument::Sampler(s) => s.release_all(at),
        }
    }

    pub fn kill_all(&mut self) {
        match self {
            Instrument::Synth(s) => s.kill_all(),
            Instrument::Sampler(s) => s.kill_all(),
        }
    }

    /// Add this block's output into `out`.
    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank, out: &mut AudioBuffer) {
        match self {
            Instrument::Synth(s) => s.render(ctx, bank, out),
            Instrument::Sampler(s) => s.render(ctx, bank, out),
        }
    }

    pub fn set_filter_cutoff(&mut self, hz: f32, now: f64) {
        match self {
            Instrument::Synth(s) => s.set_filter_cutoff(hz, now),
            Instrument::Sampler(s) => s.set_filter_cutoff(hz, now),
        }
    }

    pub fn set_filter_q(&mut self, q: f32, now: f64) {
        match self {
            Instrument::Synth(s) => s.set_filter_q(q, now),
            Instrument::Sampler(s) => s.set_filter_q(q, now),
        }
    }

    pub fn set_oscillator_type(&mut self, waveform: Waveform) {
        match self {
            Instrument::Synth(s) => s.set_oscillator_type(waveform),
            Instrument::Sampler(s) => s.fallback_mut().set_oscillator_type(waveform),
        }
    }

    /// Envelope for voices started from now on.
    pub fn set_envelope(&mut self, params: EnvelopeParams) {
        match self {
            Instrument::Synth(s) => s.set_envelope(params),
            Instrument::Sampler(s) => s.set_envelope(params),
        }
    }

    pub fn active_voices(&self) -> usize {
        match self {
            Instrument::Synth(s) => s.active_voices(),
            Instrument::Sampler(s) => s.active_voices(),
        }
    }
}

/// Low-pass shared by every voice of an instrument, with a gliding cutoff.
#[derive(Debug)]
pub(crate) struct ToneFilter {
    cutoff: AudioParam,
    q: AudioParam,
    state: BiquadState,
    coeffs: BiquadCoeffs,
    designed: (f32, f32),
    sample_rate: u32,
}

impl ToneFilter {
    pub(crate) fn new(cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let cutoff = AudioParam::new(cutoff, CUTOFF_RANGE.0, CUTOFF_RANGE.1);
        let q = AudioParam::new(q, 0.1, 20.0);
        let designed = (cutoff.value_at(0.0), q.value_at(0.0));
        Self {
            coeffs: BiquadCoeffs::design(FilterType::LowPass, designed.0, designed.1, 0.0, sample_rate),
            cutoff,
            q,
            state: BiquadState::default(),
            designed,
            sample_rate,
        }
    }

    pub(crate) fn set_cutoff(&mut self, hz: f32, now: f64) {
        self.cutoff.smooth_to(hz, now);
    }

    pub(crate) fn set_q(&mut self, q: f32, now: f64) {
        self.q.smooth_to(q, now);
    }

    pub(crate) fn cutoff_at(&self, t: f64) -> f32 {
        self.cutoff.value_at(t)
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, buf: &mut AudioBuffer) {
        let frames = ctx.frames.min(buf.frames());
        let Some((left, right)) = buf.stereo_mut() else {
            return;
        };
        let mut start = 0;
        while start < frames {
            let t = ctx.time_at(start);
            let wanted = (self.cutoff.value_at(t), self.q.value_at(t));
            if wanted != self.designed {
                self.coeffs =
                    BiquadCoeffs::design(FilterType::LowPass, wanted.0, wanted.1, 0.0, self.sample_rate);
                self.designed = wanted;
            }
            let end = (start + FILTER_UPDATE_FRAMES).min(frames);
            for i in start..end {
                left[i] = self.state.process(0, left[i], &self.coeffs);
                right[i] = self.state.process(1, right[i], &self.coeffs);
            }
            start = end;
        }
        self.cutoff.prune(ctx.end_time());
        self.q.prune(ctx.end_time());
    }

    pub(crate) fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_ir::PresetCatalogue;

    #[test]
    fn presets_build_matching_variants() {
        let catalogue = PresetCatalogue::builtin();
        for preset in catalogue.iter() {
            let inst = Instrument::from_preset(preset, 44100, 8);
            assert_eq!(matches!(inst, Instrument::Sampler(_)), preset.is_sample(), "{}", preset.id);
        }
    }

    #[test]
    fn cutoff_glides_and_clamps() {
        let mut f = ToneFilter::new(1000.0, 0.7, 44100);
        f.set_cutoff(50_000.0, 0.0);
        assert!(f.cutoff_at(0.0) < 1001.0);
        assert!((f.cutoff_at(1.0) - CUTOFF_RANGE.1).abs() < 1.0);
    }
}
