//! Subtractive synth: oscillator voices through a shared low-pass.

use sm_ir::{midi_to_frequency, AudioBuffer, EnvelopeParams, SynthParams, Velocity, Waveform};

use super::ToneFilter;
use crate::context::RenderContext;
use crate::envelope::Adsr;
use crate::oscillator::Oscillator;
use crate::sample_bank::SampleBank;
use crate::voice::{Voice, VoiceSource};
use crate::voice_pool::VoicePool;

#[derive(Debug)]
pub struct SubtractiveSynth {
    waveform: Waveform,
    envelope: EnvelopeParams,
    filter: ToneFilter,
    pool: VoicePool,
    scratch: AudioBuffer,
    sample_rate: u32,
}

impl SubtractiveSynth {
    pub fn new(params: SynthParams, sample_rate: u32, voice_limit: usize) -> Self {
        Self {
            waveform: params.waveform,
            envelope: params.envelope,
            filter: ToneFilter::new(params.cutoff, params.q, sample_rate),
            pool: VoicePool::new(voice_limit),
            scratch: AudioBuffer::block(),
            sample_rate,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn envelope(&self) -> EnvelopeParams {
        self.envelope
    }

    pub fn play(&mut self, pitch: u8, velocity: Velocity, at: f64) {
        let osc = Oscillator::new(self.waveform, midi_to_frequency(pitch), self.sample_rate);
        let voice = Voice::new(
            pitch,
            VoiceSource::Oscillator(osc),
            Adsr::new(self.envelope),
            velocity,
            at,
        );
        self.pool.start(voice);
    }

    pub fn stop(&mut self, pitch: u8, at: f64) -> Option<f64> {
        self.pool.release(pitch, at)
    }

    /// Fade out whatever is sounding at `pitch` over the retrigger fade.
    pub(crate) fn force_release(&mut self, pitch: u8, at: f64) {
        self.pool.force_release(pitch, at);
    }

    pub fn release_all(&mut self, at: f64) {
        self.pool.release_all(at);
    }

    pub fn kill_all(&mut self) {
        self.pool.kill_all();
        self.filter.reset();
    }

    /// Cutoff in Hz, clamped to [20, 20000] and smoothed.
    pub fn set_filter_cutoff(&mut self, hz: f32, now: f64) {
        self.filter.set_cutoff(hz, now);
    }

    pub fn set_filter_q(&mut self, q: f32, now: f64) {
        self.filter.set_q(q, now);
    }

    pub fn filter_cutoff_at(&self, t: f64) -> f32 {
        self.filter.cutoff_at(t)
    }

    /// Change the shape of sounding and future voices.
    pub fn set_oscillator_type(&mut self, waveform: Waveform) {
        self.waveform = waveform;
        self.pool.for_each_source(|source| {
            if let VoiceSource::Oscillator(osc) = source {
                osc.set_waveform(waveform);
            }
        });
    }

    /// Envelope used by voices started after this call.
    pub fn set_envelope(&mut self, params: EnvelopeParams) {
        self.envelope = params;
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank, out: &mut AudioBuffer) {
        if self.pool.is_empty() {
            return;
        }
        self.scratch.silence();
        self.pool.render(ctx, bank, &mut self.scratch);
        self.filter.process(ctx, &mut self.scratch);
        out.mix_from(&self.scratch);
    }
}
