//! Multi-zone sample player with a synthesized fallback tone.

use std::fmt::Write;

use arrayvec::ArrayString;
use sm_ir::{AudioBuffer, EnvelopeParams, SampleZone, SynthParams, Velocity};

use super::{SubtractiveSynth, ToneFilter, CUTOFF_RANGE};
use crate::context::RenderContext;
use crate::envelope::Adsr;
use crate::sample_bank::{SampleBank, SampleKey};
use crate::voice::{Voice, VoiceSource};
use crate::voice_pool::VoicePool;

/// Envelope applied to recorded samples.
pub const SAMPLE_ENVELOPE: EnvelopeParams = EnvelopeParams::new(0.002, 0.05, 1.0, 0.3);

/// Longest sample source name, including a round-robin suffix.
const MAX_SOURCE_NAME: usize = 96;

#[derive(Debug)]
pub struct Sampler {
    zones: Vec<SampleZone>,
    /// Next round-robin variant per zone
    round_robin: Vec<u8>,
    envelope: EnvelopeParams,
    pool: VoicePool,
    filter: ToneFilter,
    fallback: SubtractiveSynth,
    scratch: AudioBuffer,
    sample_rate: u32,
}

impl Sampler {
    pub fn new(zones: Vec<SampleZone>, sample_rate: u32, voice_limit: usize) -> Self {
        Self {
            round_robin: vec![0; zones.len()],
            zones,
            envelope: SAMPLE_ENVELOPE,
            pool: VoicePool::new(voice_limit),
            filter: ToneFilter::new(CUTOFF_RANGE.1, 0.707, sample_rate),
            fallback: SubtractiveSynth::new(SynthParams::FALLBACK, sample_rate, voice_limit),
            scratch: AudioBuffer::block(),
            sample_rate,
        }
    }

    pub fn zones(&self) -> &[SampleZone] {
        &self.zones
    }

    pub(crate) fn fallback_mut(&mut self) -> &mut SubtractiveSynth {
        &mut self.fallback
    }

    /// Resolve the zone, layer and round-robin variant for a note.
    fn resolve(&mut self, pitch: u8, velocity: Velocity, bank: &SampleBank) -> Option<(SampleKey, u8)> {
        let index = self.zones.iter().position(|z| z.contains(pitch))?;
        let zone = &self.zones[index];
        let source = zone.source_for(velocity.get());
        let variants = zone.round_robin.max(1);
        let variant = self.round_robin[index] % variants;
        self.round_robin[index] = (variant + 1) % variants;

        let key = if variant == 0 {
            bank.key(source)
        } else {
            let mut name = ArrayString::<MAX_SOURCE_NAME>::new();
            match write!(name, "{source}:{variant}") {
                Ok(()) => bank.key(&name).or_else(|| bank.key(source)),
                Err(_) => bank.key(source),
            }
        };
        match key {
            Some(key) => Some((key, zone.root)),
            None => {
                log::debug!("sample '{source}' not loaded, using fallback tone");
                None
            }
        }
    }

    /// Start `pitch`; plays the fallback tone when no loaded zone covers it.
    pub fn play(&mut self, pitch: u8, velocity: Velocity, at: f64, bank: &SampleBank) {
        self.pool.force_release(pitch, at);
        self.fallback.force_release(pitch, at);

        let Some((key, root)) = self.resolve(pitch, velocity, bank) else {
            self.fallback.play(pitch, velocity, at);
            return;
        };
        let source_rate = bank.get(key).map_or(self.sample_rate, |s| s.sample_rate);
        let ratio = ((pitch as f64 - root as f64) / 12.0).exp2();
        let increment = ratio * source_rate as f64 / self.sample_rate as f64;
        let voice = Voice::new(
            pitch,
            VoiceSource::Sample {
                key,
                position: 0.0,
                increment,
            },
            Adsr::new(self.envelope),
            velocity,
            at,
        );
        self.pool.start(voice);
    }

    pub fn stop(&mut self, pitch: u8, at: f64) -> Option<f64> {
        let sampled = self.pool.release(pitch, at);
        let synthesized = self.fallback.stop(pitch, at);
        match (sampled, synthesized) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn release_all(&mut self, at: f64) {
        self.pool.release_all(at);
        self.fallback.release_all(at);
    }

    pub fn kill_all(&mut self) {
        self.pool.kill_all();
        self.fallback.kill_all();
        self.filter.reset();
    }

    pub fn set_filter_cutoff(&mut self, hz: f32, now: f64) {
        self.filter.set_cutoff(hz, now);
    }

    pub fn set_filter_q(&mut self, q: f32, now: f64) {
        self.filter.set_q(q, now);
    }

    /// Envelope for recorded-sample voices started from now on.
    pub fn set_envelope(&mut self, params: EnvelopeParams) {
        self.envelope = params;
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active_count() + self.fallback.active_voices()
    }

    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank, out: &mut AudioBuffer) {
        if !self.pool.is_empty() {
            self.scratch.silence();
            self.pool.render(ctx, bank, &mut self.scratch);
            self.filter.process(ctx, &mut self.scratch);
            out.mix_from(&self.scratch);
        }
        self.fallback.render(ctx, bank, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_bank::Sample;
    use sm_ir::VelocityLayer;

    const SR: u32 = 1000;

    fn ctx(start: f64, frames: usize) -> RenderContext {
        RenderContext {
            sample_rate: SR,
            start_time: start,
            frames,
        }
    }

    fn dc(level: f32, frames: usize) -> Sample {
        Sample::new(AudioBuffer::from_interleaved(&vec![level; frames], 1), SR)
    }

    fn zone() -> SampleZone {
        SampleZone::new(48, 72, 60, "piano/piano_C4")
    }

    #[test]
    fn octave_up_doubles_increment() {
        let mut bank = SampleBank::new();
        bank.insert("piano/piano_C4", dc(0.5, 1000));
        let mut sampler = Sampler::new(vec![zone()], SR, 8);
        sampler.play(72, Velocity::MAX, 0.0, &bank);
        let inc = sampler.pool.voice_at(72).map(|v| match v.source {
            VoiceSource::Sample { increment, .. } => increment,
            VoiceSource::Oscillator(_) => 0.0,
        });
        assert!(matches!(inc, Some(i) if (i - 2.0).abs() < 1e-9));
        assert_eq!(sampler.fallback.active_voices(), 0);
    }

    #[test]
    fn missing_audio_falls_back_to_synth() {
        let bank = SampleBank::new();
        let mut sampler = Sampler::new(vec![zone()], SR, 8);
        sampler.play(60, Velocity::MAX, 0.0, &bank);
        assert_eq!(sampler.fallback.active_voices(), 1);
        assert!(sampler.pool.is_empty());

        // outside every zone
        sampler.play(100, Velocity::MAX, 0.0, &bank);
        assert_eq!(sampler.fallback.active_voices(), 2);
    }

    #[test]
    fn velocity_layer_selects_source() {
        let mut bank = SampleBank::new();
        let soft = bank.insert("soft", dc(0.1, 100));
        let hard = bank.insert("hard", dc(0.9, 100));
        let mut z = SampleZone::single(36, "soft");
        z.velocity_layers.push(VelocityLayer {
            threshold: 0.7,
            source: "hard".into(),
        });
        let mut sampler = Sampler::new(vec![z], SR, 8);
        assert_eq!(sampler.resolve(36, Velocity::from_unit(0.3), &bank), Some((soft, 36)));
        assert_eq!(sampler.resolve(36, Velocity::from_unit(0.9), &bank), Some((hard, 36)));
    }

    #[test]
    fn round_robin_cycles_variants() {
        let mut bank = SampleBank::new();
        let first = bank.insert("808/snare", dc(0.5, 10));
        let second = bank.insert("808/snare:1", dc(0.5, 10));
        let mut z = SampleZone::single(38, "808/snare");
        z.round_robin = 2;
        let mut sampler = Sampler::new(vec![z], SR, 8);
        let v = Velocity::MAX;
        assert_eq!(sampler.resolve(38, v, &bank).map(|r| r.0), Some(first));
        assert_eq!(sampler.resolve(38, v, &bank).map(|r| r.0), Some(second));
        assert_eq!(sampler.resolve(38, v, &bank).map(|r| r.0), Some(first));
    }

    #[test]
    fn retrigger_crosses_sample_and_fallback() {
        let mut bank = SampleBank::new();
        let mut sampler = Sampler::new(vec![zone()], SR, 8);
        sampler.play(60, Velocity::MAX, 0.0, &bank);
        bank.insert("piano/piano_C4", dc(0.5, 1000));
        sampler.play(60, Velocity::MAX, 0.1, &bank);
        let mut out = AudioBuffer::new(2, 300);
        sampler.render(&ctx(0.0, 300), &bank, &mut out);
        assert_eq!(sampler.fallback.active_voices(), 0);
        assert_eq!(sampler.active_voices(), 1);
    }
}
