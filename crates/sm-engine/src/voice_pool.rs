//! VoicePool: voice allocation and lifecycle for one instrument.

use slotmap::SlotMap;
use sm_ir::AudioBuffer;

use crate::context::RenderContext;
use crate::sample_bank::SampleBank;
use crate::voice::{Voice, VoiceSource, VoiceState};

slotmap::new_key_type! {
    /// Handle to a live voice.
    pub struct VoiceKey;
}

/// Default simultaneous voices per instrument.
pub const DEFAULT_VOICE_LIMIT: usize = 32;

#[derive(Debug)]
struct Slot {
    voice: Voice,
    /// Allocation order, lower is older
    serial: u64,
}

/// Arena of voices with a pitch index.
///
/// At most one voice is indexed per pitch. Retriggering a pitch fades the
/// previous voice out quickly and indexes the new one; the faded voice is
/// dropped from the index only if the index still points at it.
#[derive(Debug)]
pub struct VoicePool {
    voices: SlotMap<VoiceKey, Slot>,
    by_pitch: [Option<VoiceKey>; 128],
    limit: usize,
    next_serial: u64,
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE_LIMIT)
    }
}

impl VoicePool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            voices: SlotMap::with_capacity_and_key(limit + 1),
            by_pitch: [None; 128],
            limit,
            next_serial: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Start `voice`, cutting any voice already indexed at its pitch.
    pub fn start(&mut self, voice: Voice) -> VoiceKey {
        let pitch = voice.pitch.min(127) as usize;
        let at = voice.start_time();
        if let Some(old) = self.by_pitch[pitch] {
            if let Some(slot) = self.voices.get_mut(old) {
                slot.voice.force_release(at);
            }
        }
        if self.voices.len() >= self.limit {
            self.steal();
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        let key = self.voices.insert(Slot { voice, serial });
        self.by_pitch[pitch] = Some(key);
        key
    }

    /// Drop one voice: the oldest releasing voice, else the oldest overall.
    fn steal(&mut self) {
        let victim = self
            .voices
            .iter()
            .min_by_key(|(_, s)| (s.voice.state != VoiceState::Releasing, s.serial))
            .map(|(k, _)| k);
        if let Some(key) = victim {
            log::debug!("voice limit {} reached, stealing", self.limit);
            self.remove(key);
        }
    }

    fn remove(&mut self, key: VoiceKey) {
        if let Some(slot) = self.voices.remove(key) {
            let pitch = slot.voice.pitch.min(127) as usize;
            if self.by_pitch[pitch] == Some(key) {
                self.by_pitch[pitch] = None;
            }
        }
    }

    /// Release the voice indexed at `pitch`. Returns when it falls silent.
    pub fn release(&mut self, pitch: u8, at: f64) -> Option<f64> {
        let key = self.by_pitch[pitch.min(127) as usize]?;
        self.voices.get_mut(key).map(|slot| slot.voice.release(at))
    }

    /// Cut the voice indexed at `pitch` with the short retrigger fade.
    pub fn force_release(&mut self, pitch: u8, at: f64) -> Option<f64> {
        let key = self.by_pitch[pitch.min(127) as usize]?;
        self.voices.get_mut(key).map(|slot| slot.voice.force_release(at))
    }

    /// Release every voice at `at`; voices that would start after `at` are dropped.
    pub fn release_all(&mut self, at: f64) {
        let pending: Vec<VoiceKey> = self
            .voices
            .iter()
            .filter(|(_, s)| s.voice.start_time() > at)
            .map(|(k, _)| k)
            .collect();
        for key in pending {
            self.remove(key);
        }
        for (_, slot) in self.voices.iter_mut() {
            slot.voice.release(at);
        }
    }

    /// Remove every voice immediately.
    pub fn kill_all(&mut self) {
        self.voices.clear();
        self.by_pitch = [None; 128];
    }

    /// Apply `f` to each oscillator source, for live waveform changes.
    pub fn for_each_source(&mut self, mut f: impl FnMut(&mut VoiceSource)) {
        for (_, slot) in self.voices.iter_mut() {
            f(&mut slot.voice.source);
        }
    }

    /// Sum every voice into `out` and destroy the ones that finished.
    pub fn render(&mut self, ctx: &RenderContext, bank: &SampleBank, out: &mut AudioBuffer) {
        for (_, slot) in self.voices.iter_mut() {
            slot.voice.render(ctx, bank, out);
        }
        self.reap_finished();
    }

    /// Remove voices whose release has completed.
    pub fn reap_finished(&mut self) {
        let by_pitch = &mut self.by_pitch;
        self.voices.retain(|key, slot| {
            if !slot.voice.is_finished() {
                return true;
            }
            let pitch = slot.voice.pitch.min(127) as usize;
            if by_pitch[pitch] == Some(key) {
                by_pitch[pitch] = None;
            }
            false
        });
    }

    pub fn get(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key).map(|s| &s.voice)
    }

    /// Voice currently indexed at `pitch`.
    pub fn voice_at(&self, pitch: u8) -> Option<&Voice> {
        self.by_pitch[pitch.min(127) as usize].and_then(|k| self.get(k))
    }

    /// Count of live voices, including ones still fading.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Adsr;
    use crate::oscillator::Oscillator;
    use sm_ir::{EnvelopeParams, Velocity, Waveform};

    const SR: u32 = 1000;

    fn voice(pitch: u8, at: f64) -> Voice {
        let osc = Oscillator::new(Waveform::Sine, 50.0, SR);
        let env = Adsr::new(EnvelopeParams::new(0.01, 0.01, 0.8, 0.1));
        Voice::new(pitch, VoiceSource::Oscillator(osc), env, Velocity::MAX, at)
    }

    fn ctx(start: f64, frames: usize) -> RenderContext {
        RenderContext {
            sample_rate: SR,
            start_time: start,
            frames,
        }
    }

    #[test]
    fn pool_new_is_empty() {
        let pool = VoicePool::default();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.limit(), DEFAULT_VOICE_LIMIT);
    }

    #[test]
    fn retrigger_fades_previous_voice() {
        let mut pool = VoicePool::default();
        let first = pool.start(voice(60, 0.0));
        let second = pool.start(voice(60, 0.1));
        assert_eq!(pool.active_count(), 2);
        let old = pool.get(first).map(|v| (v.state, v.stop_time().unwrap_or(0.0)));
        assert!(matches!(old, Some((VoiceState::Releasing, t)) if (t - 0.105).abs() < 1e-9));
        assert_eq!(pool.voice_at(60).map(|v| v.start_time()), pool.get(second).map(|v| v.start_time()));
    }

    #[test]
    fn reaping_old_voice_keeps_new_index() {
        let mut pool = VoicePool::default();
        pool.start(voice(60, 0.0));
        pool.start(voice(60, 0.05));
        let mut out = AudioBuffer::new(2, 200);
        pool.render(&ctx(0.0, 200), &SampleBank::new(), &mut out);
        assert_eq!(pool.active_count(), 1);
        assert!(pool.voice_at(60).is_some());
    }

    #[test]
    fn release_then_reap_clears_index() {
        let mut pool = VoicePool::default();
        pool.start(voice(64, 0.0));
        let end = pool.release(64, 0.05).unwrap_or(0.0);
        assert!((end - 0.15).abs() < 1e-9);
        let mut out = AudioBuffer::new(2, 200);
        pool.render(&ctx(0.0, 200), &SampleBank::new(), &mut out);
        assert!(pool.is_empty());
        assert!(pool.voice_at(64).is_none());
        assert_eq!(pool.release(64, 0.3), None);
    }

    #[test]
    fn steal_prefers_releasing_voices() {
        let mut pool = VoicePool::new(3);
        let a = pool.start(voice(60, 0.0));
        let b = pool.start(voice(62, 0.0));
        let c = pool.start(voice(64, 0.0));
        pool.release(62, 0.01);
        pool.start(voice(65, 0.0));
        assert_eq!(pool.active_count(), 3);
        assert!(pool.get(b).is_none());
        assert!(pool.get(a).is_some() && pool.get(c).is_some());
        assert!(pool.voice_at(62).is_none());
    }

    #[test]
    fn steal_falls_back_to_oldest() {
        let mut pool = VoicePool::new(2);
        let a = pool.start(voice(60, 0.0));
        pool.start(voice(61, 0.0));
        pool.start(voice(62, 0.0));
        assert!(pool.get(a).is_none());
        assert!(pool.voice_at(60).is_none());
    }

    #[test]
    fn release_all_drops_future_voices() {
        let mut pool = VoicePool::default();
        pool.start(voice(60, 0.0));
        pool.start(voice(67, 0.5));
        pool.release_all(0.2);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.voice_at(60).map(|v| v.state), Some(VoiceState::Releasing));
        assert!(pool.voice_at(67).is_none());
    }

    #[test]
    fn kill_all_empties_pool() {
        let mut pool = VoicePool::default();
        pool.start(voice(60, 0.0));
        pool.start(voice(61, 0.0));
        pool.kill_all();
        assert!(pool.is_empty());
        assert!(pool.voice_at(60).is_none());
    }
}
