//! Named sample storage shared by sample instruments.

use std::collections::HashMap;

use slotmap::SlotMap;
use sm_ir::AudioBuffer;

slotmap::new_key_type! {
    /// Handle to a loaded sample.
    pub struct SampleKey;
}

/// Decoded audio for one sample zone.
#[derive(Clone, Debug)]
pub struct Sample {
    pub buffer: AudioBuffer,
    /// Rate the buffer was recorded at
    pub sample_rate: u32,
}

impl Sample {
    pub fn new(buffer: AudioBuffer, sample_rate: u32) -> Self {
        Self {
            buffer,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Linearly interpolated read at fractional frame `pos`.
    #[inline]
    pub fn read(&self, ch: usize, pos: f64) -> f32 {
        let i = pos as usize;
        let frac = (pos - i as f64) as f32;
        let a = self.buffer.sample(ch, i);
        let b = self.buffer.sample(ch, i + 1);
        a + (b - a) * frac
    }

    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }
}

/// Owns every sample the instruments can play, addressed by source name.
#[derive(Debug, Default)]
pub struct SampleBank {
    samples: SlotMap<SampleKey, Sample>,
    names: HashMap<String, SampleKey>,
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample under `name`, replacing any previous one.
    pub fn insert(&mut self, name: &str, sample: Sample) -> SampleKey {
        if let Some(&key) = self.names.get(name) {
            if let Some(slot) = self.samples.get_mut(key) {
                *slot = sample;
                return key;
            }
        }
        let key = self.samples.insert(sample);
        self.names.insert(name.to_owned(), key);
        key
    }

    pub fn remove(&mut self, name: &str) -> Option<Sample> {
        let key = self.names.remove(name)?;
        self.samples.remove(key)
    }

    /// Key for a source name, if that audio has been loaded.
    pub fn key(&self, name: &str) -> Option<SampleKey> {
        self.names.get(name).copied()
    }

    pub fn get(&self, key: SampleKey) -> Option<&Sample> {
        self.samples.get(key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Sample {
        let data: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        Sample::new(AudioBuffer::from_interleaved(&data, 1), 44100)
    }

    #[test]
    fn insert_replaces_by_name() {
        let mut bank = SampleBank::new();
        let a = bank.insert("piano/piano_C4", ramp(4));
        let b = bank.insert("piano/piano_C4", ramp(8));
        assert_eq!(a, b);
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.get(a).map(Sample::frames), Some(8));
    }

    #[test]
    fn interpolated_read() {
        let s = ramp(4);
        assert!((s.read(0, 1.5) - 1.5).abs() < 1e-6);
        // mono is read on both channels
        assert!((s.read(1, 2.25) - 2.25).abs() < 1e-6);
        assert_eq!(s.read(0, 10.0), 0.0);
    }

    #[test]
    fn remove_forgets_name() {
        let mut bank = SampleBank::new();
        bank.insert("808/kick", ramp(2));
        assert!(bank.remove("808/kick").is_some());
        assert!(!bank.contains("808/kick"));
        assert!(bank.key("808/kick").is_none());
    }
}
