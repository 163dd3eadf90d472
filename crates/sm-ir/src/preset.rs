//! Instrument presets and the built-in catalogue.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Oscillator shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

/// ADSR times in seconds, sustain as a fraction of peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvelopeParams {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self::new(0.01, 0.2, 0.8, 0.5)
    }
}

/// Parameters of a subtractive synth voice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthParams {
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub envelope: EnvelopeParams,
    /// Low-pass cutoff in Hz
    pub cutoff: f32,
    /// Low-pass resonance
    pub q: f32,
}

impl SynthParams {
    /// Tone used by sample instruments whose zone audio is missing.
    pub const FALLBACK: SynthParams = SynthParams {
        waveform: Waveform::Triangle,
        envelope: EnvelopeParams::new(0.002, 0.08, 0.7, 0.1),
        cutoff: 7000.0,
        q: 0.8,
    };
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sawtooth,
            envelope: EnvelopeParams::default(),
            cutoff: 20000.0,
            q: 1.0,
        }
    }
}

/// Alternate source used at or above a velocity threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VelocityLayer {
    /// Minimum normalized velocity for this layer
    pub threshold: f32,
    pub source: String,
}

/// Mapping of a MIDI range onto one recorded sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleZone {
    /// Lowest pitch (inclusive)
    pub low: u8,
    /// Highest pitch (inclusive)
    pub high: u8,
    /// Pitch the sample was recorded at
    pub root: u8,
    /// Sample bank name
    pub source: String,
    /// Number of round-robin variants; variant `n > 0` is named `source:n`
    #[serde(default = "one_variant")]
    pub round_robin: u8,
    #[serde(default)]
    pub velocity_layers: Vec<VelocityLayer>,
}

fn one_variant() -> u8 {
    1
}

impl SampleZone {
    pub fn new(low: u8, high: u8, root: u8, source: &str) -> Self {
        Self {
            low,
            high,
            root,
            source: source.to_owned(),
            round_robin: 1,
            velocity_layers: Vec::new(),
        }
    }

    /// Zone playing a single pitch at its recorded speed.
    pub fn single(pitch: u8, source: &str) -> Self {
        Self::new(pitch, pitch, pitch, source)
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }

    /// Source for `velocity`: the layer with the highest threshold not above it.
    pub fn source_for(&self, velocity: f32) -> &str {
        self.velocity_layers
            .iter()
            .filter(|layer| velocity >= layer.threshold)
            .max_by(|a, b| a.threshold.total_cmp(&b.threshold))
            .map_or(self.source.as_str(), |layer| layer.source.as_str())
    }
}

/// What an instrument preset plays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresetKind {
    Synth(SynthParams),
    Sample { zones: Vec<SampleZone> },
}

/// A read-only catalogue entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPreset {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: PresetKind,
}

impl InstrumentPreset {
    pub fn synth(id: &str, name: &str, params: SynthParams) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind: PresetKind::Synth(params),
        }
    }

    pub fn sample(id: &str, name: &str, zones: Vec<SampleZone>) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind: PresetKind::Sample { zones },
        }
    }

    pub fn is_sample(&self) -> bool {
        matches!(self.kind, PresetKind::Sample { .. })
    }
}

/// The instrument catalogue tracks refer to by preset id.
#[derive(Clone, Debug, Default)]
pub struct PresetCatalogue {
    presets: Vec<InstrumentPreset>,
}

impl PresetCatalogue {
    /// Catalogue with the stock instruments.
    pub fn builtin() -> Self {
        let kit = |prefix: &str, hits: &[(u8, &str)]| -> Vec<SampleZone> {
            hits.iter()
                .map(|(pitch, name)| {
                    let mut source = String::from(prefix);
                    source.push('/');
                    source.push_str(name);
                    SampleZone::single(*pitch, &source)
                })
                .collect()
        };

        Self {
            presets: vec![
                InstrumentPreset::sample(
                    "grand-piano",
                    "Grand Piano",
                    vec![SampleZone::new(21, 108, 60, "piano/piano_C4")],
                ),
                InstrumentPreset::sample(
                    "acoustic-guitar",
                    "Acoustic Guitar",
                    vec![SampleZone::new(40, 88, 52, "guitar/guitar_E3")],
                ),
                InstrumentPreset::sample(
                    "orchestra-strings",
                    "Orchestra Strings",
                    vec![SampleZone::new(40, 96, 55, "strings/strings_G3")],
                ),
                InstrumentPreset::synth(
                    "synth-lead",
                    "Synth Lead",
                    SynthParams {
                        waveform: Waveform::Sawtooth,
                        envelope: EnvelopeParams::new(0.005, 0.08, 0.7, 0.2),
                        cutoff: 8000.0,
                        q: 0.707,
                    },
                ),
                InstrumentPreset::synth(
                    "synth-pad",
                    "Synth Pad",
                    SynthParams {
                        waveform: Waveform::Triangle,
                        envelope: EnvelopeParams::new(0.2, 0.5, 0.8, 1.2),
                        cutoff: 4000.0,
                        q: 0.9,
                    },
                ),
                InstrumentPreset::sample(
                    "kit-808",
                    "808 Kit",
                    kit(
                        "808",
                        &[
                            (36, "kick"),
                            (38, "snare"),
                            (39, "clap"),
                            (42, "hat-closed"),
                            (46, "hat-open"),
                        ],
                    ),
                ),
                InstrumentPreset::sample(
                    "kit-studio",
                    "Studio Drums",
                    kit(
                        "studio",
                        &[
                            (36, "kick"),
                            (37, "rim"),
                            (38, "snare"),
                            (40, "tom-low"),
                            (43, "tom-mid"),
                            (47, "tom-high"),
                            (42, "hhc"),
                            (46, "hho"),
                            (49, "crash"),
                        ],
                    ),
                ),
            ],
        }
    }

    /// Look up a preset by id.
    pub fn get(&self, id: &str) -> ModelResult<&InstrumentPreset> {
        self.presets
            .iter()
            .find(|p| p.id == id)
            .ok_or(ModelError::UnknownPreset)
    }

    /// Add a preset, replacing any entry with the same id.
    pub fn insert(&mut self, preset: InstrumentPreset) {
        match self.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(slot) => *slot = preset,
            None => self.presets.push(preset),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentPreset> + '_ {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
