//! Notes, velocities and pitch helpers.

use alloc::format;
use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Normalized note velocity in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Velocity(f32);

impl Velocity {
    /// Full velocity.
    pub const MAX: Velocity = Velocity(1.0);

    /// Clamp a unit-range velocity. NaN maps to zero.
    pub fn from_unit(value: f32) -> Self {
        if value.is_nan() {
            return Velocity(0.0);
        }
        Velocity(value.clamp(0.0, 1.0))
    }

    /// Convert a MIDI velocity (0-127); larger values clamp to full.
    pub fn from_midi(value: u8) -> Self {
        Velocity(value.min(MAX_PITCH) as f32 / MAX_PITCH as f32)
    }

    /// Normalized value.
    pub fn get(self) -> f32 {
        self.0
    }
}

impl From<f32> for Velocity {
    fn from(value: f32) -> Self {
        Velocity::from_unit(value)
    }
}

impl From<Velocity> for f32 {
    fn from(value: Velocity) -> Self {
        value.0
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity(0.8)
    }
}

/// A note on the sequencer grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch (0-127)
    pub pitch: u8,
    /// Grid step the note starts on
    pub step: u32,
    /// Length in steps (at least 1)
    #[serde(default = "one_step")]
    pub length_steps: u32,
    /// Velocity
    #[serde(default)]
    pub velocity: Velocity,
}

fn one_step() -> u32 {
    1
}

impl Note {
    /// Create a note, clamping pitch and length into range.
    pub fn new(pitch: u8, step: u32, length_steps: u32, velocity: f32) -> Self {
        Self {
            pitch: pitch.min(MAX_PITCH),
            step,
            length_steps: length_steps.max(1),
            velocity: Velocity::from_unit(velocity),
        }
    }

    /// Fundamental frequency of this note in Hz.
    pub fn frequency(&self) -> f32 {
        midi_to_frequency(self.pitch)
    }
}

/// Equal-tempered frequency for a MIDI pitch (A4 = 69 = 440 Hz).
pub fn midi_to_frequency(pitch: u8) -> f32 {
    440.0 * libm::powf(2.0, (pitch as f32 - 69.0) / 12.0)
}

/// Note name with octave, e.g. `C4` for 60.
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((midi_to_frequency(81) - 880.0).abs() < 1e-2);
        assert!((midi_to_frequency(60) - 261.6256).abs() < 1e-2);
    }

    #[test]
    fn names_follow_c4_convention() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(21), "A0");
        assert_eq!(note_name(0), "C-1");
    }

    #[test]
    fn velocity_clamps() {
        assert_eq!(Velocity::from_unit(1.7).get(), 1.0);
        assert_eq!(Velocity::from_unit(-0.2).get(), 0.0);
        assert_eq!(Velocity::from_unit(f32::NAN).get(), 0.0);
        assert_eq!(Velocity::from_midi(127).get(), 1.0);
        assert_eq!(Velocity::from_midi(200).get(), 1.0);
        assert!((Velocity::from_midi(64).get() - 64.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn note_constructor_clamps() {
        let n = Note::new(200, 3, 0, 2.0);
        assert_eq!(n.pitch, 127);
        assert_eq!(n.length_steps, 1);
        assert_eq!(n.velocity, Velocity::MAX);
    }
}
