//! Sequencer tracks.

use alloc::string::String;
use alloc::vec::Vec;

use crate::note::{Note, Velocity};

slotmap::new_key_type! {
    /// Stable handle to a track within a [`Session`](crate::Session).
    pub struct TrackKey;
}

/// Default track fader level.
const DEFAULT_GAIN: f32 = 0.9;
/// Default reverb send.
const DEFAULT_SEND_A: f32 = 0.1;
/// Default delay send.
const DEFAULT_SEND_B: f32 = 0.05;
/// Upper bound for the track fader.
const MAX_GAIN: f32 = 2.0;

/// One sequencer track: a note set played by one instrument preset.
///
/// Notes are unique per `(pitch, step)`; every mutation keeps the set sorted
/// by step then pitch so the scheduler can look up a step with a binary
/// search.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// Handle assigned by the owning session
    pub id: TrackKey,
    /// Display name
    pub name: String,
    /// Preset id in the instrument catalogue
    pub instrument_id: String,
    notes: Vec<Note>,
    gain: f32,
    pan: f32,
    send_a: f32,
    send_b: f32,
    muted: bool,
}

impl Track {
    /// Create an empty track with default mix settings.
    pub fn new(name: &str, instrument_id: &str) -> Self {
        Self {
            id: TrackKey::default(),
            name: String::from(name),
            instrument_id: String::from(instrument_id),
            notes: Vec::new(),
            gain: DEFAULT_GAIN,
            pan: 0.0,
            send_a: DEFAULT_SEND_A,
            send_b: DEFAULT_SEND_B,
            muted: false,
        }
    }

    fn position(&self, pitch: u8, step: u32) -> Result<usize, usize> {
        self.notes
            .binary_search_by(|n| (n.step, n.pitch).cmp(&(step, pitch)))
    }

    /// Insert a note, replacing any note at the same `(pitch, step)`.
    pub fn add_note(&mut self, note: Note) {
        match self.position(note.pitch, note.step) {
            Ok(i) => self.notes[i] = note,
            Err(i) => self.notes.insert(i, note),
        }
    }

    /// Remove the note at `(pitch, step)`.
    pub fn remove_note(&mut self, pitch: u8, step: u32) -> Option<Note> {
        self.position(pitch, step).ok().map(|i| self.notes.remove(i))
    }

    /// Remove the note at `(pitch, step)` if present, otherwise add it.
    ///
    /// Returns true when a note was added.
    pub fn toggle_note(&mut self, pitch: u8, step: u32, length_steps: u32, velocity: f32) -> bool {
        if self.remove_note(pitch, step).is_some() {
            return false;
        }
        self.add_note(Note::new(pitch, step, length_steps, velocity));
        true
    }

    /// Change the velocity of an existing note. Returns false when absent.
    pub fn update_note_velocity(&mut self, pitch: u8, step: u32, velocity: f32) -> bool {
        match self.position(pitch, step) {
            Ok(i) => {
                self.notes[i].velocity = Velocity::from_unit(velocity);
                true
            }
            Err(_) => false,
        }
    }

    /// Remove every note.
    pub fn clear(&mut self) {
        self.notes.clear();
    }

    /// All notes, ordered by step then pitch.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Notes starting on `step`.
    pub fn notes_at(&self, step: u32) -> &[Note] {
        let start = self.notes.partition_point(|n| n.step < step);
        let end = self.notes.partition_point(|n| n.step <= step);
        &self.notes[start..end]
    }

    /// The note at `(pitch, step)`.
    pub fn note(&self, pitch: u8, step: u32) -> Option<&Note> {
        self.position(pitch, step).ok().map(|i| &self.notes[i])
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set the fader level, clamped to [0, 2].
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_or(gain, 0.0, MAX_GAIN, DEFAULT_GAIN);
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Set the pan position, clamped to [-1, 1].
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_or(pan, -1.0, 1.0, 0.0);
    }

    pub fn send_a(&self) -> f32 {
        self.send_a
    }

    pub fn send_b(&self) -> f32 {
        self.send_b
    }

    /// Reverb send level, clamped to [0, 1].
    pub fn set_send_a(&mut self, level: f32) {
        self.send_a = clamp_or(level, 0.0, 1.0, 0.0);
    }

    /// Delay send level, clamped to [0, 1].
    pub fn set_send_b(&mut self, level: f32) {
        self.send_b = clamp_or(level, 0.0, 1.0, 0.0);
    }

    pub fn set_sends(&mut self, send_a: f32, send_b: f32) {
        self.set_send_a(send_a);
        self.set_send_b(send_b);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replaces_same_pitch_and_step() {
        let mut track = Track::new("Piano", "grand-piano");
        track.add_note(Note::new(60, 0, 1, 0.9));
        track.add_note(Note::new(60, 0, 4, 0.5));
        assert_eq!(track.notes().len(), 1);
        assert_eq!(track.notes()[0].length_steps, 4);
    }

    #[test]
    fn chord_then_remove_leaves_other_pitch() {
        let mut track = Track::new("Piano", "grand-piano");
        track.add_note(Note::new(60, 0, 1, 0.9));
        track.add_note(Note::new(64, 0, 1, 0.9));
        assert!(track.remove_note(60, 0).is_some());
        assert_eq!(track.notes(), &[Note::new(64, 0, 1, 0.9)]);
    }

    #[test]
    fn toggle_is_idempotent_per_pitch_and_step() {
        let mut track = Track::new("Lead", "synth-lead");
        for i in 0..7 {
            let added = track.toggle_note(67, 3, 1, 0.8);
            assert_eq!(added, i % 2 == 0);
        }
        track.add_note(Note::new(67, 3, 2, 0.4));
        track.add_note(Note::new(67, 3, 2, 0.4));
        assert_eq!(track.notes_at(3).len(), 1);
    }

    #[test]
    fn notes_at_returns_only_that_step() {
        let mut track = Track::new("Kit", "kit-808");
        track.add_note(Note::new(36, 0, 1, 1.0));
        track.add_note(Note::new(42, 2, 1, 1.0));
        track.add_note(Note::new(38, 4, 1, 1.0));
        track.add_note(Note::new(36, 4, 1, 1.0));
        let at4: Vec<u8> = track.notes_at(4).iter().map(|n| n.pitch).collect();
        assert_eq!(at4, vec![36, 38]);
        assert!(track.notes_at(1).is_empty());
    }

    #[test]
    fn velocity_update_clamps_and_reports_missing() {
        let mut track = Track::new("Pad", "synth-pad");
        track.add_note(Note::new(60, 0, 1, 0.5));
        assert!(track.update_note_velocity(60, 0, 3.0));
        assert_eq!(track.note(60, 0).map(|n| n.velocity.get()), Some(1.0));
        assert!(!track.update_note_velocity(61, 0, 0.3));
    }

    #[test]
    fn mix_setters_clamp() {
        let mut track = Track::new("Pad", "synth-pad");
        track.set_pan(-3.0);
        track.set_gain(9.0);
        track.set_sends(1.5, -1.0);
        assert_eq!(track.pan(), -1.0);
        assert_eq!(track.gain(), 2.0);
        assert_eq!(track.send_a(), 1.0);
        assert_eq!(track.send_b(), 0.0);

        track.set_send_b(0.25);
        assert_eq!(track.send_a(), 1.0);
        assert_eq!(track.send_b(), 0.25);
    }
}
