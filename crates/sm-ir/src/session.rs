//! The sequencer session: every track the scheduler reads.

use alloc::vec::Vec;
use slotmap::SlotMap;

use crate::error::{ModelError, ModelResult};
use crate::note::Note;
use crate::track::{Track, TrackKey};

/// Ordered collection of tracks.
///
/// Mutations are plain data edits. Audio only changes when the scheduler
/// reads a snapshot of the session on its next tick.
#[derive(Clone, Debug, Default)]
pub struct Session {
    tracks: SlotMap<TrackKey, Track>,
    order: Vec<TrackKey>,
    selected: Option<TrackKey>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track and select it.
    pub fn add_track(&mut self, name: &str, instrument_id: &str) -> TrackKey {
        let key = self.tracks.insert_with_key(|key| {
            let mut track = Track::new(name, instrument_id);
            track.id = key;
            track
        });
        self.order.push(key);
        self.selected = Some(key);
        key
    }

    /// Return the first track called `name`, creating it when missing.
    pub fn ensure_track(&mut self, name: &str, instrument_id: &str) -> TrackKey {
        match self.order.iter().find(|k| self.tracks[**k].name == name) {
            Some(key) => *key,
            None => self.add_track(name, instrument_id),
        }
    }

    /// Remove a track.
    pub fn remove_track(&mut self, key: TrackKey) -> ModelResult<Track> {
        let track = self.tracks.remove(key).ok_or(ModelError::UnknownTrack)?;
        self.order.retain(|k| *k != key);
        if self.selected == Some(key) {
            self.selected = self.order.last().copied();
        }
        Ok(track)
    }

    pub fn track(&self, key: TrackKey) -> Option<&Track> {
        self.tracks.get(key)
    }

    /// Mutable access to a track, or `UnknownTrack`.
    pub fn track_mut(&mut self, key: TrackKey) -> ModelResult<&mut Track> {
        self.tracks.get_mut(key).ok_or(ModelError::UnknownTrack)
    }

    /// Tracks in creation order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.order.iter().filter_map(move |k| self.tracks.get(*k))
    }

    /// Whether `key` refers to a live track.
    pub fn contains(&self, key: TrackKey) -> bool {
        self.tracks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn selected(&self) -> Option<TrackKey> {
        self.selected
    }

    pub fn select_track(&mut self, key: TrackKey) -> ModelResult<()> {
        if !self.tracks.contains_key(key) {
            return Err(ModelError::UnknownTrack);
        }
        self.selected = Some(key);
        Ok(())
    }

    pub fn add_note(
        &mut self,
        key: TrackKey,
        pitch: u8,
        step: u32,
        length_steps: u32,
        velocity: f32,
    ) -> ModelResult<()> {
        self.track_mut(key)?
            .add_note(Note::new(pitch, step, length_steps, velocity));
        Ok(())
    }

    pub fn remove_note(&mut self, key: TrackKey, pitch: u8, step: u32) -> ModelResult<Option<Note>> {
        Ok(self.track_mut(key)?.remove_note(pitch, step))
    }

    pub fn toggle_note(
        &mut self,
        key: TrackKey,
        pitch: u8,
        step: u32,
        length_steps: u32,
        velocity: f32,
    ) -> ModelResult<bool> {
        Ok(self
            .track_mut(key)?
            .toggle_note(pitch, step, length_steps, velocity))
    }

    pub fn update_note_velocity(
        &mut self,
        key: TrackKey,
        pitch: u8,
        step: u32,
        velocity: f32,
    ) -> ModelResult<bool> {
        Ok(self.track_mut(key)?.update_note_velocity(pitch, step, velocity))
    }

    pub fn clear_track(&mut self, key: TrackKey) -> ModelResult<()> {
        self.track_mut(key)?.clear();
        Ok(())
    }

    /// Point a track at another catalogue preset.
    pub fn set_instrument(&mut self, key: TrackKey, instrument_id: &str) -> ModelResult<()> {
        let track = self.track_mut(key)?;
        track.instrument_id.clear();
        track.instrument_id.push_str(instrument_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_add_remove_scenario() {
        let mut session = Session::new();
        let t = session.add_track("Piano", "grand-piano");
        session.add_note(t, 60, 0, 1, 0.9).unwrap();
        session.add_note(t, 64, 0, 1, 0.9).unwrap();
        session.remove_note(t, 60, 0).unwrap();

        let notes = session.track(t).unwrap().notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 64);
        assert_eq!(notes[0].step, 0);
    }

    #[test]
    fn ensure_track_reuses_by_name() {
        let mut session = Session::new();
        let a = session.ensure_track("Piano", "grand-piano");
        let b = session.ensure_track("Piano", "synth-lead");
        assert_eq!(a, b);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn unknown_track_is_an_error() {
        let mut session = Session::new();
        let t = session.add_track("Piano", "grand-piano");
        session.remove_track(t).unwrap();
        assert_eq!(session.add_note(t, 60, 0, 1, 1.0), Err(ModelError::UnknownTrack));
        assert_eq!(session.clear_track(t), Err(ModelError::UnknownTrack));
        assert!(session.selected().is_none());
    }

    #[test]
    fn tracks_iterate_in_creation_order() {
        let mut session = Session::new();
        session.add_track("Drums", "kit-808");
        let bass = session.add_track("Bass", "synth-lead");
        session.add_track("Pad", "synth-pad");
        session.remove_track(bass).unwrap();
        let names: Vec<&str> = session.tracks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Drums", "Pad"]);
    }

    #[test]
    fn set_instrument_swaps_preset_id() {
        let mut session = Session::new();
        let t = session.add_track("Lead", "synth-lead");
        session.set_instrument(t, "synth-pad").unwrap();
        assert_eq!(session.track(t).unwrap().instrument_id, "synth-pad");
    }
}
