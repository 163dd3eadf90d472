//! Pattern files: a session's tracks and transport settings as YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sm_ir::{Note, Session, TransportState};

use crate::error::ControllerResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFile {
    #[serde(default = "default_tempo")]
    pub tempo_bpm: f64,
    #[serde(default)]
    pub loop_start: u32,
    #[serde(default = "default_loop_end")]
    pub loop_end: u32,
    #[serde(default = "default_steps_per_beat")]
    pub steps_per_beat: u32,
    #[serde(default)]
    pub tracks: Vec<PatternTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTrack {
    pub name: String,
    pub instrument: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sends: Option<(f32, f32)>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
}

fn default_tempo() -> f64 {
    120.0
}

fn default_loop_end() -> u32 {
    16
}

fn default_steps_per_beat() -> u32 {
    4
}

impl PatternFile {
    pub fn from_yaml(yaml: &str) -> ControllerResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> ControllerResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn load(path: &Path) -> ControllerResult<Self> {
        let pattern = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        log::info!("loaded pattern with {} tracks from {}", pattern.tracks.len(), path.display());
        Ok(pattern)
    }

    pub fn save(&self, path: &Path) -> ControllerResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Capture the tracks of `session` and the transport settings.
    pub fn from_session(session: &Session, transport: &TransportState) -> Self {
        Self {
            tempo_bpm: transport.tempo_bpm,
            loop_start: transport.loop_start,
            loop_end: transport.loop_end,
            steps_per_beat: transport.steps_per_beat,
            tracks: session
                .tracks()
                .map(|t| PatternTrack {
                    name: t.name.clone(),
                    instrument: t.instrument_id.clone(),
                    gain: Some(t.gain()),
                    pan: Some(t.pan()),
                    sends: Some((t.send_a(), t.send_b())),
                    muted: t.is_muted(),
                    notes: t.notes().to_vec(),
                })
                .collect(),
        }
    }

    /// Build a fresh session from the tracks in this pattern.
    pub fn to_session(&self) -> Session {
        let mut session = Session::new();
        for pt in &self.tracks {
            let key = session.add_track(&pt.name, &pt.instrument);
            let Ok(track) = session.track_mut(key) else {
                continue;
            };
            if let Some(gain) = pt.gain {
                track.set_gain(gain);
            }
            if let Some(pan) = pt.pan {
                track.set_pan(pan);
            }
            if let Some((a, b)) = pt.sends {
                track.set_sends(a, b);
            }
            track.set_muted(pt.muted);
            for note in &pt.notes {
                track.add_note(Note::new(note.pitch, note.step, note.length_steps, note.velocity.get()));
            }
        }
        session
    }

    /// Transport settings carried by this pattern.
    pub fn transport(&self) -> TransportState {
        let mut transport = TransportState::default();
        transport.set_tempo(self.tempo_bpm);
        transport.set_steps_per_beat(self.steps_per_beat);
        transport.set_loop(self.loop_start, self.loop_end);
        transport
    }
}
