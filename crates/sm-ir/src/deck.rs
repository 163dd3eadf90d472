//! Deck and crossfader settings.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Lowest EQ band gain in dB.
pub const EQ_MIN_DB: f32 = -24.0;
/// Highest EQ band gain in dB.
pub const EQ_MAX_DB: f32 = 12.0;

/// One of the two DJ decks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; 2] = [DeckId::A, DeckId::B];

    /// Crossfader input port fed by this deck.
    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }
}

/// Separated stem of a deck track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Melody,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Melody];

    pub fn index(self) -> usize {
        match self {
            Stem::Vocals => 0,
            Stem::Drums => 1,
            Stem::Bass => 2,
            Stem::Melody => 3,
        }
    }
}

/// Crossfader gain law.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossfadeCurve {
    /// Gains proportional to position
    #[default]
    Linear,
    /// Constant-power (cos/sin) law
    Power,
    /// Squared law: the side the fader sits on dominates
    #[serde(alias = "exp")]
    Exponential,
    /// Hard switch at the center
    Cut,
}

/// Three-band EQ gains in dB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    pub high: f32,
    pub mid: f32,
    pub low: f32,
}

impl EqSettings {
    /// Build settings with every band clamped to [EQ_MIN_DB, EQ_MAX_DB].
    pub fn new(high: f32, mid: f32, low: f32) -> Self {
        let clamp = |db: f32| if db.is_nan() { 0.0 } else { db.clamp(EQ_MIN_DB, EQ_MAX_DB) };
        Self {
            high: clamp(high),
            mid: clamp(mid),
            low: clamp(low),
        }
    }
}

/// Playback state published for one deck.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeckStatus {
    pub is_playing: bool,
    /// Position as a fraction of the track length
    pub progress: f32,
    pub duration_secs: f64,
    /// Source file name of the loaded track
    pub track_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_clamps_each_band() {
        let eq = EqSettings::new(40.0, -90.0, f32::NAN);
        assert_eq!(eq.high, EQ_MAX_DB);
        assert_eq!(eq.mid, EQ_MIN_DB);
        assert_eq!(eq.low, 0.0);
    }

    #[test]
    fn stem_indices_are_dense() {
        for (i, stem) in Stem::ALL.iter().enumerate() {
            assert_eq!(stem.index(), i);
        }
    }
}
