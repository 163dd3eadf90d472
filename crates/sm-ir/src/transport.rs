//! Transport state shared by the scheduler and its observers.

use serde::{Deserialize, Serialize};

/// Slowest accepted tempo in BPM.
pub const MIN_TEMPO: f64 = 20.0;
/// Fastest accepted tempo in BPM.
pub const MAX_TEMPO: f64 = 300.0;

/// Tempo, loop region and play position of the step sequencer.
///
/// `current_step` is `-1` whenever the transport is stopped and otherwise
/// always lies in `[loop_start, loop_end)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub tempo_bpm: f64,
    pub is_playing: bool,
    pub current_step: i64,
    pub loop_start: u32,
    pub loop_end: u32,
    pub steps_per_beat: u32,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            is_playing: false,
            current_step: -1,
            loop_start: 0,
            loop_end: 16,
            steps_per_beat: 4,
        }
    }
}

impl TransportState {
    /// Set the tempo, clamped to [MIN_TEMPO, MAX_TEMPO]. Returns the applied value.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.tempo_bpm = if bpm.is_nan() {
            self.tempo_bpm
        } else {
            bpm.clamp(MIN_TEMPO, MAX_TEMPO)
        };
        self.tempo_bpm
    }

    /// Set the loop region. An empty or inverted region becomes one step long.
    ///
    /// A playing position outside the new region is parked on the last step
    /// of the region, so the next scheduled step re-enters at `loop_start`.
    pub fn set_loop(&mut self, start: u32, end: u32) {
        let start = start.min(u32::MAX - 1);
        self.loop_start = start;
        self.loop_end = end.max(start + 1);
        if self.is_playing && !self.in_loop(self.current_step) {
            self.current_step = self.loop_end as i64 - 1;
        }
    }

    pub fn set_steps_per_beat(&mut self, steps: u32) {
        self.steps_per_beat = steps.max(1);
    }

    /// Seconds per step: `60 / (tempo * steps_per_beat)`.
    pub fn step_duration(&self) -> f64 {
        60.0 / (self.tempo_bpm * self.steps_per_beat.max(1) as f64)
    }

    /// Whether `step` lies inside `[loop_start, loop_end)`.
    pub fn in_loop(&self, step: i64) -> bool {
        step >= self.loop_start as i64 && step < self.loop_end as i64
    }

    /// Step that follows `step`, wrapping back to `loop_start`.
    pub fn next_step(&self, step: i64) -> u32 {
        let next = step + 1;
        if self.in_loop(next) {
            next as u32
        } else {
            self.loop_start
        }
    }

    /// Number of steps in the loop region.
    pub fn loop_len(&self) -> u32 {
        self.loop_end - self.loop_start
    }
}
