//! Step events emitted by the look-ahead scheduler.

/// One scheduled sequencer step.
///
/// `time` is on the audio clock, so consumers can start voices exactly on
/// the step even though the event is delivered up to one look-ahead window
/// early.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepEvent {
    /// Step index inside the loop region
    pub step: u32,
    /// Audio-clock start time in seconds
    pub time: f64,
    /// Step length in seconds at the tempo in force when scheduled
    pub duration: f64,
}

impl StepEvent {
    /// Audio-clock time the step ends.
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }
}
