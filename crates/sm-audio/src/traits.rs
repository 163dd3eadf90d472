//! Audio output trait and error types.

use sm_engine::Frame;
use thiserror::Error;

/// Error type for audio operations.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),

    #[error("stream create error: {0}")]
    StreamCreate(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("no audio device available")]
    NoDevice,
}

/// Trait for audio output backends.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Write frames to the output, blocking until all of them are queued.
    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}
