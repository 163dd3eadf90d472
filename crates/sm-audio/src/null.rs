//! Output that discards audio, for headless runs and tests.

use std::time::{Duration, Instant};

use sm_engine::Frame;

use crate::traits::{AudioError, AudioOutput};

/// Swallows frames. When paced, `write` blocks so frames are consumed
/// no faster than real time, like a device would.
pub struct NullOutput {
    sample_rate: u32,
    paced: bool,
    started: Option<Instant>,
    frames_written: u64,
    peak: f32,
}

impl NullOutput {
    pub fn new(sample_rate: u32, paced: bool) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            paced,
            started: None,
            frames_written: 0,
            peak: 0.0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Largest absolute sample seen so far.
    pub fn peak(&self) -> f32 {
        self.peak
    }
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError> {
        for f in frames {
            self.peak = self.peak.max(f.left.abs()).max(f.right.abs());
        }
        self.frames_written += frames.len() as u64;
        if let (true, Some(started)) = (self.paced, self.started) {
            let due = Duration::from_secs_f64(self.frames_written as f64 / self.sample_rate as f64);
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.started = None;
        self.frames_written = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaced_counts_frames_and_peak() {
        let mut out = NullOutput::new(48000, false);
        out.start().unwrap();
        out.write(&[Frame::new(0.5, -0.75), Frame::silence()]).unwrap();
        assert_eq!(out.frames_written(), 2);
        assert_eq!(out.peak(), 0.75);
    }

    #[test]
    fn paced_write_takes_real_time() {
        let mut out = NullOutput::new(1000, true);
        out.start().unwrap();
        let begin = Instant::now();
        out.write(&[Frame::silence(); 50]).unwrap();
        assert!(begin.elapsed() >= Duration::from_millis(45));
    }
}
