//! The audio clock.

/// Process-wide audio clock: sample rate plus frames rendered so far.
///
/// Exactly one exists per [`Engine`](crate::Engine). Every scheduled note
/// and parameter change is expressed in seconds on this clock.
#[derive(Clone, Debug)]
pub struct AudioContext {
    sample_rate: u32,
    frame: u64,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered since the context was created.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Audio-clock time of the next frame to be rendered.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    /// Context for rendering the next `frames` frames.
    pub fn render_context(&self, frames: usize) -> RenderContext {
        RenderContext {
            sample_rate: self.sample_rate,
            start_time: self.current_time(),
            frames,
        }
    }

    pub(crate) fn advance(&mut self, frames: usize) {
        self.frame += frames as u64;
    }
}

/// Timing of one render block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderContext {
    pub sample_rate: u32,
    /// Audio-clock time of the first frame
    pub start_time: f64,
    pub frames: usize,
}

impl RenderContext {
    /// Seconds per frame.
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate as f64
    }

    /// Audio-clock time of frame `i` in this block.
    #[inline]
    pub fn time_at(&self, i: usize) -> f64 {
        self.start_time + i as f64 * self.dt()
    }

    /// Audio-clock time just after the last frame.
    pub fn end_time(&self) -> f64 {
        self.time_at(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_by_frames() {
        let mut ctx = AudioContext::new(48000);
        ctx.advance(24000);
        assert!((ctx.current_time() - 0.5).abs() < 1e-12);
        let block = ctx.render_context(480);
        assert!((block.end_time() - 0.51).abs() < 1e-9);
    }
}
