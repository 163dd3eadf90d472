//! Planar multichannel f32 audio buffer.

use alloc::vec;
use alloc::vec::Vec;

/// Maximum number of audio channels per buffer.
pub const MAX_CHANNELS: usize = 8;

/// Number of frames rendered per engine block.
pub const BLOCK_SIZE: usize = 256;

/// A multichannel f32 audio buffer in planar layout.
///
/// `data[ch * frames + frame]` holds the sample for channel `ch` at `frame`.
/// Deck tracks, sample zones and every node output in the mixing graph use
/// this type.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Create a silent buffer. Channel count is clamped to [1, MAX_CHANNELS].
    pub fn new(channels: usize, frames: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    /// Silent stereo buffer of one engine block.
    pub fn block() -> Self {
        Self::new(2, BLOCK_SIZE)
    }

    /// Build a planar buffer from interleaved samples.
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let frames = samples.len() / channels;
        let mut buf = Self::new(channels, frames);
        for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
            for (ch, &s) in chunk.iter().enumerate() {
                buf.data[ch * frames + frame] = s;
            }
        }
        buf
    }

    /// Append this buffer's first `frames` frames to `out` in interleaved order.
    pub fn write_interleaved(&self, frames: usize, out: &mut Vec<f32>) {
        let frames = frames.min(self.frames);
        for frame in 0..frames {
            for ch in 0..self.channels {
                out.push(self.data[ch * self.frames + frame]);
            }
        }
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// True when the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Length in seconds at `sample_rate`.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / sample_rate as f64
    }

    /// Read-only access to one channel's samples.
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Mutable access to one channel's samples.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        let len = self.frames;
        &mut self.data[start..start + len]
    }

    /// Mutable access to the first two channels at once. `None` for mono.
    pub fn stereo_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        if self.channels < 2 {
            return None;
        }
        let (left, rest) = self.data.split_at_mut(self.frames);
        Some((left, &mut rest[..self.frames]))
    }

    /// Sample at (`ch`, `frame`), mapping missing channels onto the last one.
    #[inline]
    pub fn sample(&self, ch: usize, frame: usize) -> f32 {
        let ch = ch.min(self.channels - 1);
        self.data.get(ch * self.frames + frame).copied().unwrap_or(0.0)
    }

    /// Overwrite overlapping channels/frames with `source`, silencing the rest.
    pub fn copy_from(&mut self, source: &AudioBuffer) {
        self.silence();
        self.mix_from(source);
    }

    /// Sum overlapping channels from `source` into this buffer.
    pub fn mix_from(&mut self, source: &AudioBuffer) {
        self.mix_from_scaled(source, 1.0);
    }

    /// Sum overlapping channels from `source` into this buffer with gain.
    pub fn mix_from_scaled(&mut self, source: &AudioBuffer, gain: f32) {
        let chs = self.channels.min(source.channels);
        let frs = self.frames.min(source.frames);
        for ch in 0..chs {
            let src = source.channel(ch);
            let dst = self.channel_mut(ch);
            for (d, s) in dst[..frs].iter_mut().zip(&src[..frs]) {
                *d += *s * gain;
            }
        }
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.data {
            *s *= gain;
        }
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
