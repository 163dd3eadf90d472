//! Master-bus recorder.

use sm_ir::{AudioBuffer, RecordingFormat, BLOCK_SIZE};

/// Seconds of audio held by one recording chunk.
const CHUNK_SECONDS: usize = 5;

/// Chunk slots reserved when a capture starts.
const CHUNK_SLOTS: usize = 64;

/// Audio captured between `start` and `stop`, interleaved stereo.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub name: String,
    pub format: RecordingFormat,
    /// Labels of the channels armed for this take
    pub channels: Vec<String>,
    /// Wall-clock start, milliseconds since the Unix epoch
    pub started_at_ms: u64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Capture {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn duration_ms(&self) -> u64 {
        (self.duration_secs() * 1000.0).round() as u64
    }

    /// Planar copy of the captured audio.
    pub fn to_buffer(&self) -> AudioBuffer {
        AudioBuffer::from_interleaved(&self.samples, 2)
    }
}

/// A capture in progress.
///
/// Audio lands in fixed-size chunks that never reallocate once created.
/// The next chunk is prepared between blocks by [`Recorder::reserve_ahead`],
/// and [`Recording::finish`] joins them off the audio thread.
#[derive(Debug)]
pub struct Recording {
    name: String,
    format: RecordingFormat,
    channels: Vec<String>,
    started_at_ms: u64,
    sample_rate: u32,
    chunk_len: usize,
    chunks: Vec<Vec<f32>>,
    spare: Option<Vec<f32>>,
}

impl Recording {
    fn new(name: &str, format: RecordingFormat, channels: Vec<String>, started_at_ms: u64, sample_rate: u32) -> Self {
        let chunk_len = (sample_rate as usize * 2 * CHUNK_SECONDS).max(BLOCK_SIZE * 2);
        let mut chunks = Vec::with_capacity(CHUNK_SLOTS);
        chunks.push(Vec::with_capacity(chunk_len));
        Self {
            name: name.to_owned(),
            format,
            channels,
            started_at_ms,
            sample_rate,
            chunk_len,
            chunks,
            spare: Some(Vec::with_capacity(chunk_len)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    fn reserve(&mut self) {
        if self.spare.is_none() {
            self.spare = Some(Vec::with_capacity(self.chunk_len));
        }
        self.chunks.reserve(1);
    }

    fn append(&mut self, block: &AudioBuffer, frames: usize) {
        let needed = frames.min(block.frames()) * 2;
        let full = self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.capacity() - chunk.len() < needed);
        if full {
            let chunk_len = self.chunk_len;
            let next = self.spare.take().unwrap_or_else(|| Vec::with_capacity(chunk_len));
            self.chunks.push(next);
        }
        if let Some(chunk) = self.chunks.last_mut() {
            block.write_interleaved(frames, chunk);
        }
    }

    /// Join the chunks into a finished capture.
    pub fn finish(self) -> Capture {
        Capture {
            samples: self.chunks.concat(),
            name: self.name,
            format: self.format,
            channels: self.channels,
            started_at_ms: self.started_at_ms,
            sample_rate: self.sample_rate,
        }
    }
}

#[derive(Default)]
pub struct Recorder {
    active: Option<Recording>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a new capture. A capture already running is stopped and returned.
    pub fn start(
        &mut self,
        name: &str,
        format: RecordingFormat,
        channels: Vec<String>,
        started_at_ms: u64,
        sample_rate: u32,
    ) -> Option<Recording> {
        let previous = self.stop();
        log::info!("recording '{name}' ({format:?})");
        self.active = Some(Recording::new(name, format, channels, started_at_ms, sample_rate));
        previous
    }

    pub fn stop(&mut self) -> Option<Recording> {
        let recording = self.active.take()?;
        log::info!("recording '{}' stopped after {:.2}s", recording.name, recording.duration_secs());
        Some(recording)
    }

    /// Make sure the next chunk exists before a block needs it.
    pub fn reserve_ahead(&mut self) {
        if let Some(active) = &mut self.active {
            active.reserve();
        }
    }

    /// Append the first `frames` frames of a master block.
    pub fn capture(&mut self, block: &AudioBuffer, frames: usize) {
        if let Some(active) = &mut self.active {
            active.append(block, frames);
        }
    }

    /// Seconds captured so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.active.as_ref().map_or(0.0, Recording::duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: f32) -> AudioBuffer {
        let mut b = AudioBuffer::new(2, 4);
        b.channel_mut(0).fill(value);
        b.channel_mut(1).fill(-value);
        b
    }

    #[test]
    fn idle_recorder_ignores_blocks() {
        let mut rec = Recorder::new();
        rec.capture(&block(1.0), 4);
        assert!(rec.stop().is_none());
    }

    #[test]
    fn capture_interleaves_and_times() {
        let mut rec = Recorder::new();
        rec.start("take", RecordingFormat::WavPcm16, vec!["master".into()], 123, 4);
        rec.capture(&block(0.5), 4);
        rec.capture(&block(0.25), 2);
        let cap = rec.stop().unwrap().finish();
        assert_eq!(cap.frames(), 6);
        assert_eq!(&cap.samples[..2], &[0.5, -0.5]);
        assert_eq!(&cap.samples[8..10], &[0.25, -0.25]);
        assert_eq!(cap.duration_ms(), 1500);
        assert_eq!(cap.started_at_ms, 123);
        assert_eq!(cap.to_buffer().frames(), 6);
    }

    #[test]
    fn starting_again_returns_previous_take() {
        let mut rec = Recorder::new();
        rec.start("one", RecordingFormat::WavPcm16, Vec::new(), 0, 100);
        rec.capture(&block(0.1), 4);
        let prev = rec.start("two", RecordingFormat::WavFloat32, Vec::new(), 10, 100);
        assert_eq!(prev.map(|r| r.finish().name), Some("one".to_string()));
        assert!(rec.is_recording());
        assert_eq!(rec.elapsed_secs(), 0.0);
    }

    #[test]
    fn long_take_never_moves_written_chunks() {
        let mut rec = Recorder::new();
        rec.start("long", RecordingFormat::WavFloat32, Vec::new(), 0, 4);
        let chunk_len = rec.active.as_ref().unwrap().chunk_len;
        let blocks = chunk_len / 8 * 3 + 1;
        let mut first_chunk = None;
        for i in 0..blocks {
            rec.reserve_ahead();
            rec.capture(&block(i as f32), 4);
            let active = rec.active.as_ref().unwrap();
            let ptr = active.chunks[0].as_ptr();
            assert_eq!(*first_chunk.get_or_insert(ptr), ptr);
            assert!(active.chunks.iter().all(|c| c.capacity() == chunk_len));
        }
        let rec = rec.stop().unwrap();
        assert_eq!(rec.chunks.len(), 4);
        assert_eq!(rec.frames(), blocks * 4);
        let cap = rec.finish();
        assert_eq!(cap.frames(), blocks * 4);
        let last = (blocks - 1) as f32;
        assert_eq!(&cap.samples[cap.samples.len() - 2..], &[last, -last]);
        assert_eq!(&cap.samples[chunk_len..chunk_len + 2], &[(chunk_len / 8) as f32, -((chunk_len / 8) as f32)]);
    }
}
