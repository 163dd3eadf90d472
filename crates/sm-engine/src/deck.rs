//! DJ deck player: one loaded track (or its stems) with rate, EQ and seek.

use sm_ir::{AudioBuffer, DeckId, DeckStatus, EqSettings, Stem, BLOCK_SIZE};

use crate::context::RenderContext;
use crate::effects::{Effect, ThreeBandEq};
use crate::param::AudioParam;

/// Playback rate bounds.
pub const MIN_RATE: f32 = 0.25;
pub const MAX_RATE: f32 = 4.0;

enum DeckSource {
    Full(AudioBuffer),
    Stems([Option<AudioBuffer>; 4]),
}

impl DeckSource {
    fn frames(&self) -> usize {
        match self {
            DeckSource::Full(buf) => buf.frames(),
            DeckSource::Stems(stems) => stems.iter().flatten().map(AudioBuffer::frames).max().unwrap_or(0),
        }
    }
}

struct LoadedTrack {
    source: DeckSource,
    name: String,
}

/// Linearly interpolated read; mono sources feed both sides.
fn read(buf: &AudioBuffer, ch: usize, pos: f64) -> f32 {
    let ch = ch.min(buf.channels().saturating_sub(1));
    let data = buf.channel(ch);
    let idx = pos as usize;
    let frac = (pos - idx as f64) as f32;
    let a = data.get(idx).copied().unwrap_or(0.0);
    let b = data.get(idx + 1).copied().unwrap_or(0.0);
    a + (b - a) * frac
}

pub struct Deck {
    id: DeckId,
    track: Option<LoadedTrack>,
    /// Read position in frames
    position: f64,
    playing: bool,
    rate: AudioParam,
    stem_gains: [AudioParam; 4],
    eq: ThreeBandEq,
    sample_rate: u32,
    rate_values: [f32; BLOCK_SIZE],
}

impl Deck {
    pub fn new(id: DeckId, sample_rate: u32) -> Self {
        Self {
            id,
            track: None,
            position: 0.0,
            playing: false,
            rate: AudioParam::new(1.0, MIN_RATE, MAX_RATE),
            stem_gains: core::array::from_fn(|_| AudioParam::new(1.0, 0.0, 1.0)),
            eq: ThreeBandEq::new(),
            sample_rate,
            rate_values: [1.0; BLOCK_SIZE],
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Take ownership of `buffer` (already at the engine rate). Returns its duration.
    pub fn load_buffer(&mut self, buffer: AudioBuffer, name: &str) -> f64 {
        self.install(DeckSource::Full(buffer), name)
    }

    /// Load separated stems. Missing stems stay silent.
    pub fn load_stems(&mut self, stems: Vec<(Stem, AudioBuffer)>, name: &str) -> f64 {
        let mut slots: [Option<AudioBuffer>; 4] = Default::default();
        for (stem, buf) in stems {
            slots[stem.index()] = Some(buf);
        }
        self.install(DeckSource::Stems(slots), name)
    }

    fn install(&mut self, source: DeckSource, name: &str) -> f64 {
        self.playing = false;
        self.position = 0.0;
        self.eq.reset();
        self.track = Some(LoadedTrack {
            source,
            name: name.to_owned(),
        });
        log::info!("deck {:?}: loaded '{}' ({:.1}s)", self.id, name, self.duration_secs());
        self.duration_secs()
    }

    pub fn unload(&mut self) {
        self.track = None;
        self.playing = false;
        self.position = 0.0;
    }

    pub fn is_loaded(&self) -> bool {
        self.track.is_some()
    }

    pub fn has_stems(&self) -> bool {
        matches!(self.track, Some(LoadedTrack { source: DeckSource::Stems(_), .. }))
    }

    /// Start playback. Ignored while nothing is loaded; restarts from the top at the end.
    pub fn play(&mut self) {
        let Some(track) = &self.track else {
            log::debug!("deck {:?}: play ignored, nothing loaded", self.id);
            return;
        };
        if self.position >= track.source.frames() as f64 {
            self.position = 0.0;
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Jump to a fraction of the track, clamped to [0, 1].
    pub fn seek(&mut self, progress: f32) {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        self.position = progress as f64 * self.frames() as f64;
    }

    pub fn set_playback_rate(&mut self, rate: f32, at: f64) {
        self.rate.smooth_to(rate, at);
    }

    pub fn playback_rate(&self) -> f32 {
        self.rate.settled_value()
    }

    pub fn set_eq(&mut self, eq: EqSettings, at: f64) {
        self.eq.set_eq(eq, at);
    }

    pub fn eq(&self) -> EqSettings {
        self.eq.settings()
    }

    pub fn set_stem_gain(&mut self, stem: Stem, gain: f32, at: f64) {
        self.stem_gains[stem.index()].smooth_to(gain, at);
    }

    pub fn stem_gain(&self, stem: Stem) -> f32 {
        self.stem_gains[stem.index()].settled_value()
    }

    fn frames(&self) -> usize {
        self.track.as_ref().map_or(0, |t| t.source.frames())
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn status(&self) -> DeckStatus {
        let frames = self.frames();
        DeckStatus {
            is_playing: self.playing,
            progress: if frames == 0 {
                0.0
            } else {
                (self.position / frames as f64).clamp(0.0, 1.0) as f32
            },
            duration_secs: self.duration_secs(),
            track_name: self.track.as_ref().map(|t| t.name.clone()),
        }
    }

    /// Render one block into `out` (overwritten), then run the deck EQ.
    pub fn render(&mut self, ctx: &RenderContext, out: &mut AudioBuffer) {
        out.silence();
        let frames = ctx.frames.min(BLOCK_SIZE).min(out.frames());
        if self.playing {
            if let Some(track) = &self.track {
                let len = track.source.frames() as f64;
                self.rate.fill(ctx.start_time, ctx.dt(), &mut self.rate_values[..frames]);
                let mut rendered = frames;
                for i in 0..frames {
                    if self.position >= len {
                        rendered = i;
                        break;
                    }
                    let pos = self.position;
                    for ch in 0..2 {
                        out.channel_mut(ch)[i] = match &track.source {
                            DeckSource::Full(buf) => read(buf, ch, pos),
                            DeckSource::Stems(stems) => {
                                let t = ctx.time_at(i);
                                stems
                                    .iter()
                                    .zip(&self.stem_gains)
                                    .filter_map(|(s, g)| s.as_ref().map(|s| read(s, ch, pos) * g.value_at(t)))
                                    .sum()
                            }
                        };
                    }
                    self.position += self.rate_values[i] as f64;
                }
                if rendered < frames || self.position >= len {
                    self.playing = false;
                    self.position = len;
                    log::debug!("deck {:?}: reached end", self.id);
                }
            }
        }
        self.eq.process(ctx, out);
        self.rate.prune(ctx.end_time());
        for g in &mut self.stem_gains {
            g.prune(ctx.end_time());
        }
    }
}
