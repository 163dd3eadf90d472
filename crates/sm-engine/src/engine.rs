//! The engine: audio clock, mixing graph, scheduler and recorder in one
//! single-threaded object driven by the audio thread.

use crossbeam_channel::Receiver;
use slotmap::SecondaryMap;
use sm_ir::{
    AudioBuffer, CrossfadeCurve, DeckId, DeckStatus, EnvelopeParams, EqSettings, InstrumentPreset,
    ModelError, ModelResult, PresetCatalogue, RecordingFormat, Session, Stem, StepEvent, SynthParams,
    TrackKey, TransportState, Velocity, Waveform, BLOCK_SIZE,
};

use crate::arpeggiator::Arpeggiator;
use crate::context::{AudioContext, RenderContext};
use crate::frame::Frame;
use crate::instrument::Instrument;
use crate::mixer::{Mixer, MixerSettings, TrackMix};
use crate::recorder::{Recorder, Recording};
use crate::sample_bank::{Sample, SampleBank};
use crate::scheduler::{Scheduler, StepSubscribers, SubscriptionId, GATE_FRACTION, LOOK_AHEAD, START_DELAY};
use crate::voice_pool::DEFAULT_VOICE_LIMIT;

/// How the transport winds down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopMode {
    /// Let sounding voices run their release
    #[default]
    Release,
    /// Silence every voice immediately
    Hard,
}

/// Construction-time settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSettings {
    pub sample_rate: u32,
    pub look_ahead: f64,
    pub start_delay: f64,
    pub voice_limit: usize,
    pub tempo_bpm: f64,
    pub steps_per_beat: u32,
    pub mixer: MixerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            look_ahead: LOOK_AHEAD,
            start_delay: START_DELAY,
            voice_limit: DEFAULT_VOICE_LIMIT,
            tempo_bpm: 120.0,
            steps_per_beat: 4,
            mixer: MixerSettings::default(),
        }
    }
}

/// What the engine last applied for a track.
struct SyncedTrack {
    instrument_id: String,
    mix: TrackMix,
}

fn build_instrument(presets: &PresetCatalogue, id: &str, sample_rate: u32, voice_limit: usize) -> Instrument {
    match presets.get(id) {
        Ok(preset) => Instrument::from_preset(preset, sample_rate, voice_limit),
        Err(_) => {
            log::warn!("unknown preset '{id}', using the default synth");
            let fallback = InstrumentPreset::synth(id, id, SynthParams::default());
            Instrument::from_preset(&fallback, sample_rate, voice_limit)
        }
    }
}

fn track_mix(track: &sm_ir::Track) -> TrackMix {
    TrackMix {
        gain: track.gain(),
        pan: track.pan(),
        send_a: track.send_a(),
        send_b: track.send_b(),
        muted: track.is_muted(),
    }
}

pub struct Engine {
    context: AudioContext,
    mixer: Mixer,
    bank: SampleBank,
    presets: PresetCatalogue,
    transport: TransportState,
    scheduler: Scheduler,
    subscribers: StepSubscribers,
    arpeggiators: SecondaryMap<TrackKey, Arpeggiator>,
    recorder: Recorder,
    synced: SecondaryMap<TrackKey, SyncedTrack>,
    pending: Vec<StepEvent>,
    voice_limit: usize,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_presets(settings, PresetCatalogue::builtin())
    }

    pub fn with_presets(settings: EngineSettings, presets: PresetCatalogue) -> Self {
        let context = AudioContext::new(settings.sample_rate);
        let sample_rate = context.sample_rate();
        let mut transport = TransportState::default();
        transport.set_tempo(settings.tempo_bpm);
        transport.set_steps_per_beat(settings.steps_per_beat);
        log::info!("engine at {sample_rate} Hz, {} presets", presets.len());
        Self {
            context,
            mixer: Mixer::new(sample_rate, settings.mixer),
            bank: SampleBank::new(),
            presets,
            transport,
            scheduler: Scheduler::new(settings.look_ahead, settings.start_delay),
            subscribers: StepSubscribers::new(),
            arpeggiators: SecondaryMap::new(),
            recorder: Recorder::new(),
            synced: SecondaryMap::new(),
            pending: Vec::with_capacity(64),
            voice_limit: settings.voice_limit.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    /// Audio-clock time of the next frame to render.
    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    pub fn presets(&self) -> &PresetCatalogue {
        &self.presets
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn sample_bank(&self) -> &SampleBank {
        &self.bank
    }

    /// Register decoded sample audio under the name sample zones refer to.
    pub fn load_sample(&mut self, name: &str, buffer: AudioBuffer, sample_rate: u32) {
        self.bank.insert(name, Sample::new(buffer, sample_rate));
    }

    // --- Session ---

    /// Bring track strips and instruments in line with `session`.
    pub fn sync_session(&mut self, session: &Session) {
        let now = self.current_time();
        let stale: Vec<TrackKey> = self
            .mixer
            .track_keys()
            .filter(|k| !session.contains(*k))
            .collect();
        for key in stale {
            if let Some(mut inst) = self.mixer.remove_track(key) {
                inst.kill_all();
            }
            self.synced.remove(key);
            self.arpeggiators.remove(key);
        }

        let sample_rate = self.sample_rate();
        for track in session.tracks() {
            let mix = track_mix(track);
            match self.synced.get_mut(track.id) {
                None => {
                    let inst = build_instrument(&self.presets, &track.instrument_id, sample_rate, self.voice_limit);
                    self.mixer.add_track(track.id, inst, mix);
                    self.synced.insert(
                        track.id,
                        SyncedTrack {
                            instrument_id: track.instrument_id.clone(),
                            mix,
                        },
                    );
                }
                Some(synced) => {
                    if synced.instrument_id != track.instrument_id {
                        let inst =
                            build_instrument(&self.presets, &track.instrument_id, sample_rate, self.voice_limit);
                        self.mixer.replace_instrument(track.id, inst);
                        synced.instrument_id.clone_from(&track.instrument_id);
                    }
                    if synced.mix != mix {
                        self.mixer.set_track_mix(track.id, mix, now);
                        synced.mix = mix;
                    }
                }
            }
        }
    }

    // --- Transport ---

    pub fn transport(&self) -> &TransportState {
        &self.transport
    }

    pub fn current_step(&self) -> i64 {
        self.transport.current_step
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing
    }

    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.transport.set_tempo(bpm)
    }

    pub fn set_loop(&mut self, start: u32, end: u32) {
        self.transport.set_loop(start, end);
    }

    pub fn set_steps_per_beat(&mut self, steps: u32) {
        self.transport.set_steps_per_beat(steps);
    }

    /// Start the sequencer from the loop start.
    pub fn play(&mut self, session: &Session) {
        self.sync_session(session);
        for arp in self.arpeggiators.values_mut() {
            arp.reset();
        }
        let now = self.current_time();
        self.scheduler.play(now, &mut self.transport, &mut self.pending);
        log::info!("transport playing at {:.1} BPM", self.transport.tempo_bpm);
        self.dispatch(session);
    }

    /// Stop the sequencer. No step is delivered after this returns.
    pub fn stop(&mut self, mode: StopMode) {
        self.scheduler.stop(&mut self.transport);
        self.pending.clear();
        let now = self.current_time();
        for inst in self.mixer.instruments_mut() {
            match mode {
                StopMode::Release => inst.release_all(now),
                StopMode::Hard => inst.kill_all(),
            }
        }
        log::info!("transport stopped ({mode:?})");
    }

    /// One scheduler tick against the latest session snapshot.
    pub fn tick(&mut self, session: &Session) {
        self.sync_session(session);
        let now = self.current_time();
        self.scheduler.tick(now, &mut self.transport, &mut self.pending);
        self.dispatch(session);
        self.recorder.reserve_ahead();
    }

    fn dispatch(&mut self, session: &Session) {
        let mut events = core::mem::take(&mut self.pending);
        for event in events.drain(..) {
            for track in session.tracks() {
                if track.is_muted() {
                    continue;
                }
                let notes = track.notes_at(event.step);
                if notes.is_empty() {
                    continue;
                }
                let Some(inst) = self.mixer.instrument_mut(track.id) else {
                    log::debug!("step {}: track '{}' has no instrument", event.step, track.name);
                    continue;
                };
                for note in notes {
                    let gate = note.length_steps as f64 * event.duration * GATE_FRACTION;
                    inst.play(note.pitch, note.velocity, event.time, &self.bank);
                    inst.stop(note.pitch, event.time + gate);
                }
            }
            for (key, arp) in self.arpeggiators.iter_mut() {
                let Some(note) = arp.on_step(&event) else {
                    continue;
                };
                if let Some(inst) = self.mixer.instrument_mut(key) {
                    inst.play(note.pitch, note.velocity, note.time, &self.bank);
                    inst.stop(note.pitch, note.time + note.duration);
                }
            }
            self.subscribers.publish(event);
        }
        self.pending = events;
    }

    pub fn subscribe_steps(&mut self) -> (SubscriptionId, Receiver<StepEvent>) {
        self.subscribers.subscribe()
    }

    pub fn unsubscribe_steps(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Attach (or with `None` detach) an arpeggiator driving `track`.
    pub fn set_arpeggiator(&mut self, track: TrackKey, arp: Option<Arpeggiator>) {
        match arp {
            Some(arp) => {
                self.arpeggiators.insert(track, arp);
            }
            None => {
                self.arpeggiators.remove(track);
            }
        }
    }

    pub fn arpeggiator_mut(&mut self, track: TrackKey) -> Option<&mut Arpeggiator> {
        self.arpeggiators.get_mut(track)
    }

    // --- Live play and instruments ---

    fn instrument_mut(&mut self, track: TrackKey) -> ModelResult<&mut Instrument> {
        self.mixer.instrument_mut(track).ok_or(ModelError::UnknownTrack)
    }

    pub fn play_note(&mut self, track: TrackKey, pitch: u8, velocity: Velocity) -> ModelResult<()> {
        let now = self.current_time();
        let inst = self.mixer.instrument_mut(track).ok_or(ModelError::UnknownTrack)?;
        inst.play(pitch.min(sm_ir::MAX_PITCH), velocity, now, &self.bank);
        Ok(())
    }

    /// Release a live note. Returns when it falls silent.
    pub fn stop_note(&mut self, track: TrackKey, pitch: u8) -> ModelResult<Option<f64>> {
        let now = self.current_time();
        Ok(self.instrument_mut(track)?.stop(pitch, now))
    }

    pub fn set_filter_cutoff(&mut self, track: TrackKey, hz: f32) -> ModelResult<()> {
        let now = self.current_time();
        self.instrument_mut(track)?.set_filter_cutoff(hz, now);
        Ok(())
    }

    pub fn set_filter_q(&mut self, track: TrackKey, q: f32) -> ModelResult<()> {
        let now = self.current_time();
        self.instrument_mut(track)?.set_filter_q(q, now);
        Ok(())
    }

    pub fn set_oscillator_type(&mut self, track: TrackKey, waveform: Waveform) -> ModelResult<()> {
        self.instrument_mut(track)?.set_oscillator_type(waveform);
        Ok(())
    }

    pub fn set_envelope(&mut self, track: TrackKey, params: EnvelopeParams) -> ModelResult<()> {
        self.instrument_mut(track)?.set_envelope(params);
        Ok(())
    }

    pub fn set_track_eq(&mut self, track: TrackKey, eq: EqSettings) {
        let now = self.current_time();
        self.mixer.set_track_eq(track, eq, now);
    }

    /// Voices currently allocated across all instruments.
    pub fn active_voices(&mut self) -> usize {
        self.mixer.instruments_mut().map(|i| i.active_voices()).sum()
    }

    // --- Mixer ---

    pub fn set_crossfade(&mut self, position: f32, curve: CrossfadeCurve, reverse: bool) {
        let now = self.current_time();
        if let Some(xf) = self.mixer.crossfader_mut() {
            xf.set(position, curve, reverse, now);
        }
    }

    /// Linear master volume in [0, 1].
    pub fn set_master_volume(&mut self, volume: f32) {
        let now = self.current_time();
        self.mixer.set_master_volume(volume, now);
    }

    pub fn set_compressor(&mut self, param: u16, value: f32) {
        let now = self.current_time();
        self.mixer.set_compressor(param, value, now);
    }

    pub fn set_limiter(&mut self, enabled: bool) {
        let now = self.current_time();
        self.mixer.set_limiter(enabled, now);
    }

    pub fn set_soft_clip(&mut self, enabled: bool) {
        let now = self.current_time();
        self.mixer.set_soft_clip(enabled, now);
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        let now = self.current_time();
        self.mixer.set_reverb_mix(mix, now);
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.mixer.gain_reduction_db()
    }

    // --- Decks ---

    fn deck_mut(&mut self, id: DeckId) -> Option<&mut crate::deck::Deck> {
        self.mixer.deck_mut(id)
    }

    /// Move a decoded track into a deck. Returns its duration in seconds.
    pub fn load_deck(&mut self, id: DeckId, buffer: AudioBuffer, name: &str) -> f64 {
        self.deck_mut(id).map_or(0.0, |d| d.load_buffer(buffer, name))
    }

    pub fn load_deck_stems(&mut self, id: DeckId, stems: Vec<(Stem, AudioBuffer)>, name: &str) -> f64 {
        self.deck_mut(id).map_or(0.0, |d| d.load_stems(stems, name))
    }

    pub fn unload_deck(&mut self, id: DeckId) {
        if let Some(d) = self.deck_mut(id) {
            d.unload();
        }
    }

    pub fn play_deck(&mut self, id: DeckId) {
        if let Some(d) = self.deck_mut(id) {
            d.play();
        }
    }

    pub fn pause_deck(&mut self, id: DeckId) {
        if let Some(d) = self.deck_mut(id) {
            d.pause();
        }
    }

    pub fn toggle_deck(&mut self, id: DeckId) {
        if let Some(d) = self.deck_mut(id) {
            d.toggle();
        }
    }

    pub fn seek_deck(&mut self, id: DeckId, progress: f32) {
        if let Some(d) = self.deck_mut(id) {
            d.seek(progress);
        }
    }

    pub fn set_deck_rate(&mut self, id: DeckId, rate: f32) {
        let now = self.current_time();
        if let Some(d) = self.deck_mut(id) {
            d.set_playback_rate(rate, now);
        }
    }

    pub fn set_deck_eq(&mut self, id: DeckId, eq: EqSettings) {
        let now = self.current_time();
        if let Some(d) = self.deck_mut(id) {
            d.set_eq(eq, now);
        }
    }

    pub fn set_stem_gain(&mut self, id: DeckId, stem: Stem, gain: f32) {
        let now = self.current_time();
        if let Some(d) = self.deck_mut(id) {
            d.set_stem_gain(stem, gain, now);
        }
    }

    pub fn set_deck_gain(&mut self, id: DeckId, gain: f32) {
        let now = self.current_time();
        self.mixer.set_deck_gain(id, gain, now);
    }

    pub fn set_deck_pan(&mut self, id: DeckId, pan: f32) {
        let now = self.current_time();
        self.mixer.set_deck_pan(id, pan, now);
    }

    pub fn deck_status(&self, id: DeckId) -> DeckStatus {
        self.mixer.deck(id).map(|d| d.status()).unwrap_or_default()
    }

    // --- Recording ---

    /// Start capturing the master output. Returns the capture this one replaced.
    pub fn start_recording(
        &mut self,
        name: &str,
        format: RecordingFormat,
        channels: Vec<String>,
        started_at_ms: u64,
    ) -> Option<Recording> {
        let sample_rate = self.sample_rate();
        self.recorder.start(name, format, channels, started_at_ms, sample_rate)
    }

    /// Finish the capture. A hard stop also halts the transport and every voice.
    pub fn stop_recording(&mut self, mode: StopMode) -> Option<Recording> {
        if mode == StopMode::Hard {
            self.stop(StopMode::Hard);
        }
        self.recorder.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    // --- Rendering ---

    /// Render the next `frames` frames (at most one block) and return the master output.
    pub fn render_block(&mut self, frames: usize) -> &AudioBuffer {
        let frames = frames.clamp(1, BLOCK_SIZE);
        let ctx = self.context.render_context(frames);
        self.render_graph(&ctx);
        self.recorder.capture(self.mixer.output(), frames);
        self.context.advance(frames);
        self.mixer.output()
    }

    #[cfg(feature = "alloc_check")]
    fn render_graph(&mut self, ctx: &RenderContext) {
        let (mixer, bank) = (&mut self.mixer, &self.bank);
        assert_no_alloc::assert_no_alloc(|| {
            mixer.render(ctx, bank);
        });
    }

    #[cfg(not(feature = "alloc_check"))]
    fn render_graph(&mut self, ctx: &RenderContext) {
        self.mixer.render(ctx, &self.bank);
    }

    /// Fill `out` with stereo frames, block by block.
    pub fn render_frames(&mut self, out: &mut [Frame]) {
        for chunk in out.chunks_mut(BLOCK_SIZE) {
            let block = self.render_block(chunk.len());
            let (left, right) = (block.channel(0), block.channel(1));
            for (i, frame) in chunk.iter_mut().enumerate() {
                *frame = Frame::new(left[i], right[i]);
            }
        }
    }

    /// Append `frames` interleaved stereo frames to `out`.
    pub fn render_interleaved(&mut self, frames: usize, out: &mut Vec<f32>) {
        out.reserve(frames * 2);
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE);
            self.render_block(n).write_interleaved(n, out);
            remaining -= n;
        }
    }
}
