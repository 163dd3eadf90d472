//! Headless controller for smuve.
//!
//! Owns the session model and take list, runs the audio thread and renders
//! offline. The CLI and the integration tests both drive it.

mod command;
mod config;
mod error;
mod pattern;
mod takes;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use sm_audio::{AudioError, AudioOutput, CpalOutput, NullOutput};
use sm_engine::Engine;

pub use command::{EngineCommand, Meters};
pub use config::{load_config, save_config, EngineConfig};
pub use error::{ControllerError, ControllerResult};
pub use pattern::{PatternFile, PatternTrack};
pub use takes::{assemble_take, export_take};

// Re-export common types so callers don't need sm-ir/sm-engine directly.
pub use sm_engine::effects::compressor as compressor_params;
pub use sm_engine::{ArpMode, Arpeggiator, Frame, StopMode, SubscriptionId};
pub use sm_ir::{
    AudioBuffer, CrossfadeCurve, DeckId, DeckStatus, EnvelopeParams, EqSettings, ModelError, Note,
    PresetCatalogue, RecordingFormat, Session, Stem, StepEvent, Take, TakeId, TakeList, Track, TrackKey,
    TransportState, Velocity, Waveform,
};

/// How long a query waits for the audio thread.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    /// No audio thread; offline rendering still works
    Offline,
    Running,
}

/// Where the audio thread sends its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// Default output device through cpal
    Device,
    /// Discard audio; `paced` keeps it to real time
    Null { paced: bool },
}

/// Transport and mixer settings mirrored on the controller so that every
/// engine it builds starts from the same state.
#[derive(Clone, Debug)]
struct MixState {
    transport: TransportState,
    /// Linear, 0 to 1
    master_volume: f32,
    compressor: Vec<(u16, f32)>,
    limiter: bool,
    soft_clip: bool,
    reverb_mix: Option<f32>,
    crossfade: Option<(f32, CrossfadeCurve, bool)>,
}

impl MixState {
    fn new(config: &EngineConfig) -> Self {
        let mut transport = TransportState::default();
        transport.set_tempo(config.tempo_bpm);
        transport.set_steps_per_beat(config.steps_per_beat);
        Self {
            transport,
            master_volume: (config.master_volume / 100.0).clamp(0.0, 1.0),
            compressor: Vec::new(),
            limiter: false,
            soft_clip: true,
            reverb_mix: None,
            crossfade: None,
        }
    }

    fn apply(&self, engine: &mut Engine) {
        engine.set_tempo(self.transport.tempo_bpm);
        engine.set_steps_per_beat(self.transport.steps_per_beat);
        engine.set_loop(self.transport.loop_start, self.transport.loop_end);
        engine.set_master_volume(self.master_volume);
        for &(param, value) in &self.compressor {
            engine.set_compressor(param, value);
        }
        engine.set_limiter(self.limiter);
        engine.set_soft_clip(self.soft_clip);
        if let Some(mix) = self.reverb_mix {
            engine.set_reverb_mix(mix);
        }
        if let Some((position, curve, reverse)) = self.crossfade {
            engine.set_crossfade(position, curve, reverse);
        }
    }
}

#[derive(Clone)]
struct SampleSource {
    name: String,
    buffer: AudioBuffer,
    sample_rate: u32,
}

/// Everything needed to build an engine away from the controller.
#[derive(Clone)]
struct EngineSetup {
    config: EngineConfig,
    presets: PresetCatalogue,
    samples: Vec<SampleSource>,
    mix: MixState,
}

impl EngineSetup {
    fn build(&self, sample_rate: u32, session: &Session) -> Engine {
        let mut engine = Engine::with_presets(self.config.engine_settings(sample_rate), self.presets.clone());
        for s in &self.samples {
            engine.load_sample(&s.name, s.buffer.clone(), s.sample_rate);
        }
        self.mix.apply(&mut engine);
        engine.sync_session(session);
        engine
    }
}

struct AudioHandle {
    commands: Sender<EngineCommand>,
    stop_signal: Arc<AtomicBool>,
    current_step: Arc<AtomicI64>,
    finished: Arc<AtomicBool>,
    sample_rate: u32,
    thread: Option<JoinHandle<()>>,
}

/// Headless controller: owns the model and talks to the engine.
pub struct Controller {
    config: EngineConfig,
    session: Session,
    snapshot: Arc<ArcSwap<Session>>,
    presets: PresetCatalogue,
    mix: MixState,
    samples: Vec<SampleSource>,
    takes: TakeList,
    audio: Option<AudioHandle>,
}

impl Controller {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            mix: MixState::new(&config),
            config,
            session: Session::new(),
            snapshot: Arc::new(ArcSwap::from_pointee(Session::new())),
            presets: PresetCatalogue::builtin(),
            samples: Vec::new(),
            takes: TakeList::new(),
            audio: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        match &self.audio {
            Some(a) if !a.finished.load(Ordering::Relaxed) => EngineStatus::Running,
            _ => EngineStatus::Offline,
        }
    }

    /// Sample rate of the running engine, or the configured offline rate.
    pub fn sample_rate(&self) -> u32 {
        self.audio.as_ref().map_or(self.config.sample_rate, |a| a.sample_rate)
    }

    fn setup(&self) -> EngineSetup {
        EngineSetup {
            config: self.config.clone(),
            presets: self.presets.clone(),
            samples: self.samples.clone(),
            mix: self.mix.clone(),
        }
    }

    // --- Audio thread ---

    /// Start the audio thread. On failure the controller stays offline.
    pub fn start(&mut self, output: OutputKind) -> ControllerResult<()> {
        if self.status() == EngineStatus::Running {
            return Ok(());
        }
        self.shutdown();

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let current_step = Arc::new(AtomicI64::new(-1));
        let finished = Arc::new(AtomicBool::new(false));

        let flags = ThreadFlags {
            stop_signal: stop_signal.clone(),
            current_step: current_step.clone(),
            finished: finished.clone(),
        };
        let setup = self.setup();
        let snapshot = self.snapshot.clone();
        let thread = std::thread::Builder::new()
            .name("smuve-audio".into())
            .spawn(move || audio_thread(setup, output, command_rx, snapshot, flags, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                log::info!("engine running at {sample_rate} Hz");
                self.audio = Some(AudioHandle {
                    commands,
                    stop_signal,
                    current_step,
                    finished,
                    sample_rate,
                    thread: Some(thread),
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                log::warn!("audio unavailable, staying offline: {e}");
                Err(e.into())
            }
            Err(_) => {
                let _ = thread.join();
                Err(ControllerError::Disconnected)
            }
        }
    }

    /// Stop the audio thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = audio.thread.take() {
                let _ = handle.join();
            }
            log::info!("engine offline");
        }
    }

    fn send(&self, command: EngineCommand) -> ControllerResult<()> {
        let audio = self.audio.as_ref().ok_or(ControllerError::Offline)?;
        audio.commands.send(command).map_err(|_| ControllerError::Disconnected)
    }

    /// Send if running. Offline changes live only in the mirrored state.
    fn forward(&self, command: EngineCommand) -> ControllerResult<()> {
        match self.send(command) {
            Err(ControllerError::Offline) => Ok(()),
            other => other,
        }
    }

    fn request<R>(&self, make: impl FnOnce(Sender<R>) -> EngineCommand) -> ControllerResult<R> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(make(tx))?;
        rx.recv_timeout(REPLY_TIMEOUT).map_err(|_| ControllerError::Disconnected)
    }

    // --- Session model ---

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn presets(&self) -> &PresetCatalogue {
        &self.presets
    }

    /// Make the current model visible to the audio thread.
    fn publish(&self) {
        self.snapshot.store(Arc::new(self.session.clone()));
    }

    fn edit<R>(&mut self, f: impl FnOnce(&mut Session) -> Result<R, ModelError>) -> ControllerResult<R> {
        let result = f(&mut self.session)?;
        self.publish();
        Ok(result)
    }

    pub fn add_track(&mut self, name: &str, instrument_id: &str) -> TrackKey {
        if self.presets.get(instrument_id).is_err() {
            log::warn!("track '{name}' uses unknown preset '{instrument_id}'");
        }
        let key = self.session.add_track(name, instrument_id);
        self.publish();
        key
    }

    pub fn remove_track(&mut self, key: TrackKey) -> ControllerResult<Track> {
        self.edit(|s| s.remove_track(key))
    }

    pub fn add_note(&mut self, key: TrackKey, pitch: u8, step: u32, length_steps: u32, velocity: f32) -> ControllerResult<()> {
        self.edit(|s| s.add_note(key, pitch, step, length_steps, velocity))
    }

    pub fn remove_note(&mut self, key: TrackKey, pitch: u8, step: u32) -> ControllerResult<Option<Note>> {
        self.edit(|s| s.remove_note(key, pitch, step))
    }

    /// Returns true if the note now exists.
    pub fn toggle_note(&mut self, key: TrackKey, pitch: u8, step: u32, length_steps: u32, velocity: f32) -> ControllerResult<bool> {
        self.edit(|s| s.toggle_note(key, pitch, step, length_steps, velocity))
    }

    pub fn update_note_velocity(&mut self, key: TrackKey, pitch: u8, step: u32, velocity: f32) -> ControllerResult<bool> {
        self.edit(|s| s.update_note_velocity(key, pitch, step, velocity))
    }

    pub fn clear_track(&mut self, key: TrackKey) -> ControllerResult<()> {
        self.edit(|s| s.clear_track(key))
    }

    pub fn set_instrument(&mut self, key: TrackKey, instrument_id: &str) -> ControllerResult<()> {
        self.presets.get(instrument_id)?;
        self.edit(|s| s.set_instrument(key, instrument_id))
    }

    pub fn set_track_gain(&mut self, key: TrackKey, gain: f32) -> ControllerResult<()> {
        self.edit(|s| s.track_mut(key).map(|t| t.set_gain(gain)))
    }

    pub fn set_track_pan(&mut self, key: TrackKey, pan: f32) -> ControllerResult<()> {
        self.edit(|s| s.track_mut(key).map(|t| t.set_pan(pan)))
    }

    pub fn set_track_sends(&mut self, key: TrackKey, send_a: f32, send_b: f32) -> ControllerResult<()> {
        self.edit(|s| s.track_mut(key).map(|t| t.set_sends(send_a, send_b)))
    }

    pub fn set_track_muted(&mut self, key: TrackKey, muted: bool) -> ControllerResult<()> {
        self.edit(|s| s.track_mut(key).map(|t| t.set_muted(muted)))
    }

    /// Replace the session and transport settings with a pattern's.
    pub fn load_pattern(&mut self, pattern: &PatternFile) -> ControllerResult<()> {
        self.session = pattern.to_session();
        self.publish();
        let transport = pattern.transport();
        self.set_tempo(transport.tempo_bpm)?;
        self.set_steps_per_beat(transport.steps_per_beat)?;
        self.set_loop(transport.loop_start, transport.loop_end)
    }

    pub fn pattern(&self) -> PatternFile {
        PatternFile::from_session(&self.session, &self.mix.transport)
    }

    // --- Transport ---

    pub fn transport(&self) -> &TransportState {
        &self.mix.transport
    }

    pub fn play(&mut self) -> ControllerResult<()> {
        self.send(EngineCommand::Play)
    }

    /// Once this returns the step reads -1 and no further step events
    /// are published.
    pub fn stop(&mut self, mode: StopMode) -> ControllerResult<()> {
        if self.audio.is_none() {
            return Ok(());
        }
        self.request(|reply| EngineCommand::Stop { mode, reply })
    }

    /// Returns the tempo actually applied.
    pub fn set_tempo(&mut self, bpm: f64) -> ControllerResult<f64> {
        let applied = self.mix.transport.set_tempo(bpm);
        self.forward(EngineCommand::SetTempo(applied))?;
        Ok(applied)
    }

    pub fn set_loop(&mut self, start: u32, end: u32) -> ControllerResult<()> {
        self.mix.transport.set_loop(start, end);
        self.forward(EngineCommand::SetLoop {
            start: self.mix.transport.loop_start,
            end: self.mix.transport.loop_end,
        })
    }

    pub fn set_steps_per_beat(&mut self, steps: u32) -> ControllerResult<()> {
        self.mix.transport.set_steps_per_beat(steps);
        self.forward(EngineCommand::SetStepsPerBeat(self.mix.transport.steps_per_beat))
    }

    pub fn subscribe_steps(&self) -> ControllerResult<(SubscriptionId, Receiver<StepEvent>)> {
        self.request(EngineCommand::Subscribe)
    }

    pub fn unsubscribe_steps(&self, id: SubscriptionId) -> ControllerResult<()> {
        self.send(EngineCommand::Unsubscribe(id))
    }

    /// Step most recently scheduled, or -1 while stopped.
    pub fn current_step(&self) -> i64 {
        self.audio
            .as_ref()
            .filter(|a| !a.finished.load(Ordering::Relaxed))
            .map_or(-1, |a| a.current_step.load(Ordering::Relaxed))
    }

    pub fn is_playing(&self) -> bool {
        self.current_step() >= 0
    }

    pub fn set_arpeggiator(&mut self, key: TrackKey, arp: Option<Arpeggiator>) -> ControllerResult<()> {
        self.require_track(key)?;
        self.send(EngineCommand::SetArpeggiator {
            track: key,
            arp: arp.map(Box::new),
        })
    }

    // --- Live play and instruments ---

    fn require_track(&self, key: TrackKey) -> ControllerResult<()> {
        if self.session.contains(key) {
            Ok(())
        } else {
            Err(ModelError::UnknownTrack.into())
        }
    }

    pub fn play_note(&mut self, track: TrackKey, pitch: u8, velocity: f32) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::PlayNote {
            track,
            pitch,
            velocity: Velocity::from_unit(velocity),
        })
    }

    pub fn stop_note(&mut self, track: TrackKey, pitch: u8) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::StopNote { track, pitch })
    }

    pub fn set_filter_cutoff(&mut self, track: TrackKey, hz: f32) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::SetFilterCutoff { track, hz })
    }

    pub fn set_filter_q(&mut self, track: TrackKey, q: f32) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::SetFilterQ { track, q })
    }

    pub fn set_oscillator_type(&mut self, track: TrackKey, waveform: Waveform) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::SetOscillator { track, waveform })
    }

    pub fn set_envelope(&mut self, track: TrackKey, params: EnvelopeParams) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::SetEnvelope { track, params })
    }

    pub fn set_track_eq(&mut self, track: TrackKey, eq: EqSettings) -> ControllerResult<()> {
        self.require_track(track)?;
        self.send(EngineCommand::SetTrackEq { track, eq })
    }

    /// Decode WAV bytes and register them under the name sample zones use.
    pub fn load_sample(&mut self, name: &str, bytes: &[u8]) -> ControllerResult<()> {
        let sample_rate = self.sample_rate();
        let buffer = sm_formats::decode_wav(bytes, sample_rate)?;
        log::info!("sample '{name}': {} frames", buffer.frames());
        self.samples.retain(|s| s.name != name);
        self.samples.push(SampleSource {
            name: name.to_owned(),
            buffer: buffer.clone(),
            sample_rate,
        });
        self.forward(EngineCommand::LoadSample {
            name: name.to_owned(),
            buffer: Box::new(buffer),
            sample_rate,
        })
    }

    pub fn meters(&self) -> ControllerResult<Meters> {
        self.request(EngineCommand::ReadMeters)
    }

    // --- Mixer ---

    pub fn set_crossfade(&mut self, position: f32, curve: CrossfadeCurve, reverse: bool) -> ControllerResult<()> {
        self.mix.crossfade = Some((position, curve, reverse));
        self.forward(EngineCommand::SetCrossfade { position, curve, reverse })
    }

    /// Master volume on a 0 to 100 scale.
    pub fn set_master_volume(&mut self, volume: f32) -> ControllerResult<()> {
        let linear = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 100.0) / 100.0 };
        self.mix.master_volume = linear;
        self.forward(EngineCommand::SetMasterVolume(linear))
    }

    pub fn master_volume(&self) -> f32 {
        self.mix.master_volume * 100.0
    }

    /// Set a compressor parameter; see [`compressor_params`].
    pub fn set_compressor(&mut self, param: u16, value: f32) -> ControllerResult<()> {
        self.mix.compressor.retain(|(p, _)| *p != param);
        self.mix.compressor.push((param, value));
        self.forward(EngineCommand::SetCompressor { param, value })
    }

    pub fn set_limiter(&mut self, enabled: bool) -> ControllerResult<()> {
        self.mix.limiter = enabled;
        self.forward(EngineCommand::SetLimiter(enabled))
    }

    pub fn set_soft_clip(&mut self, enabled: bool) -> ControllerResult<()> {
        self.mix.soft_clip = enabled;
        self.forward(EngineCommand::SetSoftClip(enabled))
    }

    pub fn set_reverb_mix(&mut self, mix: f32) -> ControllerResult<()> {
        self.mix.reverb_mix = Some(mix);
        self.forward(EngineCommand::SetReverbMix(mix))
    }

    // --- Decks ---

    /// Decode a track and load it onto `deck`. Returns its duration in seconds.
    pub fn load_deck(&mut self, deck: DeckId, bytes: &[u8], name: &str) -> ControllerResult<f64> {
        let audio = self.audio.as_ref().ok_or(ControllerError::Offline)?;
        let duration = decode_and_load(&audio.commands, audio.sample_rate, deck, bytes, name)?;
        Ok(duration)
    }

    /// Decode on a worker thread; the deck is loaded when decoding finishes.
    pub fn load_deck_async(
        &mut self,
        deck: DeckId,
        bytes: Vec<u8>,
        name: &str,
    ) -> ControllerResult<JoinHandle<ControllerResult<f64>>> {
        let audio = self.audio.as_ref().ok_or(ControllerError::Offline)?;
        let commands = audio.commands.clone();
        let sample_rate = audio.sample_rate;
        let name = name.to_owned();
        let handle = std::thread::Builder::new()
            .name("smuve-decode".into())
            .spawn(move || decode_and_load(&commands, sample_rate, deck, &bytes, &name))?;
        Ok(handle)
    }

    /// Load separated stems onto `deck`. Returns the longest stem's duration.
    pub fn load_deck_stems(&mut self, deck: DeckId, stems: &[(Stem, &[u8])], name: &str) -> ControllerResult<f64> {
        let sample_rate = self.audio.as_ref().ok_or(ControllerError::Offline)?.sample_rate;
        let mut decoded = Vec::with_capacity(stems.len());
        for (stem, bytes) in stems {
            decoded.push((*stem, sm_formats::decode_wav(bytes, sample_rate)?));
        }
        let frames = decoded.iter().map(|(_, b)| b.frames()).max().unwrap_or(0);
        self.send(EngineCommand::LoadStems {
            deck,
            stems: decoded,
            name: name.to_owned(),
        })?;
        Ok(frames as f64 / sample_rate as f64)
    }

    pub fn unload_deck(&mut self, deck: DeckId) -> ControllerResult<()> {
        self.send(EngineCommand::UnloadDeck(deck))
    }

    pub fn play_deck(&mut self, deck: DeckId) -> ControllerResult<()> {
        self.send(EngineCommand::PlayDeck(deck))
    }

    pub fn pause_deck(&mut self, deck: DeckId) -> ControllerResult<()> {
        self.send(EngineCommand::PauseDeck(deck))
    }

    pub fn toggle_deck(&mut self, deck: DeckId) -> ControllerResult<()> {
        self.send(EngineCommand::ToggleDeck(deck))
    }

    /// Jump to `progress` (0 to 1) through the loaded track.
    pub fn seek_deck(&mut self, deck: DeckId, progress: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SeekDeck { deck, progress })
    }

    pub fn set_deck_rate(&mut self, deck: DeckId, rate: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SetDeckRate { deck, rate })
    }

    pub fn set_deck_eq(&mut self, deck: DeckId, high: f32, mid: f32, low: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SetDeckEq {
            deck,
            eq: EqSettings::new(high, mid, low),
        })
    }

    pub fn set_deck_gain(&mut self, deck: DeckId, gain: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SetDeckGain { deck, gain })
    }

    pub fn set_deck_pan(&mut self, deck: DeckId, pan: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SetDeckPan { deck, pan })
    }

    pub fn set_stem_gain(&mut self, deck: DeckId, stem: Stem, gain: f32) -> ControllerResult<()> {
        self.send(EngineCommand::SetStemGain { deck, stem, gain })
    }

    /// Deck playback state; an idle deck while offline.
    pub fn deck_status(&self, deck: DeckId) -> DeckStatus {
        match self.request(|reply| EngineCommand::QueryDeck { deck, reply }) {
            Ok(status) => status,
            Err(_) => DeckStatus::default(),
        }
    }

    // --- Recording ---

    fn push_take(&mut self, recording: sm_engine::Recording) -> ControllerResult<TakeId> {
        let id = self.takes.next_id();
        let take = assemble_take(id, recording.finish())?;
        self.takes.push(take);
        Ok(id)
    }

    /// Start capturing the master bus. A capture already running becomes a take first.
    pub fn start_recording(&mut self, format: RecordingFormat, channels: &[&str], name: &str) -> ControllerResult<()> {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        let previous = self.request(|reply| EngineCommand::StartRecording {
            name: name.to_owned(),
            format,
            channels: channels.iter().map(|c| (*c).to_owned()).collect(),
            started_at_ms,
            reply,
        })?;
        if let Some(recording) = previous {
            self.push_take(recording)?;
        }
        Ok(())
    }

    /// Finish the capture and add it to the take list.
    pub fn stop_recording(&mut self, mode: StopMode) -> ControllerResult<Option<TakeId>> {
        let recording = self.request(|reply| EngineCommand::StopRecording { mode, reply })?;
        recording.map(|r| self.push_take(r)).transpose()
    }

    /// Newest first.
    pub fn takes(&self) -> &TakeList {
        &self.takes
    }

    pub fn delete_take(&mut self, id: TakeId) -> ControllerResult<Take> {
        Ok(self.takes.delete(id)?)
    }

    pub fn export_take(&self, id: TakeId, target: &Path) -> ControllerResult<PathBuf> {
        let take = self.takes.get(id).ok_or(ModelError::UnknownTake)?;
        export_take(take, target)
    }

    // --- Offline rendering ---

    /// Play the session from the loop start for `seconds` without a device.
    pub fn render_frames(&self, seconds: f64) -> Vec<Frame> {
        let sample_rate = self.config.sample_rate;
        let mut engine = self.setup().build(sample_rate, &self.session);
        engine.play(&self.session);

        let total = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        let mut frames = vec![Frame::silence(); total];
        for chunk in frames.chunks_mut(self.config.tick_frames(sample_rate)) {
            engine.tick(&self.session);
            engine.render_frames(chunk);
        }
        frames
    }

    pub fn render_to_wav(&self, seconds: f64) -> ControllerResult<Vec<u8>> {
        let frames = self.render_frames(seconds);
        Ok(sm_formats::encode_frames(
            &frames,
            self.config.sample_rate,
            self.config.recording_format,
        )?)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn decode_and_load(
    commands: &Sender<EngineCommand>,
    sample_rate: u32,
    deck: DeckId,
    bytes: &[u8],
    name: &str,
) -> ControllerResult<f64> {
    let buffer = sm_formats::decode_wav(bytes, sample_rate)?;
    let duration = buffer.duration_secs(sample_rate);
    log::info!("deck {deck:?}: '{name}' ({duration:.1}s)");
    commands
        .send(EngineCommand::LoadDeck {
            deck,
            buffer: Box::new(buffer),
            name: name.to_owned(),
        })
        .map_err(|_| ControllerError::Disconnected)?;
    Ok(duration)
}

struct ThreadFlags {
    stop_signal: Arc<AtomicBool>,
    current_step: Arc<AtomicI64>,
    finished: Arc<AtomicBool>,
}

fn open_output(kind: OutputKind, sample_rate: u32) -> Result<Box<dyn AudioOutput>, AudioError> {
    match kind {
        OutputKind::Device => {
            let (mut output, consumer) = CpalOutput::new()?;
            output.build_stream(consumer)?;
            Ok(Box::new(output))
        }
        OutputKind::Null { paced } => Ok(Box::new(NullOutput::new(sample_rate, paced))),
    }
}

fn audio_thread(
    setup: EngineSetup,
    kind: OutputKind,
    commands: Receiver<EngineCommand>,
    snapshot: Arc<ArcSwap<Session>>,
    flags: ThreadFlags,
    ready: Sender<Result<u32, AudioError>>,
) {
    let opened = open_output(kind, setup.config.sample_rate).and_then(|mut output| {
        output.start()?;
        Ok(output)
    });
    let mut output = match opened {
        Ok(output) => output,
        Err(e) => {
            flags.finished.store(true, Ordering::Relaxed);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let sample_rate = output.sample_rate();
    let mut engine = setup.build(sample_rate, &snapshot.load());
    let _ = ready.send(Ok(sample_rate));

    let tick_frames = setup.config.tick_frames(sample_rate);
    let mut block = [Frame::silence(); sm_ir::BLOCK_SIZE];
    let mut since_tick = tick_frames;

    while !flags.stop_signal.load(Ordering::Relaxed) {
        let session = snapshot.load();
        for command in commands.try_iter() {
            command.apply(&mut engine, &session, &flags.current_step);
        }
        if since_tick >= tick_frames {
            engine.tick(&session);
            since_tick = 0;
        }
        flags.current_step.store(engine.current_step(), Ordering::Relaxed);

        engine.render_frames(&mut block);
        if let Err(e) = output.write(&block) {
            log::error!("audio output failed: {e}");
            break;
        }
        since_tick += block.len();
    }

    // let the device drain on silence
    engine.stop(StopMode::Hard);
    let silence = [Frame::silence(); sm_ir::BLOCK_SIZE];
    for _ in 0..(sample_rate as usize / 10).div_ceil(sm_ir::BLOCK_SIZE) {
        if output.write(&silence).is_err() {
            break;
        }
    }
    let _ = output.stop();

    flags.current_step.store(-1, Ordering::Relaxed);
    flags.finished.store(true, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 22050,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn starts_offline() {
        let c = Controller::new();
        assert_eq!(c.status(), EngineStatus::Offline);
        assert_eq!(c.current_step(), -1);
        assert_eq!(c.deck_status(DeckId::A), DeckStatus::default());
    }

    #[test]
    fn live_operations_need_the_engine() {
        let mut c = Controller::new();
        let t = c.add_track("lead", "synth-lead");
        assert!(matches!(c.play(), Err(ControllerError::Offline)));
        assert!(matches!(c.play_note(t, 60, 1.0), Err(ControllerError::Offline)));
        assert!(matches!(
            c.start_recording(RecordingFormat::WavPcm16, &["master"], "take"),
            Err(ControllerError::Offline)
        ));
        // mirrored settings are accepted offline
        c.stop(StopMode::Hard).unwrap();
        c.set_master_volume(150.0).unwrap();
        assert_eq!(c.master_volume(), 100.0);
    }

    #[test]
    fn model_edits_validate_handles() {
        let mut c = Controller::new();
        let t = c.add_track("keys", "grand-piano");
        c.add_note(t, 60, 0, 1, 0.8).unwrap();
        assert!(!c.toggle_note(t, 60, 0, 1, 0.8).unwrap());
        assert!(c.toggle_note(t, 62, 2, 1, 0.8).unwrap());
        assert!(c.update_note_velocity(t, 62, 2, 0.3).unwrap());
        assert!(matches!(
            c.set_instrument(t, "theremin"),
            Err(ControllerError::Model(ModelError::UnknownPreset))
        ));
        c.set_track_muted(t, true).unwrap();
        c.remove_track(t).unwrap();
        assert!(matches!(c.clear_track(t), Err(ControllerError::Model(ModelError::UnknownTrack))));
        assert!(matches!(c.play_note(t, 60, 1.0), Err(ControllerError::Model(ModelError::UnknownTrack))));
    }

    #[test]
    fn edits_are_published_as_snapshots() {
        let mut c = Controller::new();
        let t = c.add_track("bass", "synth-lead");
        c.add_note(t, 36, 0, 1, 1.0).unwrap();
        let snap = c.snapshot.load();
        assert_eq!(snap.track(t).map(|t| t.notes().len()), Some(1));
    }

    #[test]
    fn offline_render_is_audible_and_sized() {
        let mut c = Controller::with_config(quick_config());
        let t = c.add_track("lead", "synth-lead");
        c.add_note(t, 69, 0, 4, 1.0).unwrap();
        let frames = c.render_frames(0.5);
        assert_eq!(frames.len(), 11025);
        // nothing before the first step lands
        assert!(frames[..1000].iter().all(Frame::is_silent));
        assert!(frames.iter().any(|f| f.left.abs() > 0.01));
    }

    #[test]
    fn muted_track_renders_silence() {
        let mut c = Controller::with_config(quick_config());
        let t = c.add_track("lead", "synth-lead");
        c.add_note(t, 69, 0, 4, 1.0).unwrap();
        c.set_track_muted(t, true).unwrap();
        assert!(c.render_frames(0.3).iter().all(|f| f.left.abs() < 1e-4));
    }

    #[test]
    fn render_to_wav_uses_configured_format() {
        let c = Controller::with_config(quick_config());
        let wav = c.render_to_wav(0.1).unwrap();
        let decoded = sm_formats::decode_wav(&wav, 22050).unwrap();
        assert_eq!(decoded.frames(), 2205);
    }

    #[test]
    fn pattern_round_trip_through_controller() {
        let mut c = Controller::new();
        let t = c.add_track("lead", "synth-lead");
        c.add_note(t, 64, 3, 2, 0.5).unwrap();
        c.set_tempo(500.0).unwrap();
        let pattern = c.pattern();
        assert_eq!(pattern.tempo_bpm, 300.0);

        let mut other = Controller::new();
        other.load_pattern(&pattern).unwrap();
        assert_eq!(other.transport().tempo_bpm, 300.0);
        assert_eq!(other.session().len(), 1);
    }

    #[test]
    fn unknown_take_is_reported() {
        let mut c = Controller::new();
        assert!(matches!(
            c.delete_take(TakeId(9)),
            Err(ControllerError::Model(ModelError::UnknownTake))
        ));
        assert!(c.takes().is_empty());
    }
}
