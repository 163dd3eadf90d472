//! Commands sent from the controller to the audio thread.
//!
//! Every command is applied between two render blocks, so the engine never
//! sees a change halfway through a block.

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use sm_engine::{Arpeggiator, Engine, Recording, StopMode, SubscriptionId};
use sm_ir::{
    AudioBuffer, CrossfadeCurve, DeckId, DeckStatus, EnvelopeParams, EqSettings, ModelError,
    RecordingFormat, Session, Stem, StepEvent, TrackKey, Velocity, Waveform,
};

/// Meter readings taken on the audio thread.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Meters {
    /// Audio-clock time of the next rendered frame
    pub time: f64,
    pub active_voices: usize,
    pub gain_reduction_db: f32,
    pub is_recording: bool,
}

pub enum EngineCommand {
    // Transport
    Play,
    /// Acknowledged once the transport is stopped and the step reset
    Stop { mode: StopMode, reply: Sender<()> },
    SetTempo(f64),
    SetLoop { start: u32, end: u32 },
    SetStepsPerBeat(u32),
    Subscribe(Sender<(SubscriptionId, Receiver<StepEvent>)>),
    Unsubscribe(SubscriptionId),
    SetArpeggiator { track: TrackKey, arp: Option<Box<Arpeggiator>> },

    // Live play and instruments
    PlayNote { track: TrackKey, pitch: u8, velocity: Velocity },
    StopNote { track: TrackKey, pitch: u8 },
    SetFilterCutoff { track: TrackKey, hz: f32 },
    SetFilterQ { track: TrackKey, q: f32 },
    SetOscillator { track: TrackKey, waveform: Waveform },
    SetEnvelope { track: TrackKey, params: EnvelopeParams },
    SetTrackEq { track: TrackKey, eq: EqSettings },
    /// Decoded audio is boxed to keep the command small
    LoadSample { name: String, buffer: Box<AudioBuffer>, sample_rate: u32 },

    // Mixer
    SetCrossfade { position: f32, curve: CrossfadeCurve, reverse: bool },
    SetMasterVolume(f32),
    SetCompressor { param: u16, value: f32 },
    SetLimiter(bool),
    SetSoftClip(bool),
    SetReverbMix(f32),

    // Decks
    LoadDeck { deck: DeckId, buffer: Box<AudioBuffer>, name: String },
    LoadStems { deck: DeckId, stems: Vec<(Stem, AudioBuffer)>, name: String },
    UnloadDeck(DeckId),
    PlayDeck(DeckId),
    PauseDeck(DeckId),
    ToggleDeck(DeckId),
    SeekDeck { deck: DeckId, progress: f32 },
    SetDeckRate { deck: DeckId, rate: f32 },
    SetDeckEq { deck: DeckId, eq: EqSettings },
    SetDeckGain { deck: DeckId, gain: f32 },
    SetDeckPan { deck: DeckId, pan: f32 },
    SetStemGain { deck: DeckId, stem: Stem, gain: f32 },
    QueryDeck { deck: DeckId, reply: Sender<DeckStatus> },

    // Recording
    StartRecording {
        name: String,
        format: RecordingFormat,
        channels: Vec<String>,
        started_at_ms: u64,
        reply: Sender<Option<Recording>>,
    },
    StopRecording { mode: StopMode, reply: Sender<Option<Recording>> },

    ReadMeters(Sender<Meters>),
}

fn log_missing(what: &str, result: Result<(), ModelError>) {
    if let Err(e) = result {
        log::debug!("{what}: {e}");
    }
}

impl EngineCommand {
    /// Apply to `engine`. `session` is the latest published snapshot and
    /// `current_step` the step the controller reads.
    pub fn apply(self, engine: &mut Engine, session: &Session, current_step: &AtomicI64) {
        use EngineCommand::*;
        match self {
            Play => engine.play(session),
            Stop { mode, reply } => {
                engine.stop(mode);
                current_step.store(engine.current_step(), Ordering::Relaxed);
                let _ = reply.send(());
            }
            SetTempo(bpm) => {
                engine.set_tempo(bpm);
            }
            SetLoop { start, end } => engine.set_loop(start, end),
            SetStepsPerBeat(steps) => engine.set_steps_per_beat(steps),
            Subscribe(reply) => {
                let _ = reply.send(engine.subscribe_steps());
            }
            Unsubscribe(id) => {
                engine.unsubscribe_steps(id);
            }
            SetArpeggiator { track, arp } => engine.set_arpeggiator(track, arp.map(|a| *a)),

            PlayNote { track, pitch, velocity } => {
                // the track may be newer than the last tick
                if engine.play_note(track, pitch, velocity).is_err() {
                    engine.sync_session(session);
                    log_missing("play_note", engine.play_note(track, pitch, velocity));
                }
            }
            StopNote { track, pitch } => log_missing("stop_note", engine.stop_note(track, pitch).map(|_| ())),
            SetFilterCutoff { track, hz } => log_missing("set_filter_cutoff", engine.set_filter_cutoff(track, hz)),
            SetFilterQ { track, q } => log_missing("set_filter_q", engine.set_filter_q(track, q)),
            SetOscillator { track, waveform } => {
                log_missing("set_oscillator_type", engine.set_oscillator_type(track, waveform))
            }
            SetEnvelope { track, params } => log_missing("set_envelope", engine.set_envelope(track, params)),
            SetTrackEq { track, eq } => engine.set_track_eq(track, eq),
            LoadSample { name, buffer, sample_rate } => engine.load_sample(&name, *buffer, sample_rate),

            SetCrossfade { position, curve, reverse } => engine.set_crossfade(position, curve, reverse),
            SetMasterVolume(volume) => engine.set_master_volume(volume),
            SetCompressor { param, value } => engine.set_compressor(param, value),
            SetLimiter(on) => engine.set_limiter(on),
            SetSoftClip(on) => engine.set_soft_clip(on),
            SetReverbMix(mix) => engine.set_reverb_mix(mix),

            LoadDeck { deck, buffer, name } => {
                engine.load_deck(deck, *buffer, &name);
            }
            LoadStems { deck, stems, name } => {
                engine.load_deck_stems(deck, stems, &name);
            }
            UnloadDeck(deck) => engine.unload_deck(deck),
            PlayDeck(deck) => engine.play_deck(deck),
            PauseDeck(deck) => engine.pause_deck(deck),
            ToggleDeck(deck) => engine.toggle_deck(deck),
            SeekDeck { deck, progress } => engine.seek_deck(deck, progress),
            SetDeckRate { deck, rate } => engine.set_deck_rate(deck, rate),
            SetDeckEq { deck, eq } => engine.set_deck_eq(deck, eq),
            SetDeckGain { deck, gain } => engine.set_deck_gain(deck, gain),
            SetDeckPan { deck, pan } => engine.set_deck_pan(deck, pan),
            SetStemGain { deck, stem, gain } => engine.set_stem_gain(deck, stem, gain),
            QueryDeck { deck, reply } => {
                let _ = reply.send(engine.deck_status(deck));
            }

            StartRecording {
                name,
                format,
                channels,
                started_at_ms,
                reply,
            } => {
                let _ = reply.send(engine.start_recording(&name, format, channels, started_at_ms));
            }
            StopRecording { mode, reply } => {
                let _ = reply.send(engine.stop_recording(mode));
            }

            ReadMeters(reply) => {
                let meters = Meters {
                    time: engine.current_time(),
                    active_voices: engine.active_voices(),
                    gain_reduction_db: engine.gain_reduction_db(),
                    is_recording: engine.is_recording(),
                };
                let _ = reply.send(meters);
            }
        }
    }
}
