//! Real-time audio engine for smuve.
//!
//! Renders the mixing graph block by block against a single audio clock,
//! schedules sequencer steps ahead of that clock and captures the master
//! output for recording.

mod arpeggiator;
mod biquad;
mod context;
mod crossfader;
mod deck;
pub mod effects;
mod engine;
mod envelope;
mod frame;
mod graph_state;
mod instrument;
pub mod mixer;
mod oscillator;
mod param;
mod recorder;
mod sample_bank;
pub mod scheduler;
mod voice;
mod voice_pool;

pub use arpeggiator::{ArpMode, ArpNote, Arpeggiator, MAX_ARP_NOTES};
pub use biquad::{BiquadCoeffs, BiquadState, FilterType};
pub use context::{AudioContext, RenderContext};
pub use crossfader::{crossfade_gains, Crossfader};
pub use deck::{Deck, MAX_RATE, MIN_RATE};
pub use effects::{create_effect, db_to_gain, gain_to_db, Effect, EffectInfo, ParamInfo};
pub use engine::{Engine, EngineSettings, StopMode};
pub use envelope::{Adsr, FORCE_RELEASE_TIME};
pub use frame::Frame;
pub use graph_state::GraphState;
pub use instrument::{Instrument, Sampler, SubtractiveSynth, CUTOFF_RANGE, SAMPLE_ENVELOPE};
pub use mixer::{Mixer, MixerSettings, TrackMix, MASTER};
pub use oscillator::Oscillator;
pub use param::{AudioParam, SMOOTHING_TIME_CONSTANT};
pub use recorder::{Capture, Recorder, Recording};
pub use sample_bank::{Sample, SampleBank, SampleKey};
pub use scheduler::{Scheduler, StepSubscribers, SubscriptionId, GATE_FRACTION, LOOK_AHEAD, START_DELAY};
pub use voice::{Voice, VoiceSource, VoiceState};
pub use voice_pool::{VoiceKey, VoicePool, DEFAULT_VOICE_LIMIT};
