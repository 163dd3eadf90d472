//! Core data types for the smuve audio engine.
//!
//! This crate defines the declarative model the engine consumes: notes and
//! tracks edited by the sequencer, the read-only instrument catalogue,
//! transport state, deck and crossfader settings, recorded takes and the
//! description of the mixing graph.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
mod deck;
mod error;
mod event;
mod graph;
mod note;
mod preset;
mod session;
mod take;
mod track;
mod transport;

pub use audio_buffer::{AudioBuffer, BLOCK_SIZE, MAX_CHANNELS};
pub use deck::{CrossfadeCurve, DeckId, DeckStatus, EqSettings, Stem, EQ_MAX_DB, EQ_MIN_DB};
pub use error::{ModelError, ModelResult};
pub use event::StepEvent;
pub use graph::{AudioGraph, Connection, EffectKind, Node, NodeId, NodeType};
pub use note::{midi_to_frequency, note_name, Note, Velocity, MAX_PITCH};
pub use preset::{
    EnvelopeParams, InstrumentPreset, PresetCatalogue, PresetKind, SampleZone, SynthParams,
    VelocityLayer, Waveform,
};
pub use session::Session;
pub use take::{RecordingFormat, Take, TakeId, TakeList};
pub use track::{Track, TrackKey};
pub use transport::{TransportState, MAX_TEMPO, MIN_TEMPO};
