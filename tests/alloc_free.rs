//! Allocation-free render path tests.
//!
//! These tests verify that `Engine::render_block()` does not allocate once
//! the graph is built. Scheduling (`tick`) runs outside the checked region,
//! the same way the audio thread drains commands before it renders.
//!
//! Just run `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use sm_engine::{Engine, EngineSettings};
use sm_ir::{AudioBuffer, CrossfadeCurve, DeckId, Session, BLOCK_SIZE};

const SAMPLE_RATE: u32 = 44100;

fn sine(frames: usize, hz: f32) -> AudioBuffer {
    let samples: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let s = (i as f32 * hz * std::f32::consts::TAU / SAMPLE_RATE as f32).sin() * 0.5;
            [s, s]
        })
        .collect();
    AudioBuffer::from_interleaved(&samples, 2)
}

fn busy_session() -> Session {
    let mut session = Session::new();
    let lead = session.add_track("lead", "synth-lead");
    let pad = session.add_track("pad", "synth-pad");
    let piano = session.add_track("piano", "grand-piano");
    for step in 0..16 {
        session.add_note(lead, 60 + (step % 12) as u8, step, 1, 0.9).unwrap();
        session.add_note(piano, 48 + (step % 5) as u8, step, 2, 0.7).unwrap();
    }
    session.add_note(pad, 48, 0, 16, 0.6).unwrap();
    session.add_note(pad, 55, 0, 16, 0.6).unwrap();
    session.track_mut(lead).unwrap().set_sends(0.5, 0.5);
    session
}

/// Render for `duration_frames`, aborting on any heap allocation inside a block.
fn assert_render_alloc_free(engine: &mut Engine, session: &Session, duration_frames: usize) {
    let mut rendered = 0;
    let mut peak = 0.0f32;
    while rendered < duration_frames {
        engine.tick(session);
        peak = peak.max(assert_no_alloc(|| engine.render_block(BLOCK_SIZE).peak()));
        rendered += BLOCK_SIZE;
    }
    assert!(peak > 0.0, "render produced only silence");
}

#[test]
fn sequenced_tracks_alloc_free() {
    let session = busy_session();
    let mut engine = Engine::new(EngineSettings::default());
    engine.load_sample("piano/piano_C4", sine(SAMPLE_RATE as usize, 261.6), SAMPLE_RATE);
    engine.play(&session);
    assert_render_alloc_free(&mut engine, &session, SAMPLE_RATE as usize * 5);
}

#[test]
fn decks_and_crossfade_alloc_free() {
    let session = Session::new();
    let mut engine = Engine::new(EngineSettings::default());
    engine.load_deck(DeckId::A, sine(SAMPLE_RATE as usize * 2, 220.0), "a");
    engine.load_deck(DeckId::B, sine(SAMPLE_RATE as usize * 2, 330.0), "b");
    engine.set_deck_rate(DeckId::B, 1.25);
    engine.play_deck(DeckId::A);
    engine.play_deck(DeckId::B);
    engine.set_crossfade(0.3, CrossfadeCurve::Exponential, false);
    assert_render_alloc_free(&mut engine, &session, SAMPLE_RATE as usize * 3);
}
