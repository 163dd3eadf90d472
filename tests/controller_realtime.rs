//! The controller driving a live audio thread on the null output.

use std::thread::sleep;
use std::time::{Duration, Instant};

use sm_master::{
    Controller, ControllerError, DeckId, EngineStatus, OutputKind, RecordingFormat, StopMode,
};

fn running() -> Controller {
    let mut ctrl = Controller::new();
    ctrl.start(OutputKind::Null { paced: true }).unwrap();
    ctrl
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        sleep(Duration::from_millis(5));
    }
    done()
}

fn sine_wav(seconds: f64, sample_rate: u32) -> Vec<u8> {
    let frames = (seconds * sample_rate as f64) as usize;
    let samples: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let s = (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5;
            [s, s]
        })
        .collect();
    sm_formats::encode_wav(&samples, sample_rate, RecordingFormat::WavPcm16).unwrap()
}

#[test]
fn start_and_shutdown() {
    let mut ctrl = running();
    assert_eq!(ctrl.status(), EngineStatus::Running);
    assert_eq!(ctrl.sample_rate(), 44100);

    ctrl.shutdown();
    assert_eq!(ctrl.status(), EngineStatus::Offline);
    assert!(matches!(ctrl.meters(), Err(ControllerError::Offline)));
}

#[test]
fn step_subscribers_follow_the_loop() {
    let mut ctrl = running();
    let lead = ctrl.add_track("lead", "synth-lead");
    ctrl.add_note(lead, 60, 0, 1, 0.8).unwrap();
    ctrl.set_tempo(300.0).unwrap();
    ctrl.set_loop(0, 4).unwrap();

    let (id, steps) = ctrl.subscribe_steps().unwrap();
    ctrl.play().unwrap();

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let event = steps.recv_timeout(Duration::from_secs(2)).expect("step event");
        seen.push(event);
    }
    assert_eq!(seen[0].step, 0);
    assert!(seen.iter().all(|e| e.step < 4));
    assert_eq!(seen[4].step, 0);
    for pair in seen.windows(2) {
        assert!(pair[1].time > pair[0].time);
        assert!((pair[0].duration - 0.05).abs() < 1e-9);
    }
    assert!(wait_for(Duration::from_secs(1), || ctrl.is_playing()));

    ctrl.unsubscribe_steps(id).unwrap();
    ctrl.stop(StopMode::Hard).unwrap();
    assert!(wait_for(Duration::from_secs(1), || ctrl.current_step() == -1));
}

#[test]
fn stop_takes_effect_before_returning() {
    let mut ctrl = running();
    let lead = ctrl.add_track("lead", "synth-lead");
    ctrl.add_note(lead, 60, 0, 1, 0.8).unwrap();
    ctrl.set_tempo(300.0).unwrap();

    let (_id, steps) = ctrl.subscribe_steps().unwrap();
    ctrl.play().unwrap();
    assert!(wait_for(Duration::from_secs(1), || ctrl.is_playing()));
    steps.recv_timeout(Duration::from_secs(2)).expect("step event");

    ctrl.stop(StopMode::Release).unwrap();
    assert_eq!(ctrl.current_step(), -1);
    assert!(!ctrl.is_playing());

    // whatever was published before the stop is already queued
    let _ = steps.try_iter().count();
    sleep(Duration::from_millis(200));
    assert!(steps.try_recv().is_err());
    assert_eq!(ctrl.current_step(), -1);
}

#[test]
fn live_notes_show_up_in_meters() {
    let mut ctrl = running();
    let lead = ctrl.add_track("lead", "synth-lead");
    ctrl.play_note(lead, 64, 0.9).unwrap();
    let meters = ctrl.meters().unwrap();
    assert_eq!(meters.active_voices, 1);
    assert!(!meters.is_recording);

    ctrl.stop_note(lead, 64).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        ctrl.meters().map_or(false, |m| m.active_voices == 0)
    }));
}

#[test]
fn deck_loads_plays_and_seeks() {
    let mut ctrl = running();
    let wav = sine_wav(2.0, 22050);
    let duration = ctrl.load_deck(DeckId::A, &wav, "sine.wav").unwrap();
    assert!((duration - 2.0).abs() < 0.01);

    let status = ctrl.deck_status(DeckId::A);
    assert_eq!(status.track_name.as_deref(), Some("sine.wav"));
    assert!(!status.is_playing);

    ctrl.play_deck(DeckId::A).unwrap();
    assert!(ctrl.deck_status(DeckId::A).is_playing);
    assert!(wait_for(Duration::from_secs(1), || ctrl.deck_status(DeckId::A).progress > 0.0));

    ctrl.seek_deck(DeckId::A, 0.5).unwrap();
    let progress = ctrl.deck_status(DeckId::A).progress;
    assert!((0.5..0.6).contains(&progress), "progress {progress}");

    ctrl.pause_deck(DeckId::A).unwrap();
    assert!(!ctrl.deck_status(DeckId::A).is_playing);
    ctrl.unload_deck(DeckId::A).unwrap();
    assert_eq!(ctrl.deck_status(DeckId::A).track_name, None);
}

#[test]
fn async_deck_load_reports_duration() {
    let mut ctrl = running();
    let handle = ctrl.load_deck_async(DeckId::B, sine_wav(1.0, 44100), "b.wav").unwrap();
    let duration = handle.join().unwrap().unwrap();
    assert!((duration - 1.0).abs() < 0.01);
    assert!(wait_for(Duration::from_secs(1), || {
        ctrl.deck_status(DeckId::B).track_name.is_some()
    }));
}

#[test]
fn session_edits_reach_the_running_engine() {
    let mut ctrl = running();
    let lead = ctrl.add_track("lead", "synth-lead");
    ctrl.set_instrument(lead, "synth-pad").unwrap();
    ctrl.set_master_volume(50.0).unwrap();
    assert!((ctrl.master_volume() - 50.0).abs() < 1e-3);

    // a track added after the last tick still plays live
    let bass = ctrl.add_track("bass", "synth-lead");
    ctrl.play_note(bass, 36, 1.0).unwrap();
    assert_eq!(ctrl.meters().unwrap().active_voices, 1);

    ctrl.remove_track(bass).unwrap();
    assert!(ctrl.play_note(bass, 36, 1.0).is_err());
}
