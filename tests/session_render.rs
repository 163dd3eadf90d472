//! Offline renders of pattern files through the controller.

use sm_master::{Controller, EngineConfig, Frame, PatternFile, RecordingFormat};

const SAMPLE_RATE: u32 = 22050;

const GROOVE: &str = "
tempo_bpm: 120
loop_end: 16
tracks:
  - name: Lead
    instrument: synth-lead
    sends: [0.3, 0.2]
    notes:
      - { pitch: 60, step: 0, length_steps: 2, velocity: 0.9 }
      - { pitch: 64, step: 4 }
      - { pitch: 67, step: 8, length_steps: 4 }
  - name: Pad
    instrument: synth-pad
    gain: 0.5
    notes:
      - { pitch: 48, step: 0, length_steps: 16 }
";

fn controller(yaml: &str) -> Controller {
    let mut ctrl = Controller::with_config(EngineConfig {
        sample_rate: SAMPLE_RATE,
        ..EngineConfig::default()
    });
    ctrl.load_pattern(&PatternFile::from_yaml(yaml).unwrap()).unwrap();
    ctrl
}

fn single_note(loop_end: u32) -> String {
    format!(
        "
loop_end: {loop_end}
tracks:
  - name: Beep
    instrument: synth-lead
    sends: [0.0, 0.0]
    notes:
      - {{ pitch: 69, step: 0 }}
"
    )
}

fn peak(frames: &[Frame]) -> f32 {
    frames.iter().map(|f| f.left.abs().max(f.right.abs())).fold(0.0, f32::max)
}

fn window(frames: &[Frame], from: f64, to: f64) -> &[Frame] {
    let at = |t: f64| ((t * SAMPLE_RATE as f64) as usize).min(frames.len());
    &frames[at(from)..at(to)]
}

#[test]
fn pattern_renders_audibly() {
    let frames = controller(GROOVE).render_frames(2.0);
    assert_eq!(frames.len(), 2 * SAMPLE_RATE as usize);
    assert!(peak(&frames) > 0.05);
    assert!(frames.iter().all(|f| f.left.abs() <= 1.0 && f.right.abs() <= 1.0));
}

#[test]
fn first_step_waits_for_start_delay() {
    let frames = controller(GROOVE).render_frames(0.5);
    assert!(peak(window(&frames, 0.0, 0.04)) < 1e-6);
    assert!(peak(window(&frames, 0.06, 0.2)) > 0.01);
}

#[test]
fn renders_are_deterministic() {
    let a = controller(GROOVE).render_frames(1.5);
    let b = controller(GROOVE).render_frames(1.5);
    assert_eq!(a, b);
}

#[test]
fn empty_pattern_is_silent() {
    let frames = controller("tracks: []").render_frames(0.5);
    assert!(peak(&frames) < 1e-6);
}

#[test]
fn loop_length_repeats_notes() {
    // the third pass of a 4-step loop starts at 1.05 s
    let short = controller(&single_note(4)).render_frames(1.2);
    let long = controller(&single_note(16)).render_frames(1.2);
    let short_peak = peak(window(&short, 1.06, 1.15));
    let long_peak = peak(window(&long, 1.06, 1.15));
    assert!(short_peak > 0.05, "short loop peak {short_peak}");
    assert!(short_peak > long_peak * 10.0, "long loop peak {long_peak}");
}

#[test]
fn wav_export_matches_render_length() {
    let mut ctrl = controller(GROOVE);
    let wav = ctrl.render_to_wav(0.75).unwrap();
    let buffer = sm_formats::decode_wav(&wav, SAMPLE_RATE).unwrap();
    assert_eq!(buffer.frames(), (0.75 * SAMPLE_RATE as f64).round() as usize);

    let config = EngineConfig {
        sample_rate: SAMPLE_RATE,
        recording_format: RecordingFormat::WavFloat32,
        ..EngineConfig::default()
    };
    ctrl = Controller::with_config(config);
    ctrl.load_pattern(&PatternFile::from_yaml(GROOVE).unwrap()).unwrap();
    let float_wav = ctrl.render_to_wav(0.75).unwrap();
    let decoded = sm_formats::decode_wav(&float_wav, SAMPLE_RATE).unwrap();
    let frames = ctrl.render_frames(0.75);
    assert_eq!(decoded.channel(0)[5000], frames[5000].left);
}

#[test]
fn pattern_file_round_trips_through_disk() {
    let dir = std::env::temp_dir().join(format!("smuve-pattern-{}", std::process::id()));
    let path = dir.join("groove.yaml");
    let original = PatternFile::from_yaml(GROOVE).unwrap();
    original.save(&path).unwrap();

    let mut ctrl = Controller::new();
    ctrl.load_pattern(&PatternFile::load(&path).unwrap()).unwrap();
    let loaded = ctrl.pattern();
    assert_eq!(ctrl.session().len(), 2);
    assert_eq!(loaded.loop_end, original.loop_end);
    assert_eq!(loaded.tracks[0].notes, original.tracks[0].notes);
    assert_eq!(loaded.tracks[0].sends, Some((0.3, 0.2)));
    assert_eq!(loaded.tracks[1].gain, Some(0.5));
    std::fs::remove_dir_all(&dir).unwrap();
}
