//! smuve CLI: offline render, real-time playback and the preset catalogue.
//!
//! Usage:
//!   smuve render pattern.yaml out.wav --seconds 8
//!   smuve play pattern.yaml --seconds 8
//!   smuve presets

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use sm_ir::PresetKind;
use sm_master::{load_config, Controller, EngineConfig, OutputKind, PatternFile, StopMode};

#[derive(Parser)]
#[command(name = "smuve")]
#[command(about = "Step sequencer, decks and mixer on a real-time audio engine", long_about = None)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Sample to load before playing, as NAME=FILE.wav (repeatable)
    #[arg(long = "sample", global = true, value_parser = parse_sample)]
    samples: Vec<(String, PathBuf)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a pattern file to WAV without an audio device
    Render {
        /// Pattern file (YAML)
        pattern: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,
    },

    /// Play a pattern file on the default output device
    Play {
        /// Pattern file (YAML)
        pattern: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,

        /// Discard audio instead of opening a device
        #[arg(long)]
        null: bool,
    },

    /// List the instrument catalogue
    Presets,
}

fn parse_sample(arg: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=FILE, got '{arg}'"))?;
    Ok((name.to_owned(), PathBuf::from(path)))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path),
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Render {
            pattern,
            output,
            seconds,
        } => {
            let ctrl = prepare(config, &pattern, &cli.samples);
            render(&ctrl, &output, seconds);
        }
        Commands::Play {
            pattern,
            seconds,
            null,
        } => {
            let mut ctrl = Controller::with_config(config);
            let output = if null {
                OutputKind::Null { paced: true }
            } else {
                OutputKind::Device
            };
            ctrl.start(output)
                .unwrap_or_else(|e| fail(format!("Failed to open audio: {e}")));
            load_into(&mut ctrl, &pattern, &cli.samples);
            play(&mut ctrl, seconds);
        }
        Commands::Presets => list_presets(),
    }
}

fn prepare(config: EngineConfig, pattern: &Path, samples: &[(String, PathBuf)]) -> Controller {
    let mut ctrl = Controller::with_config(config);
    load_into(&mut ctrl, pattern, samples);
    ctrl
}

fn load_into(ctrl: &mut Controller, pattern: &Path, samples: &[(String, PathBuf)]) {
    let file = PatternFile::load(pattern)
        .unwrap_or_else(|e| fail(format!("Failed to read {}: {e}", pattern.display())));
    ctrl.load_pattern(&file)
        .unwrap_or_else(|e| fail(format!("Failed to load pattern: {e}")));

    for (name, path) in samples {
        let bytes = std::fs::read(path)
            .unwrap_or_else(|e| fail(format!("Failed to read {}: {e}", path.display())));
        ctrl.load_sample(name, &bytes)
            .unwrap_or_else(|e| fail(format!("Failed to load sample '{name}': {e}")));
    }

    let transport = ctrl.transport();
    println!("Tracks: {}", ctrl.session().len());
    println!(
        "Tempo:  {} BPM, {} steps per beat, loop {}..{}",
        transport.tempo_bpm, transport.steps_per_beat, transport.loop_start, transport.loop_end
    );
}

fn render(ctrl: &Controller, path: &Path, seconds: f64) {
    println!(
        "Rendering {seconds:.1}s to {} at {} Hz...",
        path.display(),
        ctrl.config().sample_rate
    );
    let wav = ctrl
        .render_to_wav(seconds)
        .unwrap_or_else(|e| fail(format!("Render failed: {e}")));
    std::fs::write(path, &wav).unwrap_or_else(|e| fail(format!("Failed to write {}: {e}", path.display())));
    println!("Wrote {} bytes", wav.len());
}

fn play(ctrl: &mut Controller, seconds: f64) {
    ctrl.play().unwrap_or_else(|e| fail(format!("Failed to start playback: {e}")));
    println!("Playing...");

    let steps = ctrl.transport().loop_end.max(1);
    let deadline = std::time::Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while std::time::Instant::now() < deadline {
        let step = ctrl.current_step();
        if step >= 0 {
            print!("\rStep: {:02}/{:02}", step, steps);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if let Err(e) = ctrl.stop(StopMode::Release) {
        log::warn!("stop failed: {e}");
    }
    // let the release tails ring out
    std::thread::sleep(Duration::from_millis(300));
    ctrl.shutdown();
    println!("\rDone.          ");
}

fn list_presets() {
    let ctrl = Controller::new();
    for preset in ctrl.presets().iter() {
        let kind = match &preset.kind {
            PresetKind::Synth(params) => format!("synth ({:?})", params.waveform),
            PresetKind::Sample { zones } => format!("sample, {} zone(s)", zones.len()),
        };
        println!("{:<20} {:<22} {kind}", preset.id, preset.name);
    }
}
