//! Engine configuration, stored as YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sm_engine::{EngineSettings, MixerSettings};
use sm_ir::RecordingFormat;

use crate::error::ControllerResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate for offline rendering and the null output
    pub sample_rate: u32,
    /// Scheduler look-ahead window in seconds
    pub look_ahead: f64,
    /// Seconds between scheduler ticks
    pub tick_interval: f64,
    pub steps_per_beat: u32,
    pub tempo_bpm: f64,
    /// Voices per instrument before stealing
    pub voice_limit: usize,
    /// Master volume, 0 to 100
    pub master_volume: f32,
    pub reverb_seconds: f32,
    pub reverb_mix: f32,
    pub recording_format: RecordingFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            sample_rate: engine.sample_rate,
            look_ahead: engine.look_ahead,
            tick_interval: 0.025,
            steps_per_beat: engine.steps_per_beat,
            tempo_bpm: engine.tempo_bpm,
            voice_limit: engine.voice_limit,
            master_volume: engine.mixer.master_volume * 100.0,
            reverb_seconds: engine.mixer.reverb_seconds,
            reverb_mix: engine.mixer.reverb_mix,
            recording_format: RecordingFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Engine settings for a device running at `sample_rate`.
    pub fn engine_settings(&self, sample_rate: u32) -> EngineSettings {
        EngineSettings {
            sample_rate,
            look_ahead: self.look_ahead,
            voice_limit: self.voice_limit,
            tempo_bpm: self.tempo_bpm,
            steps_per_beat: self.steps_per_beat,
            mixer: MixerSettings {
                master_volume: (self.master_volume / 100.0).clamp(0.0, 1.0),
                reverb_seconds: self.reverb_seconds,
                reverb_mix: self.reverb_mix,
            },
            ..EngineSettings::default()
        }
    }

    /// Frames between scheduler ticks at `sample_rate`.
    pub fn tick_frames(&self, sample_rate: u32) -> usize {
        ((sample_rate as f64 * self.tick_interval).round() as usize).max(1)
    }
}

/// Load the config at `path`, falling back to defaults if it is missing or invalid.
pub fn load_config(path: &Path) -> EngineConfig {
    if !path.exists() {
        log::info!("no config at {}, using defaults", path.display());
        return EngineConfig::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<EngineConfig>(&contents) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("failed to parse {}: {e}, using defaults", path.display());
                EngineConfig::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read {}: {e}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

pub fn save_config(config: &EngineConfig, path: &Path) -> ControllerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(config)?)?;
    log::info!("saved config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("sm-master-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn defaults_match_engine() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval, 0.025);
        assert_eq!(config.look_ahead, 0.1);
        let settings = config.engine_settings(48000);
        assert_eq!(settings.sample_rate, 48000);
        assert!((settings.mixer.master_volume - 0.8).abs() < 1e-6);
        assert_eq!(config.tick_frames(48000), 1200);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: EngineConfig = serde_yaml::from_str("tempo_bpm: 90.0\nrecording_format: wav-float32\n").unwrap();
        assert_eq!(config.tempo_bpm, 90.0);
        assert_eq!(config.recording_format, RecordingFormat::WavFloat32);
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn save_then_load() {
        let dir = temp_dir("config");
        let path = dir.join("nested").join("engine.yaml");
        let config = EngineConfig {
            voice_limit: 8,
            ..EngineConfig::default()
        };
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path), config);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_or_missing_falls_back() {
        let dir = temp_dir("bad-config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.yaml");
        std::fs::write(&path, "tempo_bpm: [not, a, number]").unwrap();
        assert_eq!(load_config(&path), EngineConfig::default());
        assert_eq!(load_config(&dir.join("missing.yaml")), EngineConfig::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
