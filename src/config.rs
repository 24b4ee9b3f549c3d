//! Looper configuration
//!
//! Stored as TOML. Every section and field is optional; missing values fall
//! back to the panel defaults. Hardware revisions differ only in the data here
//! (layer count, knob wiring, relay polarity, source switch).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::AudioConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    pub audio: AudioConfig,
    pub timing: GestureTiming,
    pub gain: GainConfig,
    pub metronome: MetronomeConfig,
    pub knobs: KnobMap,
    pub relays: RelayLevels,
    pub panel: PanelConfig,
}

/// Button timing thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureTiming {
    /// Record and bypass buttons: hold longer than this is a long press.
    pub long_press_ms: u32,
    pub double_click_ms: u32,
    /// Layer-select buttons: hold longer than this grabs the knobs.
    pub gesture_hold_ms: u32,
    /// How long a virtual tap stays pressed.
    pub tap_ms: u32,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            long_press_ms: 400,
            double_click_ms: 400,
            gesture_hold_ms: 200,
            tap_ms: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainConfig {
    pub layer_gain_max: f32,
    pub master_gain_max: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        // 1.4 * 1.43 ~ 2.0 combined ceiling
        Self {
            layer_gain_max: 1.4,
            master_gain_max: 1.43,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub click_ms: f32,
    pub click_hz: f32,
    pub downbeat_level: f32,
    pub beat_level: f32,
    pub initial_bpm: f32,
    pub enabled: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            click_ms: 5.0,
            click_hz: 1000.0,
            downbeat_level: 0.8,
            beat_level: 0.4,
            initial_bpm: 120.0,
            enabled: false,
        }
    }
}

/// One analog input and whether its wiring is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnobBinding {
    pub channel: usize,
    pub inverted: bool,
}

impl KnobBinding {
    pub const fn new(channel: usize) -> Self {
        Self {
            channel,
            inverted: false,
        }
    }
}

/// Role -> ADC channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnobMap {
    pub speed: KnobBinding,
    pub volume: KnobBinding,
    pub pan: KnobBinding,
    pub master: KnobBinding,
    pub tempo: KnobBinding,
}

impl KnobMap {
    pub const CHANNELS: usize = 8;

    /// Largest channel index referenced.
    pub fn max_channel(&self) -> usize {
        [self.speed, self.volume, self.pan, self.master, self.tempo]
            .iter()
            .map(|b| b.channel)
            .max()
            .unwrap_or(0)
    }
}

impl Default for KnobMap {
    fn default() -> Self {
        Self {
            speed: KnobBinding::new(0),
            volume: KnobBinding::new(1),
            pan: KnobBinding::new(2),
            master: KnobBinding::new(3),
            tempo: KnobBinding::new(4),
        }
    }
}

/// Electrical level that energizes each relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayLevels {
    pub source_active_high: bool,
    pub bypass_active_high: bool,
}

impl Default for RelayLevels {
    fn default() -> Self {
        Self {
            source_active_high: true,
            bypass_active_high: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Two-position source switch instead of the channel button.
    pub source_switch: bool,
}

impl LooperConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        log::info!("LooperConfig::load: Loading from {:?}", path);
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: LooperConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if audio.block_size == 0 {
            return Err(ConfigError::Invalid("audio.block_size must be >= 1".into()));
        }
        if !(1..=16).contains(&audio.layer_count) {
            return Err(ConfigError::Invalid(format!(
                "audio.layer_count must be in 1..=16, got {}",
                audio.layer_count
            )));
        }
        if !(audio.max_loop_seconds > 0.0) {
            return Err(ConfigError::Invalid(
                "audio.max_loop_seconds must be > 0".into(),
            ));
        }

        let timing = &self.timing;
        if timing.long_press_ms == 0 || timing.double_click_ms == 0 || timing.gesture_hold_ms == 0 {
            return Err(ConfigError::Invalid("timing thresholds must be > 0".into()));
        }

        if !(self.gain.layer_gain_max > 0.0) || !(self.gain.master_gain_max > 0.0) {
            return Err(ConfigError::Invalid("gain ceilings must be > 0".into()));
        }

        let metronome = &self.metronome;
        if !(metronome.click_ms > 0.0) || !(metronome.click_hz > 0.0) {
            return Err(ConfigError::Invalid(
                "metronome.click_ms and click_hz must be > 0".into(),
            ));
        }

        let knobs = &self.knobs;
        if knobs.max_channel() >= KnobMap::CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "knob channels must be < {}",
                KnobMap::CHANNELS
            )));
        }
        // Tempo may share a channel with another role.
        let dedicated = [knobs.speed, knobs.volume, knobs.pan, knobs.master];
        for (i, a) in dedicated.iter().enumerate() {
            if dedicated[i + 1..].iter().any(|b| b.channel == a.channel) {
                return Err(ConfigError::Invalid(format!(
                    "knob channel {} is bound to more than one role",
                    a.channel
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LooperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.layer_count, 5);
        assert_eq!(config.timing.long_press_ms, 400);
        assert_eq!(config.timing.gesture_hold_ms, 200);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = LooperConfig::from_toml_str(
            r#"
            [audio]
            layer_count = 2

            [knobs.speed]
            channel = 5
            inverted = true

            [relays]
            source_active_high = false
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.layer_count, 2);
        assert_eq!(config.audio.block_size, 48);
        assert_eq!(config.knobs.speed, KnobBinding { channel: 5, inverted: true });
        assert_eq!(config.knobs.volume, KnobBinding::new(1));
        assert!(!config.relays.source_active_high);
        assert!(config.relays.bypass_active_high);
    }

    #[test]
    fn test_layer_count_bounds() {
        let err = LooperConfig::from_toml_str("[audio]\nlayer_count = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(LooperConfig::from_toml_str("[audio]\nlayer_count = 17\n").is_err());
        assert!(LooperConfig::from_toml_str("[audio]\nlayer_count = 16\n").is_ok());
    }

    #[test]
    fn test_tempo_may_share_a_channel() {
        let shared = "[knobs.tempo]\nchannel = 0\n";
        assert!(LooperConfig::from_toml_str(shared).is_ok());

        let clash = "[knobs.pan]\nchannel = 1\n";
        assert!(LooperConfig::from_toml_str(clash).is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = LooperConfig::from_toml_str("[audio\nbroken").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = LooperConfig::default();
        config.panel.source_switch = true;
        config.metronome.enabled = true;
        let text = config.to_toml_string().unwrap();
        assert_eq!(LooperConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = LooperConfig::load(Path::new("/nonexistent/layerloop.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
