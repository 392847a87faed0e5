//! Configuration for v2v-player
//!
//! Single TOML file with three optional tables:
//!
//! ```toml
//! [player]
//! buffer_delay_ms = 400
//! default_mime_type = "audio/wav"
//! event_capacity = 256
//!
//! [output]
//! device = "USB Audio"
//! volume = 0.8
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every key has a built-in default, so an empty file (or no file at all) is
//! a valid configuration. Command-line flags are applied on top with
//! `apply_overrides`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use v2v_common::config::{load_toml, resolve_config_source, ConfigSource, CONFIG_ENV_VAR};

/// Complete configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub player: PlayerConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Queueing behavior
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Debounce between the first arrival and playback start
    #[serde(default = "default_buffer_delay_ms")]
    pub buffer_delay_ms: u64,

    /// MIME type assumed for inputs that don't carry one
    #[serde(default = "default_mime_type")]
    pub default_mime_type: String,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Audio device settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output device name (default device if unset or not found)
    #[serde(default)]
    pub device: Option<String>,

    /// Master volume, 0.0 to 1.0
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub buffer_delay_ms: Option<u64>,
    pub device: Option<String>,
    pub volume: Option<f32>,
    pub mime_type: Option<String>,
    pub log_level: Option<String>,
}

fn default_buffer_delay_ms() -> u64 {
    400
}

fn default_mime_type() -> String {
    "audio/wav".to_string()
}

fn default_event_capacity() -> usize {
    256
}

fn default_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_delay_ms: default_buffer_delay_ms(),
            default_mime_type: default_mime_type(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: default_volume(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Resolve and load the config file
    ///
    /// Priority: `cli_path`, then `V2V_CONFIG`, then the user and system
    /// config files, then built-in defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let source = resolve_config_source(cli_path, CONFIG_ENV_VAR);
        let config: TomlConfig = load_toml(&source)?;
        config.validate()?;
        Ok((config, source))
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the file values and validate
    /// the result
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(ms) = overrides.buffer_delay_ms {
            self.player.buffer_delay_ms = ms;
        }
        if let Some(device) = overrides.device {
            self.output.device = Some(device);
        }
        if let Some(volume) = overrides.volume {
            self.output.volume = volume;
        }
        if let Some(mime_type) = overrides.mime_type {
            self.player.default_mime_type = mime_type;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.player.event_capacity == 0 {
            return Err(Error::Config(
                "player.event_capacity must be greater than zero".to_string(),
            ));
        }
        if !self.player.default_mime_type.starts_with("audio/") {
            return Err(Error::Config(format!(
                "player.default_mime_type must be an audio/* type, got '{}'",
                self.player.default_mime_type
            )));
        }
        Ok(())
    }
}

impl PlayerConfig {
    pub fn buffer_delay(&self) -> Duration {
        Duration::from_millis(self.buffer_delay_ms)
    }
}

impl OutputConfig {
    /// Volume clamped to 0.0..=1.0; NaN counts as silence
    pub fn effective_volume(&self) -> f32 {
        clamp_volume(self.volume)
    }
}

/// Clamp a volume level into the valid range
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        warn!("Volume is NaN, using 0.0");
        return 0.0;
    }
    let clamped = volume.clamp(0.0, 1.0);
    if clamped != volume {
        warn!("Volume {} out of range, clamped to {}", volume, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.player.buffer_delay(), Duration::from_millis(400));
        assert_eq!(config.player.default_mime_type, "audio/wav");
        assert_eq!(config.player.event_capacity, 256);
        assert!(config.output.device.is_none());
        assert_eq!(config.output.volume, 1.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.player.buffer_delay_ms, 400);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_tables_keep_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [player]
            buffer_delay_ms = 150

            [output]
            device = "USB Audio"
            "#,
        )
        .unwrap();

        assert_eq!(config.player.buffer_delay_ms, 150);
        assert_eq!(config.player.default_mime_type, "audio/wav");
        assert_eq!(config.output.device.as_deref(), Some("USB Audio"));
        assert_eq!(config.output.volume, 1.0);
    }

    #[test]
    fn test_rejects_zero_event_capacity() {
        let result = TomlConfig::from_toml_str("[player]\nevent_capacity = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_non_audio_default_mime() {
        let result = TomlConfig::from_toml_str("[player]\ndefault_mime_type = \"text/plain\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[player\nbuffer_delay_ms = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = TomlConfig::from_toml_str("[output]\nvolume = 0.3\n").unwrap();
        config.apply_overrides(ConfigOverrides {
            buffer_delay_ms: Some(0),
            volume: Some(0.9),
            log_level: Some("debug".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.player.buffer_delay(), Duration::ZERO);
        assert_eq!(config.output.volume, 0.9);
        assert_eq!(config.logging.level, "debug");
        assert!(config.output.device.is_none());
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = TomlConfig::default();
        let result = config.apply_overrides(ConfigOverrides {
            mime_type: Some("text/plain".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config
            .apply_overrides(ConfigOverrides {
                mime_type: Some("audio/ogg".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.player.default_mime_type, "audio/ogg");
    }

    #[test]
    fn test_volume_clamping() {
        assert_eq!(clamp_volume(0.5), 0.5);
        assert_eq!(clamp_volume(1.7), 1.0);
        assert_eq!(clamp_volume(-0.2), 0.0);
        assert_eq!(clamp_volume(f32::NAN), 0.0);

        let output = OutputConfig {
            device: None,
            volume: 2.0,
        };
        assert_eq!(output.effective_volume(), 1.0);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[player]\nbuffer_delay_ms = 50").unwrap();

        let (config, source) = TomlConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.player.buffer_delay_ms, 50);
        assert_eq!(source, ConfigSource::CommandLine(file.path().to_path_buf()));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = TomlConfig::load(Some(Path::new("/nonexistent/v2v/config.toml")));
        assert!(matches!(result, Err(Error::Common(_))));
    }
}
