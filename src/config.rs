use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the Narrative-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Render pass settings
    pub render: RenderConfig,

    /// External media encoder settings
    pub encoder: EncoderConfig,

    /// Image and speech generator backends
    pub generators: GeneratorsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.encoder.validate()?;
        self.generators.validate()?;
        Ok(())
    }
}

/// Render pass configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Shot duration in seconds when neither an explicit duration nor narration exists
    pub default_duration: f64,

    /// Shots of one scene rendered at the same time (0 = one per CPU)
    pub max_parallel_shots: usize,

    /// Container extension for video artifacts
    pub video_extension: String,

    /// Container extension for audio artifacts
    pub audio_extension: String,

    /// Extension for generated stills
    pub image_extension: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_duration: 1.0,
            max_parallel_shots: 1,
            video_extension: "mp4".to_string(),
            audio_extension: "wav".to_string(),
            image_extension: "png".to_string(),
        }
    }
}

impl RenderConfig {
    /// Effective shot concurrency, never zero
    pub fn shot_parallelism(&self) -> usize {
        match self.max_parallel_shots {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.default_duration.is_finite() || self.default_duration <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "render.default_duration".to_string(),
                value: self.default_duration.to_string()
            }.into());
        }

        for (key, value) in [
            ("render.video_extension", &self.video_extension),
            ("render.audio_extension", &self.audio_extension),
            ("render.image_extension", &self.image_extension),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone()
                }.into());
            }
        }

        Ok(())
    }
}

/// Settings for the ffmpeg-based media encoder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    /// Path or name of the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path or name of the ffprobe executable
    pub ffprobe_path: String,

    /// Video codec for stills, overlays and concatenation
    pub video_codec: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Output pixel format
    pub pixel_format: String,

    /// Audio codec for muxed and concatenated output
    pub audio_codec: String,

    /// Audio bitrate for concatenated output
    pub audio_bitrate: String,

    /// Sample rate of synthesized silent tracks
    pub silence_sample_rate: u32,

    /// Channel layout of synthesized silent tracks
    pub silence_channel_layout: String,

    /// Kill an invocation that runs longer than this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            silence_sample_rate: 44100,
            silence_channel_layout: "stereo".to_string(),
            timeout_secs: None,
        }
    }
}

impl EncoderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() || self.ffprobe_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "encoder.ffmpeg_path".to_string(),
                value: format!("{} / {}", self.ffmpeg_path, self.ffprobe_path)
            }.into());
        }

        if self.crf > 51 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.crf".to_string(),
                value: self.crf.to_string()
            }.into());
        }

        if self.silence_sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.silence_sample_rate".to_string(),
                value: self.silence_sample_rate.to_string()
            }.into());
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "encoder.timeout_secs".to_string(),
                value: "0".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Which backend produces stills and narration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorsConfig {
    pub image: GeneratorBackend,
    pub speech: GeneratorBackend,

    /// Kill a `command` backend that runs longer than this many seconds
    pub timeout_secs: Option<u64>,
}

impl GeneratorsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        self.image.validate("generators.image")?;
        self.speech.validate("generators.speech")?;

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "generators.timeout_secs".to_string(),
                value: "0".to_string()
            }.into());
        }

        Ok(())
    }
}

/// A generator backend selection
///
/// `command` runs an external program once per layer. Its arguments may use
/// `{placeholders}` that are filled in from the layer, e.g. `{prompt}`,
/// `{seed}` or `{output}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum GeneratorBackend {
    /// Built-in stand-in that needs no model
    #[default]
    Placeholder,

    /// External program invoked with a templated argument list
    Command { program: String, args: Vec<String> },
}

impl GeneratorBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Command { .. } => "command",
        }
    }

    fn validate(&self, key: &str) -> Result<()> {
        if let Self::Command { program, .. } = self {
            if program.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("{}.program", key),
                    value: program.clone()
                }.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.encoder.timeout_secs = Some(600);
        original_config.generators.timeout_secs = Some(1800);
        original_config.generators.image = GeneratorBackend::Command {
            program: "sd-cli".to_string(),
            args: vec!["--prompt".to_string(), "{prompt}".to_string()],
        };

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[render]\ndefault_duration = 2.5\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.render.default_duration, 2.5);
        assert_eq!(config.render.video_extension, "mp4");
        assert_eq!(config.encoder.crf, 23);
        assert_eq!(config.generators.speech, GeneratorBackend::Placeholder);
    }

    #[test]
    fn test_invalid_default_duration() {
        let mut config = Config::default();
        config.render.default_duration = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_crf() {
        let mut config = Config::default();
        config.encoder.crf = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_generator_timeout_rejected() {
        let mut config = Config::default();
        config.generators.timeout_secs = Some(0);
        assert!(config.validate().is_err());

        config.generators.timeout_secs = Some(90);
        assert!(config.validate().is_ok());
        assert_eq!(config.generators.timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_command_backend_requires_program() {
        let mut config = Config::default();
        config.generators.speech = GeneratorBackend::Command {
            program: " ".to_string(),
            args: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_means_one_per_cpu() {
        let mut render = RenderConfig::default();
        assert_eq!(render.shot_parallelism(), 1);
        render.max_parallel_shots = 0;
        assert!(render.shot_parallelism() >= 1);
    }
}
