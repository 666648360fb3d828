//! Configuration types for the intake and removal pipeline

use crate::error::{BgtifyError, Result};
use crate::types::MediaType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Message shown when a failure carries no description of its own
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Something went wrong, please try again";

/// Progress phase that marks the removal computation itself
pub const DEFAULT_INFERENCE_PHASE: &str = "compute:inference";

/// Codec used for transcoded files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeFormat {
    /// JPEG, quality controlled by `NormalizerConfig::quality`
    #[default]
    Jpeg,
    /// Lossless PNG
    Png,
}

impl TranscodeFormat {
    #[must_use]
    pub fn media_type(self) -> MediaType {
        match self {
            Self::Jpeg => MediaType::Jpeg,
            Self::Png => MediaType::Png,
        }
    }
}

/// File intake settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Media types the intake boundary accepts
    pub accepted: Vec<MediaType>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        let mut accepted = vec![MediaType::Jpeg, MediaType::Png];
        accepted.extend(NormalizerConfig::default().transcode_from);
        Self { accepted }
    }
}

/// Format normalizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Media types that must be transcoded before removal
    pub transcode_from: Vec<MediaType>,
    /// Also downscale and re-encode types the removal step accepts directly
    pub always_transcode: bool,
    /// Upper bound for the transcoded width
    pub max_width: u32,
    /// Upper bound for the transcoded height
    pub max_height: u32,
    /// Output codec for transcoded files
    pub output: TranscodeFormat,
    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            transcode_from: vec![
                MediaType::WebP,
                MediaType::Bmp,
                MediaType::Tiff,
                MediaType::Gif,
            ],
            always_transcode: false,
            max_width: 1000,
            max_height: 1000,
            output: TranscodeFormat::Jpeg,
            quality: 80,
        }
    }
}

/// Removal adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Progress phase mapped to started/succeeded notifications
    pub inference_phase: String,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            inference_phase: DEFAULT_INFERENCE_PHASE.to_string(),
        }
    }
}

/// User notification wording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Shown when a failure has no description
    pub fallback_message: String,
    /// Shown when the computation starts; `{current}` and `{total}` are substituted
    pub started_template: String,
    /// Shown on later computation progress events
    pub succeeded_message: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            started_template: "Processing {current} of {total}".to_string(),
            succeeded_message: "Congratulations!".to_string(),
        }
    }
}

impl NotifierConfig {
    /// Render the "processing started" message
    #[must_use]
    pub fn started_message(&self, current: u64, total: u64) -> String {
        self.started_template
            .replace("{current}", &current.to_string())
            .replace("{total}", &total.to_string())
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub intake: IntakeConfig,
    pub normalizer: NormalizerConfig,
    pub removal: RemovalConfig,
    pub notifier: NotifierConfig,
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgtify::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .max_dimensions(800, 600)
    ///     .quality(90)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.normalizer.max_width, 800);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Empty accepted media type set
    /// - An accepted type the remover cannot consume and nothing transcodes
    /// - Zero transcoding bounds or out-of-range quality
    /// - Empty inference phase name
    pub fn validate(&self) -> Result<()> {
        if self.intake.accepted.is_empty() {
            return Err(BgtifyError::invalid_config(
                "At least one accepted media type is required",
            ));
        }

        if !self.normalizer.always_transcode {
            if let Some(unreachable) = self.intake.accepted.iter().find(|media_type| {
                !media_type.is_removal_input()
                    && !self.normalizer.transcode_from.contains(media_type)
            }) {
                return Err(BgtifyError::invalid_config(format!(
                    "Accepted media type {unreachable} is neither a removal input nor transcoded"
                )));
            }
        }

        if self.normalizer.max_width == 0 {
            return Err(BgtifyError::config_value_error(
                "max width",
                self.normalizer.max_width,
                ">= 1",
            ));
        }

        if self.normalizer.max_height == 0 {
            return Err(BgtifyError::config_value_error(
                "max height",
                self.normalizer.max_height,
                ">= 1",
            ));
        }

        if !(1..=100).contains(&self.normalizer.quality) {
            return Err(BgtifyError::config_value_error(
                "JPEG quality",
                self.normalizer.quality,
                "1-100",
            ));
        }

        if self.removal.inference_phase.trim().is_empty() {
            return Err(BgtifyError::invalid_config(
                "Inference phase name cannot be empty",
            ));
        }

        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgtifyError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location (`<config dir>/bgtify/config.json`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bgtify").join("config.json"))
    }

    /// Load the configuration from the default location, falling back to defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading configuration file");
                Self::from_file(path)
            },
            _ => Ok(Self::default()),
        }
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted media types
    #[must_use]
    pub fn accepted(mut self, accepted: Vec<MediaType>) -> Self {
        self.config.intake.accepted = accepted;
        self
    }

    /// Mark an additional media type as needing transcoding (and accept it)
    #[must_use]
    pub fn transcode_from(mut self, media_type: MediaType) -> Self {
        if !self.config.intake.accepted.contains(&media_type) {
            self.config.intake.accepted.push(media_type.clone());
        }
        if !self.config.normalizer.transcode_from.contains(&media_type) {
            self.config.normalizer.transcode_from.push(media_type);
        }
        self
    }

    #[must_use]
    pub fn always_transcode(mut self, enabled: bool) -> Self {
        self.config.normalizer.always_transcode = enabled;
        self
    }

    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.normalizer.max_width = width;
        self.config.normalizer.max_height = height;
        self
    }

    #[must_use]
    pub fn output(mut self, output: TranscodeFormat) -> Self {
        self.config.normalizer.output = output;
        self
    }

    /// Set JPEG quality (clamped to 1-100)
    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.config.normalizer.quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn inference_phase<S: Into<String>>(mut self, phase: S) -> Self {
        self.config.removal.inference_phase = phase.into();
        self
    }

    #[must_use]
    pub fn fallback_message<S: Into<String>>(mut self, message: S) -> Self {
        self.config.notifier.fallback_message = message.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
