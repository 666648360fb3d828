//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::PipelineConfig;
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`PipelineConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration: `--config` file (or the default
    /// location), then command-line overrides on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::load_default().context("Failed to load default config")?,
        };

        if let Some(dimension) = cli.max_dimension {
            config.normalizer.max_width = dimension;
            config.normalizer.max_height = dimension;
        }
        if let Some(quality) = cli.quality {
            config.normalizer.quality = quality;
        }
        if cli.always_transcode {
            config.normalizer.always_transcode = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(quality) = cli.quality {
            if !(1..=100).contains(&quality) {
                anyhow::bail!("JPEG quality must be between 1 and 100, got {quality}");
            }
        }

        if cli.max_dimension == Some(0) {
            anyhow::bail!("Maximum dimension must be at least 1");
        }

        if cli.model.extension().and_then(|ext| ext.to_str()) != Some("onnx") {
            anyhow::bail!("Model must be an .onnx file: {}", cli.model.display());
        }

        Ok(())
    }
}
