//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{PipelineConfig, SegmentationCapabilities},
    models::ModelName,
    services::ImageIOService,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `PipelineConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        PipelineConfig::builder()
            .model(ModelName::from(cli.model))
            .enable_gpu(!cli.no_gpu)
            .resize_max(cli.resize)
            .output_mode(cli.output_format.into())
            .prefix(cli.prefix.clone())
            .jpeg_quality(cli.quality)
            .model_dir(cli.model_dir.clone())
            .capabilities(SegmentationCapabilities::detect())
            .build()
            .context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{pattern}'"))?;
        }

        if let (Some(input), Some(output)) = (&cli.input, &cli.output) {
            if input.is_dir() && output.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    output.display()
                );
            }
        }

        Ok(())
    }

    /// Check INPUT before any model download or processing
    ///
    /// Directories are accepted as-is; files must exist with a supported
    /// extension.
    pub(crate) fn validate_input(input: &Path) -> Result<()> {
        if input.is_dir() {
            return Ok(());
        }
        ImageIOService::validate_image_path(input)?;
        Ok(())
    }
}
