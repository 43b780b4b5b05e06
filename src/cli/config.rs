//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{PipelineConfig, TargetSize};
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration
    ///
    /// Starts from `--config` when given, otherwise from defaults; global
    /// flags and the per-command output directory override file values.
    pub(crate) fn from_cli(cli: &Cli, output_dir: Option<&Path>) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(concurrency) = cli.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(endpoint) = &cli.matting_endpoint {
            config.matting_endpoint.clone_from(endpoint);
        }
        if let Some(dir) = output_dir {
            config.output_dir = dir.to_path_buf();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Combine optional width and height flags into a target size
    pub(crate) fn target_size(
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Option<TargetSize>> {
        TargetSize::from_parts(width, height).context("Invalid target size")
    }
}
