//! Conversion of command-line arguments into library configuration

use crate::cache::ModelCache;
use crate::cli::main_impl::{Cli, CliBackend, CliOutputFormat};
use crate::config::{parse_image_format, BackendType, OutputMode, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::models::{ModelKind, ModelSource, ModelSpec};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated `RemovalConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let model_spec = Self::model_spec(cli)?;

        let accepted_formats = if cli.accept.is_empty() {
            None
        } else {
            Some(
                cli.accept
                    .iter()
                    .map(|name| parse_image_format(name))
                    .collect::<Result<Vec<_>>>()?,
            )
        };

        RemovalConfig::builder()
            .model_spec(model_spec)
            .backend_type(cli.backend.map_or_else(BackendType::default, BackendType::from))
            .execution_provider(cli.execution_provider.parse()?)
            .intra_threads(cli.threads)
            .only_mask(cli.only_mask)
            .output_mode(cli.format.into())
            .max_input_bytes(cli.max_size)
            .accepted_formats(accepted_formats)
            .build()
    }

    /// Resolve `--model` and `--preprocessing`
    pub(crate) fn model_spec(cli: &Cli) -> Result<ModelSpec> {
        let mut spec = cli
            .model
            .as_deref()
            .map_or_else(ModelSpec::default, ModelSpec::parse);

        if let Some(profile) = &cli.preprocessing {
            let kind: ModelKind = profile.parse()?;
            if matches!(spec.source, ModelSource::Named(_)) {
                log::warn!("--preprocessing only applies to model files, ignoring '{kind}'");
            }
            spec.preprocessing_override = Some(kind);
        }
        Ok(spec)
    }

    /// Model cache honoring `--cache-dir`
    pub(crate) fn cache(cli: &Cli) -> Result<ModelCache> {
        match &cli.cache_dir {
            Some(dir) => ModelCache::with_custom_cache_dir(dir),
            None => ModelCache::new(),
        }
    }

    /// Registry model selected by `--model`, if it names one
    pub(crate) fn named_model(cli: &Cli) -> Result<Option<ModelKind>> {
        match cli.model.as_deref() {
            None => Ok(None),
            Some(name) => name.parse().map(Some).map_err(|_| {
                BgRemovalError::invalid_config(format!(
                    "'{name}' is not a registry model. Use --list-models to see known models"
                ))
            }),
        }
    }
}

impl From<CliBackend> for BackendType {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Tract => Self::Tract,
            CliBackend::Onnx => Self::Onnx,
        }
    }
}

impl From<CliOutputFormat> for OutputMode {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Base64 => Self::Base64,
            CliOutputFormat::DataUrl => Self::DataUrl,
            CliOutputFormat::Json => Self::Json,
        }
    }
}
