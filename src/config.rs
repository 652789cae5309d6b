//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{other}'. Expected auto, cpu, cuda or coreml"
            ))),
        }
    }
}

/// Inference engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "tract") || !cfg!(feature = "onnx") {
            Self::Tract
        } else {
            Self::Onnx
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// How a successful result is rendered as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputMode {
    /// Bare base64 of the PNG bytes
    #[default]
    Base64,
    /// `data:image/png;base64,...`
    DataUrl,
    /// One-line JSON envelope with status, message and timing
    Json,
}

/// Configuration for a background removal request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    pub model_spec: ModelSpec,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Emit the grayscale mask instead of the cutout
    pub only_mask: bool,
    pub output_mode: OutputMode,
    /// Reject inputs larger than this many bytes
    pub max_input_bytes: Option<u64>,
    /// Reject inputs whose detected format is not listed
    #[serde(skip)]
    pub accepted_formats: Option<Vec<ImageFormat>>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            only_mask: false,
            output_mode: OutputMode::default(),
            max_input_bytes: None,
            accepted_formats: None,
        }
    }
}

impl RemovalConfig {
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Zero size limit
    /// - Empty accepted format list
    pub fn validate(&self) -> Result<()> {
        if self.max_input_bytes == Some(0) {
            return Err(BgRemovalError::invalid_config(
                "Maximum input size must be greater than 0 bytes",
            ));
        }
        if let Some(formats) = &self.accepted_formats {
            if formats.is_empty() {
                return Err(BgRemovalError::invalid_config(
                    "Accepted format list must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Apply the size and format guards to raw input bytes
    ///
    /// # Errors
    /// - Input larger than `max_input_bytes`
    /// - Input format undetectable or not in `accepted_formats`
    pub fn check_input(&self, data: &[u8]) -> Result<()> {
        if let Some(limit) = self.max_input_bytes {
            if data.len() as u64 > limit {
                return Err(BgRemovalError::input_rejected(format!(
                    "input is {} bytes, limit is {limit} bytes",
                    data.len()
                )));
            }
        }
        if let Some(accepted) = &self.accepted_formats {
            let format = image::guess_format(data).map_err(|_| {
                BgRemovalError::input_rejected("input format could not be determined")
            })?;
            if !accepted.contains(&format) {
                return Err(BgRemovalError::input_rejected(format!(
                    "{format:?} input is not accepted"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn only_mask(mut self, only_mask: bool) -> Self {
        self.config.only_mask = only_mask;
        self
    }

    #[must_use]
    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    #[must_use]
    pub fn max_input_bytes(mut self, limit: Option<u64>) -> Self {
        self.config.max_input_bytes = limit;
        self
    }

    #[must_use]
    pub fn accepted_formats(mut self, formats: Option<Vec<ImageFormat>>) -> Self {
        self.config.accepted_formats = formats;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - See [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse a format name as accepted on the command line
///
/// # Errors
/// - Unknown format name
pub fn parse_image_format(name: &str) -> Result<ImageFormat> {
    let normalized = name.trim().to_ascii_lowercase();
    let normalized = if normalized == "jpg" { "jpeg".to_string() } else { normalized };
    ImageFormat::from_extension(&normalized).ok_or_else(|| {
        BgRemovalError::invalid_config(format!("Unknown image format '{name}'"))
    })
}
