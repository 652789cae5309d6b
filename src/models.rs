//! Model registry and model loading
//!
//! Every supported model is a single ONNX file taking an NCHW RGB tensor and
//! producing a single-channel saliency map as its first output.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Known segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelKind {
    /// General purpose salient object detection
    #[default]
    U2net,
    /// Lightweight U²-Net
    U2netp,
    /// U²-Net fine-tuned for human segmentation
    U2netHumanSeg,
    /// Size-reduced U²-Net
    Silueta,
    /// IS-Net general use
    IsnetGeneralUse,
    /// IS-Net for anime characters
    IsnetAnime,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        Self::U2net,
        Self::U2netp,
        Self::U2netHumanSeg,
        Self::Silueta,
        Self::IsnetGeneralUse,
        Self::IsnetAnime,
    ];

    /// Canonical model name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::IsnetAnime => "isnet-anime",
        }
    }

    /// File name inside the model cache
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{RELEASE_BASE_URL}/{}", self.file_name())
    }

    /// Square input resolution expected by the network
    #[must_use]
    pub fn input_size(self) -> u32 {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => 320,
            Self::IsnetGeneralUse | Self::IsnetAnime => 1024,
        }
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        let (normalization_mean, normalization_std) = match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => {
                (IMAGENET_MEAN, IMAGENET_STD)
            },
            Self::IsnetGeneralUse => ([0.5, 0.5, 0.5], [1.0, 1.0, 1.0]),
            Self::IsnetAnime => (IMAGENET_MEAN, [1.0, 1.0, 1.0]),
        };
        let size = self.input_size();
        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean,
            normalization_std,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2net => "general use salient object segmentation",
            Self::U2netp => "lightweight u2net",
            Self::U2netHumanSeg => "human segmentation",
            Self::Silueta => "size-reduced u2net",
            Self::IsnetGeneralUse => "IS-Net general use (1024px)",
            Self::IsnetAnime => "IS-Net anime characters (1024px)",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().replace('_', "-") == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                BgRemovalError::invalid_config(format!(
                    "Unknown model '{s}'. Known models: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Model source specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Registry model resolved in the cache, downloaded on demand
    Named(ModelKind),
    /// ONNX file on the filesystem
    External(PathBuf),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Named(kind) => format!("cached:{kind}"),
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
        }
    }
}

/// Complete model specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Preprocessing profile for external files (ignored for named models)
    pub preprocessing_override: Option<ModelKind>,
}

impl ModelSpec {
    #[must_use]
    pub fn named(kind: ModelKind) -> Self {
        Self {
            source: ModelSource::Named(kind),
            preprocessing_override: None,
        }
    }

    #[must_use]
    pub fn external<P: Into<PathBuf>>(path: P, preprocessing: Option<ModelKind>) -> Self {
        Self {
            source: ModelSource::External(path.into()),
            preprocessing_override: preprocessing,
        }
    }

    /// Parse a `--model` argument: a registry name, or otherwise a file path
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        match arg.parse::<ModelKind>() {
            Ok(kind) => Self::named(kind),
            Err(_) => Self::external(arg, None),
        }
    }

    /// Model kind whose preprocessing applies to this spec
    #[must_use]
    pub fn preprocessing_kind(&self) -> ModelKind {
        match &self.source {
            ModelSource::Named(kind) => *kind,
            ModelSource::External(_) => self.preprocessing_override.unwrap_or_default(),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::named(ModelKind::default())
    }
}

/// Preprocessing parameters for a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Resolves a model spec to a file and exposes its metadata
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    kind: ModelKind,
    name: String,
}

impl ModelManager {
    /// Resolve a model spec against the given cache
    ///
    /// # Errors
    /// - Named model not present in the cache
    /// - External model path missing or not a file
    pub fn from_spec(spec: &ModelSpec, cache: &ModelCache) -> Result<Self> {
        let kind = spec.preprocessing_kind();
        match &spec.source {
            ModelSource::Named(kind) => {
                if !cache.is_model_cached(*kind) {
                    return Err(BgRemovalError::model(format!(
                        "Model '{kind}' is not cached in {}. Run with --download-only first or allow automatic download",
                        cache.cache_dir().display()
                    )));
                }
                Ok(Self {
                    model_path: cache.model_path(*kind),
                    kind: *kind,
                    name: kind.name().to_string(),
                })
            },
            ModelSource::External(path) => Self::from_file(path, kind),
        }
    }

    /// Use an ONNX file directly with the preprocessing of `kind`
    ///
    /// # Errors
    /// - Path does not exist or is not a regular file
    pub fn from_file<P: AsRef<Path>>(path: P, kind: ModelKind) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BgRemovalError::model(format!(
                "Model file does not exist: {}",
                path.display()
            )));
        }
        let name = path
            .file_stem()
            .map_or_else(|| kind.name().to_string(), |s| s.to_string_lossy().into_owned());
        Ok(Self {
            model_path: path.to_path_buf(),
            kind,
            name,
        })
    }

    /// Read the model bytes
    ///
    /// # Errors
    /// - Model file unreadable or empty
    pub fn load_model(&self) -> Result<Vec<u8>> {
        let data = fs::read(&self.model_path).map_err(|e| {
            BgRemovalError::model(format!(
                "Failed to read model {}: {e}",
                self.model_path.display()
            ))
        })?;
        if data.is_empty() {
            return Err(BgRemovalError::model(format!(
                "Model file is empty: {}",
                self.model_path.display()
            )));
        }
        Ok(data)
    }

    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)
            .map_err(|e| {
                BgRemovalError::model(format!(
                    "Failed to stat model {}: {e}",
                    self.model_path.display()
                ))
            })?
            .len() as usize;
        let size = self.kind.input_size() as usize;
        Ok(ModelInfo {
            name: self.name.clone(),
            size_bytes,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        })
    }

    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.kind.preprocessing()
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }
}
