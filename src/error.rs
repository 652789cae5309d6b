//! Error types for background removal operations

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Coarse failure classes reported to callers that only need to know which
/// stage went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The input could not be opened or read
    Io,
    /// The input bytes are not an acceptable image
    Decode,
    /// The background remover itself failed (model, inference, download)
    Transform,
    /// The result could not be encoded
    Encode,
    /// The request was misconfigured
    Config,
}

impl FailureKind {
    /// Process exit code used when the CLI runs with `--exit-code`
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Io => 2,
            Self::Decode => 3,
            Self::Transform => 4,
            Self::Encode => 5,
            Self::Config => 6,
        }
    }

    /// Short lowercase name used in logs and JSON output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Decode => "decode",
            Self::Transform => "transform",
            Self::Encode => "encode",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Reading or writing a file failed
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image decoder errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Input bytes could not be turned into an image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Input refused by a size or format guard
    #[error("Input rejected: {0}")]
    InputRejected(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Output encoding errors
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn input_rejected<S: Into<String>>(msg: S) -> Self {
        Self::InputRejected(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source: std::io::Error::new(error.kind(), format!("failed to {operation}: {error}")),
        }
    }

    /// Create network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {error}", context.into()))
    }

    /// Treat file errors raised while preparing the model as model errors
    ///
    /// The `Io` kind is reserved for the input file.
    #[must_use]
    pub fn in_model_stage(self) -> Self {
        match self {
            Self::Io { .. } => Self::Model(self.to_string()),
            other => other,
        }
    }

    /// Classify the error into the stage that produced it
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io { .. } => FailureKind::Io,
            Self::Image(image::ImageError::Encoding(_)) | Self::Encode(_) => FailureKind::Encode,
            // Decoders only read from memory, so their I/O errors mean truncated data
            Self::Image(_) | Self::Decode(_) | Self::InputRejected(_) => FailureKind::Decode,
            Self::Model(_) | Self::Inference(_) | Self::Network(_) | Self::Internal(_) => {
                FailureKind::Transform
            },
            Self::InvalidConfig(_) => FailureKind::Config,
        }
    }
}
