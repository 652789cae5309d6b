//! Output rendering
//!
//! Turns PNG bytes or a failure into the single line printed on stdout.

use crate::config::OutputMode;
use crate::error::{BgRemovalError, FailureKind, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Printed on stdout in place of a result when processing fails
pub const FAILURE_SENTINEL: &str = "False";

pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";

pub const SUCCESS_MESSAGE: &str = "Background removed.";
pub const FAILURE_MESSAGE: &str = "Processing failed. Try another image or a smaller one.";

/// Standard base64 with padding and no line breaks
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

#[must_use]
pub fn to_data_url(png_bytes: &[u8]) -> String {
    format!("{DATA_URL_PREFIX}{}", encode_base64(png_bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// One-line JSON envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: ResponseStatus,
    pub msg: String,
    /// PNG data URL, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure class, present on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    pub duration_ms: u64,
}

impl JsonResponse {
    #[must_use]
    pub fn success(png_bytes: &[u8], duration_ms: u64) -> Self {
        Self {
            status: ResponseStatus::Success,
            msg: SUCCESS_MESSAGE.to_string(),
            output: Some(to_data_url(png_bytes)),
            kind: None,
            duration_ms,
        }
    }

    #[must_use]
    pub fn failure(kind: FailureKind, duration_ms: u64) -> Self {
        Self {
            status: ResponseStatus::Error,
            msg: FAILURE_MESSAGE.to_string(),
            output: None,
            kind: Some(kind),
            duration_ms,
        }
    }
}

/// Render a successful result in the requested output mode
///
/// # Errors
/// - JSON serialization failure
pub fn render_success(png_bytes: &[u8], mode: OutputMode, duration_ms: u64) -> Result<String> {
    match mode {
        OutputMode::Base64 => Ok(encode_base64(png_bytes)),
        OutputMode::DataUrl => Ok(to_data_url(png_bytes)),
        OutputMode::Json => serde_json::to_string(&JsonResponse::success(png_bytes, duration_ms))
            .map_err(|e| BgRemovalError::encode(format!("Failed to serialize response: {e}"))),
    }
}

/// Render a failure in the requested output mode
///
/// Text modes print the bare sentinel; JSON mode prints an error envelope.
#[must_use]
pub fn render_failure(kind: FailureKind, mode: OutputMode, duration_ms: u64) -> String {
    match mode {
        OutputMode::Base64 | OutputMode::DataUrl => FAILURE_SENTINEL.to_string(),
        OutputMode::Json => serde_json::to_string(&JsonResponse::failure(kind, duration_ms))
            .unwrap_or_else(|_| FAILURE_SENTINEL.to_string()),
    }
}
