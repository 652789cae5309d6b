#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # bgremove-b64
//!
//! Removes the background of an image file and returns the transparent PNG
//! as base64 text.
//!
//! Segmentation runs a pre-trained salient object detection model (U²-Net
//! family or IS-Net, ONNX format) through a pure Rust inference engine
//! (Tract, default) or ONNX Runtime (feature `onnx`). Models are downloaded
//! once into a per-user cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_b64::{remove_bg, RemovalConfig};
//!
//! # async fn example() -> bgremove_b64::Result<()> {
//! let base64_png = remove_bg("photo.jpg", &RemovalConfig::default()).await?;
//! println!("{base64_png}");
//! # Ok(())
//! # }
//! ```
//!
//! Failures come back as [`BgRemovalError`]; [`BgRemovalError::kind`] tells
//! I/O, decoding and transformation failures apart.
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust backend
//! - `onnx`: ONNX Runtime backend with CUDA and `CoreML` support
//! - `cli` (default): command-line front-end, progress bars and stderr logging
//! - `webp-support` (default): WebP input decoding

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use tracing::instrument;

pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{BackendType, ExecutionProvider, OutputMode, RemovalConfig};
pub use download::{ensure_model_available, ModelDownloader};
pub use error::{BgRemovalError, FailureKind, Result};
pub use inference::InferenceBackend;
pub use models::{ModelKind, ModelManager, ModelSource, ModelSpec};
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
pub use services::{encode_base64, render_failure, render_success, FAILURE_SENTINEL};
pub use types::{ProcessingTimings, RemovalResult, SegmentationMask};

/// Remove the background of an image file and render the PNG as text
///
/// The result is rendered per `config.output_mode`: bare base64 by default,
/// or a data URL or JSON envelope. The file is read whole and closed before
/// any processing. The model is downloaded into the default cache on first
/// use.
///
/// # Errors
/// - `Io`: file missing or unreadable
/// - `Decode`: empty, corrupt or unsupported image, or rejected by an input guard
/// - `Transform`: model unavailable, download or inference failure
/// - `Encode`: PNG encoding failure
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn remove_bg<P: AsRef<Path>>(path: P, config: &RemovalConfig) -> Result<String> {
    let start = Instant::now();
    let image = load_input_image(path, config)?;
    let mut processor = BackgroundRemovalProcessor::new(
        config.clone(),
        ModelCache::new().map_err(BgRemovalError::in_model_stage)?,
    )?;
    render_removal(&mut processor, &image, false, start).await
}

/// Read an input file, apply the configured guards and decode it
///
/// # Errors
/// - File missing or unreadable
/// - Input guard rejections
/// - Decoding failures
pub fn load_input_image<P: AsRef<Path>>(path: P, config: &RemovalConfig) -> Result<DynamicImage> {
    let data = processor::read_input(path)?;
    config.check_input(&data)?;
    processor::decode_image(&data)
}

/// Run a decoded image through the processor and encode the result as PNG
///
/// # Errors
/// - Model download or loading failures
/// - Inference failures
/// - PNG encoding failures
pub async fn remove_background_png(
    processor: &mut BackgroundRemovalProcessor,
    image: &DynamicImage,
    show_progress: bool,
) -> Result<Vec<u8>> {
    processor.ensure_model(show_progress).await?;
    let result = processor.process_image(image)?;
    tracing::debug!(
        total_ms = result.timings.total_ms,
        inference_ms = result.timings.inference_ms,
        inference_ratio = result.timings.inference_ratio(),
        "Background removed"
    );
    result.to_png_bytes()
}

/// Remove the background and render the PNG in the processor's output mode
///
/// `start` is the moment the request began; the JSON envelope reports the
/// time elapsed since then.
///
/// # Errors
/// - See [`remove_background_png`]
/// - JSON serialization failure
pub async fn render_removal(
    processor: &mut BackgroundRemovalProcessor,
    image: &DynamicImage,
    show_progress: bool,
    start: Instant,
) -> Result<String> {
    let png = remove_background_png(processor, image, show_progress).await?;
    render_success(&png, processor.config().output_mode, elapsed_ms(start))
}

/// Milliseconds elapsed since `start`, saturating
#[must_use]
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
