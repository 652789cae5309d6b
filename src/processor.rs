//! Background removal processor
//!
//! Owns the model resolution, the inference backend and the mask
//! post-processing. Decoding, inference and encoding are synchronous; only
//! the on-demand model download is async.

use crate::{
    cache::ModelCache,
    config::{BackendType, RemovalConfig},
    download::ensure_model_available,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::ModelManager,
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::ImagePreprocessor,
};
use image::{metadata::Orientation, DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use instant::Instant;
use log::{debug, info};
use ndarray::{Array4, ArrayView2};
use std::io::Cursor;
use std::path::Path;
use tracing::{instrument, span, Level};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the engines enabled at compile time
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => {
                let _ = model_manager;
                Err(BgRemovalError::invalid_config(format!(
                    "The {other} backend is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        backends
    }
}

/// Decode raw image bytes, applying the EXIF orientation
///
/// # Errors
/// - Empty input
/// - Unknown, unsupported or corrupt image data
pub fn decode_image(image_bytes: &[u8]) -> Result<DynamicImage> {
    if image_bytes.is_empty() {
        return Err(BgRemovalError::decode("input is empty"));
    }

    let mut decoder = ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|e| BgRemovalError::decode(format!("Failed to detect image format: {e}")))?
        .into_decoder()?;
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        debug!("Ignoring unreadable EXIF orientation: {e}");
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder)?;
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {orientation:?}");
        image.apply_orientation(orientation);
    }
    Ok(image)
}

/// Read a whole input file into memory
///
/// # Errors
/// - File missing or unreadable
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| BgRemovalError::file_io_error("read input", path, &e))
}

/// Background removal processor
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    cache: ModelCache,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    pending_model_load_ms: u64,
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig, cache: ModelCache) -> Result<Self> {
        Self::with_factory(config, cache, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        cache: ModelCache,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache,
            backend_factory,
            backend: None,
            pending_model_load_ms: 0,
        })
    }

    /// Download the configured model if it is not cached yet
    ///
    /// # Errors
    /// - See [`ensure_model_available`]
    pub async fn ensure_model(&self, show_progress: bool) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }
        ensure_model_available(&self.config.model_spec, &self.cache, show_progress)
            .await
            .map_err(BgRemovalError::in_model_stage)
    }

    /// Resolve the model and initialize the backend
    ///
    /// # Errors
    /// - Model not available
    /// - Backend creation or model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }

        info!(
            "Initializing processor: model {}, backend {}",
            self.config.model_spec.source.display_name(),
            self.config.backend_type
        );

        let model_manager = ModelManager::from_spec(&self.config.model_spec, &self.cache)
            .map_err(BgRemovalError::in_model_stage)?;
        let mut backend = self
            .backend_factory
            .create_backend(self.config.backend_type, model_manager)?;

        if let Some(load_time) = backend.initialize(&self.config)? {
            self.pending_model_load_ms = duration_ms(load_time);
        }
        self.backend = Some(backend);
        Ok(())
    }

    /// Read, guard, decode and process an image file
    ///
    /// # Errors
    /// - File I/O errors
    /// - Input guard rejections
    /// - Decoding, inference or post-processing failures
    pub fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let data = read_input(input_path)?;
        self.process_bytes(&data)
    }

    /// Guard, decode and process raw image bytes
    ///
    /// # Errors
    /// - Input guard rejections
    /// - Decoding, inference or post-processing failures
    pub fn process_bytes(&mut self, image_bytes: &[u8]) -> Result<RemovalResult> {
        self.config.check_input(image_bytes)?;

        let decode_start = Instant::now();
        let image = decode_image(image_bytes)?;
        let decode_ms = duration_ms(decode_start.elapsed());

        let mut result = self.process_image(&image)?;
        result.timings.image_decode_ms = decode_ms;
        result.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Remove the background of a decoded image
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Inference errors or unexpected output shapes
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            model = %self.config.model_spec.source.display_name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.initialize()?;

        let total_start = Instant::now();
        let mut timings = ProcessingTimings {
            model_load_ms: std::mem::take(&mut self.pending_model_load_ms),
            ..ProcessingTimings::default()
        };
        let original_dimensions = image.dimensions();

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let preprocessing_config = backend.get_preprocessing_config()?;
            let tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
            timings.preprocessing_ms = duration_ms(start.elapsed());
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference").entered();
            let start = Instant::now();
            let output = backend.infer(&input_tensor)?;
            timings.inference_ms = duration_ms(start.elapsed());
            output
        };

        let (mask, result_image) = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();
            let mask = Self::tensor_to_mask(&output_tensor, original_dimensions)?;
            let result_image = if self.config.only_mask {
                DynamicImage::ImageLuma8(mask.to_image()?)
            } else {
                let mut cutout = image.to_rgba8();
                mask.apply_to_image(&mut cutout)?;
                DynamicImage::ImageRgba8(cutout)
            };
            timings.postprocessing_ms = duration_ms(start.elapsed());
            (mask, result_image)
        };

        timings.total_ms = timings.model_load_ms + duration_ms(total_start.elapsed());
        debug!(
            "Processed {}x{} image in {}ms (inference {}ms, foreground {:.1}%)",
            original_dimensions.0,
            original_dimensions.1,
            timings.total_ms,
            timings.inference_ms,
            mask.statistics().foreground_ratio * 100.0
        );

        Ok(RemovalResult::new(
            result_image,
            mask,
            original_dimensions,
            timings,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendType> {
        self.backend_factory.available_backends()
    }

    /// Turn the model's saliency map into a mask at the original resolution
    ///
    /// The prediction plane is min-max normalized; a constant plane yields an
    /// empty mask.
    ///
    /// # Errors
    /// - Output shape is not `(1, 1, H, W)`
    /// - Output contains non-finite values
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (n, c, height, width) = tensor.dim();
        if n != 1 || c != 1 || height == 0 || width == 0 {
            return Err(BgRemovalError::inference(format!(
                "Expected output tensor of shape (1, 1, H, W), got {:?}",
                tensor.shape()
            )));
        }

        let plane: ArrayView2<f32> = tensor.slice(ndarray::s![0, 0, .., ..]);
        if plane.iter().any(|v| !v.is_finite()) {
            return Err(BgRemovalError::inference(
                "Model output contains non-finite values",
            ));
        }

        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let data: Vec<u8> = if range > f32::EPSILON {
            plane
                .iter()
                .map(|&v| (((v - min) / range) * 255.0).clamp(0.0, 255.0) as u8)
                .collect()
        } else {
            vec![0; plane.len()]
        };

        #[allow(clippy::cast_possible_truncation)]
        let mask = SegmentationMask::new(data, (width as u32, height as u32));
        mask.resize(original_dimensions.0, original_dimensions.1)
    }
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("initialized", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: instant::Duration) -> u64 {
    duration.as_millis() as u64
}
