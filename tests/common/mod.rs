//! Shared helpers for integration tests
//!
//! A model-free backend and factory let the whole pipeline run without
//! downloads. An external placeholder model file satisfies model resolution.

#![allow(dead_code)]

use bgremove_b64::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelKind, ModelManager, ModelSpec, PreprocessingConfig},
    processor::BackendFactory,
    ModelCache,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use instant::Duration;
use ndarray::Array4;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

pub const MODEL_SIZE: usize = 32;

/// Backend whose saliency map marks the right half of the frame as foreground
#[derive(Debug, Default)]
pub struct SplitBackend {
    initialized: bool,
    fail_inference: bool,
}

impl SplitBackend {
    pub fn failing() -> Self {
        Self {
            initialized: false,
            fail_inference: true,
        }
    }
}

impl InferenceBackend for SplitBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if self.fail_inference {
            return Err(BgRemovalError::inference("simulated inference failure"));
        }
        assert_eq!(input.shape(), &[1, 3, MODEL_SIZE, MODEL_SIZE]);
        Ok(Array4::from_shape_fn((1, 1, MODEL_SIZE, MODEL_SIZE), |(_, _, _, x)| {
            if x < MODEL_SIZE / 2 {
                0.0
            } else {
                1.0
            }
        }))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, MODEL_SIZE, MODEL_SIZE)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, MODEL_SIZE, MODEL_SIZE)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [MODEL_SIZE as u32, MODEL_SIZE as u32],
            ..ModelKind::U2net.preprocessing()
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "split".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out [`SplitBackend`]s
pub struct SplitFactory {
    pub fail_inference: bool,
}

impl BackendFactory for SplitFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        if self.fail_inference {
            Ok(Box::new(SplitBackend::failing()))
        } else {
            Ok(Box::new(SplitBackend::default()))
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Tract]
    }
}

/// Temporary cache with a placeholder external model
pub struct TestEnv {
    pub dir: TempDir,
    pub cache: ModelCache,
    pub model_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("placeholder.onnx");
        std::fs::write(&model_path, b"placeholder").unwrap();
        let cache = ModelCache::with_custom_cache_dir(dir.path()).unwrap();
        Self {
            dir,
            cache,
            model_path,
        }
    }

    pub fn config(&self) -> RemovalConfig {
        RemovalConfig::builder()
            .model_spec(ModelSpec::external(&self.model_path, Some(ModelKind::U2net)))
            .build()
            .unwrap()
    }

    /// Write `bytes` to a file in the temporary directory
    pub fn write_input(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn missing_input(&self) -> PathBuf {
        self.dir.path().join("does-not-exist.png")
    }
}

/// Solid-color RGB image encoded in `format`
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([40, 160, 220])));
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
    buffer
}

/// Insert an EXIF APP1 segment carrying `orientation` right after the JPEG SOI
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut segment = b"Exif\0\0".to_vec();
    segment.extend_from_slice(&tiff);

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((segment.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&segment);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
