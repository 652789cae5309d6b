//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Cutout (RGBA8) or, in mask-only mode, the mask itself (Luma8)
    pub image: DynamicImage,

    /// The segmentation mask used for removal
    pub mask: SegmentationMask,

    /// Original image dimensions (width, height)
    pub original_dimensions: (u32, u32),

    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn new(
        image: DynamicImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            timings,
        }
    }

    /// Encode the result image as PNG
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| BgRemovalError::encode(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer)
    }
}

/// Per-pixel foreground probability, 0-255, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::internal("Failed to create image from mask data")
        })
    }

    /// Resize the mask with Lanczos3 resampling
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<SegmentationMask> {
        if self.dimensions == (new_width, new_height) {
            return Ok(self.clone());
        }
        let resized = image::imageops::resize(
            &self.to_image()?,
            new_width,
            new_height,
            image::imageops::FilterType::Lanczos3,
        );
        Ok(SegmentationMask::from_image(&resized))
    }

    /// Use the mask as the alpha channel of `image`
    ///
    /// Fully transparent pixels are cleared to transparent black.
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn apply_to_image(&self, image: &mut RgbaImage) -> Result<()> {
        if image.dimensions() != self.dimensions {
            return Err(BgRemovalError::internal(format!(
                "Image dimensions {:?} do not match mask dimensions {:?}",
                image.dimensions(),
                self.dimensions
            )));
        }

        for (pixel, &alpha) in image.pixels_mut().zip(&self.data) {
            pixel.0 = if alpha == 0 {
                [0, 0, 0, 0]
            } else {
                [pixel.0[0], pixel.0[1], pixel.0[2], alpha]
            };
        }

        Ok(())
    }

    /// Get mask statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

/// Timing breakdown for one removal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call only)
    pub model_load_ms: u64,

    pub image_decode_ms: u64,

    /// Resize, normalize and tensor conversion
    pub preprocessing_ms: u64,

    pub inference_ms: u64,

    /// Mask generation and alpha application
    pub postprocessing_ms: u64,

    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_apply_mask_sets_alpha_and_clears_background() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let mask = SegmentationMask::new(vec![0, 200], (2, 1));
        mask.apply_to_image(&mut image).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [10, 20, 30, 200]);
    }

    #[test]
    fn test_apply_mask_dimension_mismatch() {
        let mut image = RgbaImage::new(3, 3);
        let mask = SegmentationMask::new(vec![0; 4], (2, 2));
        assert!(mask.apply_to_image(&mut image).is_err());
    }

    #[test]
    fn test_mask_resize() {
        let mask = SegmentationMask::new(vec![255; 16], (4, 4));
        let resized = mask.resize(8, 2).unwrap();
        assert_eq!(resized.dimensions, (8, 2));
        assert_eq!(resized.data.len(), 16);
        assert!(resized.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_mask_statistics() {
        let mask = SegmentationMask::new(vec![0, 50, 128, 255], (2, 2));
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.background_pixels, 2);
        assert!((stats.foreground_ratio - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_png_bytes_have_signature() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4])));
        let mask = SegmentationMask::new(vec![4; 6], (3, 2));
        let result = RemovalResult::new(image, mask, (3, 2), ProcessingTimings::default());

        let png = result.to_png_bytes().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(2, 1).0, [1, 2, 3, 4]);
    }

    #[test]
    fn test_inference_ratio() {
        let timings = ProcessingTimings {
            inference_ms: 25,
            total_ms: 100,
            ..ProcessingTimings::default()
        };
        assert!((timings.inference_ratio() - 0.25).abs() < f64::EPSILON);
        assert_eq!(ProcessingTimings::default().inference_ratio(), 0.0);
    }
}
