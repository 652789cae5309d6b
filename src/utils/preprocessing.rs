//! Image preprocessing for segmentation models

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Smallest divisor used when scaling by the brightest channel value
const MIN_SCALE: f32 = 1e-6;

/// Image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Turn an image into a normalized NCHW tensor for the model
    ///
    /// The image is stretched to the model resolution without padding, scaled
    /// by its brightest channel value and normalized per channel.
    ///
    /// # Errors
    /// - Zero-sized target resolution
    /// - Zero normalization deviation
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_height, target_width] = preprocessing_config.target_size;
        if target_height == 0 || target_width == 0 {
            return Err(BgRemovalError::invalid_config(
                "Model input size must be non-zero",
            ));
        }
        if preprocessing_config
            .normalization_std
            .iter()
            .any(|std| *std == 0.0)
        {
            return Err(BgRemovalError::invalid_config(
                "Normalization standard deviation must be non-zero",
            ));
        }

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_width,
            target_height,
            FilterType::Lanczos3,
        );

        Ok(Self::image_to_tensor(&resized, preprocessing_config))
    }

    fn image_to_tensor(image: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let max_value = image.as_raw().iter().copied().max().unwrap_or(0);
        let scale = f32::from(max_value).max(MIN_SCALE);
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Tensor dimensions match the image
        for (x, y, pixel) in image.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] =
                    (f32::from(pixel[channel]) / scale - mean[channel]) / std[channel];
            }
        }

        tensor
    }
}
