//! Inference backend abstraction

use crate::{config::RemovalConfig, error::Result};
use ndarray::Array4;

use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` if the backend was already
    /// initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor not 4-dimensional
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape (NCHW)
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Expected output shape (NCHW)
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Preprocessing configuration for this backend's model
    ///
    /// # Errors
    /// - Model manager not set
    fn get_preprocessing_config(&self) -> Result<crate::models::PreprocessingConfig>;

    /// Model information for this backend
    ///
    /// # Errors
    /// - Model manager not set
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<crate::models::ModelInfo>;

    fn is_initialized(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockMaskPattern};

    #[test]
    fn test_backend_trait_object() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::new());
        assert!(!backend.is_initialized());

        let load_time = backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());

        // Second initialization is a no-op
        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_backend_shapes() {
        let backend = MockBackend::with_pattern(MockMaskPattern::Circle);
        let (n, c, h, w) = backend.input_shape();
        assert_eq!((n, c), (1, 3));
        assert!(h > 0 && w > 0);

        let (n, c, _, _) = backend.output_shape();
        assert_eq!((n, c), (1, 1));

        let preprocessing = backend.get_preprocessing_config().unwrap();
        assert_eq!(preprocessing.target_size, [h as u32, w as u32]);
        assert!(!backend.get_model_info().unwrap().name.is_empty());
    }

    #[test]
    fn test_infer_output_matches_declared_shape() {
        let mut backend = MockBackend::new();
        backend.initialize(&RemovalConfig::default()).unwrap();
        let (n, c, h, w) = backend.input_shape();
        let output = backend.infer(&Array4::zeros((n, c, h, w))).unwrap();
        let (on, oc, oh, ow) = backend.output_shape();
        assert_eq!(output.shape(), &[on, oc, oh, ow]);
    }

    #[test]
    fn test_uninitialized_backend_rejects_inference() {
        let mut backend = MockBackend::new();
        assert!(backend.infer(&Array4::zeros((1, 3, 32, 32))).is_err());
    }
}
