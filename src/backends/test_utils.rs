//! Mock backends for testing inference without model files

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelKind, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Shape of the saliency map the mock produces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMaskPattern {
    /// Soft-edged disc in the middle of the frame
    Circle,
    /// Every pixel gets the same value
    Uniform(f32),
    /// Left half background, right half foreground
    HalfSplit,
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    size: usize,
    pattern: MockMaskPattern,
    output_shape_override: Option<(usize, usize, usize, usize)>,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_pattern(MockMaskPattern::Circle)
    }

    #[must_use]
    pub fn with_pattern(pattern: MockMaskPattern) -> Self {
        Self {
            initialized: false,
            size: 32,
            pattern,
            output_shape_override: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Produce outputs of the given shape regardless of the input
    #[must_use]
    pub fn with_output_shape(mut self, shape: (usize, usize, usize, usize)) -> Self {
        self.output_shape_override = Some(shape);
        self
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self) -> Array4<f32> {
        let (n, c, h, w) = self.output_shape();
        let center_x = w as f32 / 2.0;
        let center_y = h as f32 / 2.0;
        let radius = (w.min(h) as f32 / 3.0).max(1.0);

        Array4::from_shape_fn((n, c, h, w), |(_, _, y, x)| match self.pattern {
            MockMaskPattern::Circle => {
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                ((radius - distance) / radius).clamp(0.0, 1.0)
            },
            MockMaskPattern::Uniform(value) => value,
            MockMaskPattern::HalfSplit => {
                if x >= w / 2 {
                    1.0
                } else {
                    0.0
                }
            },
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failed"));
        }
        let expected = self.input_shape();
        if input.dim() != expected {
            return Err(BgRemovalError::inference(format!(
                "Mock backend expected input {expected:?}, got {:?}",
                input.dim()
            )));
        }
        Ok(self.generate_mock_output())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.size, self.size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output_shape_override
            .unwrap_or((1, 1, self.size, self.size))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let mut config = ModelKind::U2net.preprocessing();
        config.target_size = [self.size as u32, self.size as u32];
        Ok(config)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-model".to_string(),
            size_bytes: 1024,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_history() {
        let mut backend = MockBackend::new();
        backend.initialize(&RemovalConfig::default()).unwrap();
        let _ = backend.infer(&Array4::zeros((1, 3, 32, 32)));
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_failure_modes() {
        let mut failing_init = MockBackend::new_failing_init();
        assert!(failing_init.initialize(&RemovalConfig::default()).is_err());
        assert!(!failing_init.is_initialized());

        let mut failing_inference = MockBackend::new_failing_inference();
        failing_inference
            .initialize(&RemovalConfig::default())
            .unwrap();
        assert!(failing_inference
            .infer(&Array4::zeros((1, 3, 32, 32)))
            .is_err());
    }

    #[test]
    fn test_half_split_pattern() {
        let mut backend = MockBackend::with_pattern(MockMaskPattern::HalfSplit);
        backend.initialize(&RemovalConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 32, 32))).unwrap();
        assert_eq!(output[[0, 0, 5, 0]], 0.0);
        assert_eq!(output[[0, 0, 5, 31]], 1.0);
    }
}
