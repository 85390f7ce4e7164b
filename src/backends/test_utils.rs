//! Mock backend for exercising the model-guided path without real weights
//!
//! The mock decoder answers prompts geometrically: with a box it marks the
//! box interior, otherwise a disc around each foreground point. It returns
//! three low-resolution mask planes with the correct one in the middle and
//! the highest score, the way multi-mask decoders do.

use crate::{
    config::SegmenterConfig,
    error::{RecolorError, Result},
    inference::{
        BackendFactory, DecoderOutput, DecoderPrompt, ImageEmbedding, PromptSegmentationBackend,
    },
    models::{ModelInfo, ModelManager},
};
use instant::Duration;
use ndarray::{Array2, Array4, ArrayD, Axis, IxDyn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Side of the mock decoder's output planes
pub const MOCK_MASK_SIDE: usize = 64;

/// Call counters shared between a mock backend and the test holding it
#[derive(Debug, Default)]
pub struct MockCalls {
    pub initialize: AtomicUsize,
    pub embed: AtomicUsize,
    pub predict: AtomicUsize,
}

impl MockCalls {
    pub fn initialize(&self) -> usize {
        self.initialize.load(Ordering::SeqCst)
    }

    pub fn embed(&self) -> usize {
        self.embed.load(Ordering::SeqCst)
    }

    pub fn predict(&self) -> usize {
        self.predict.load(Ordering::SeqCst)
    }
}

/// Mock promptable segmentation backend
#[derive(Debug)]
pub struct MockPromptBackend {
    initialized: bool,
    input_size: usize,
    calls: Arc<MockCalls>,
    should_fail_init: bool,
    should_fail_predict: bool,
}

impl MockPromptBackend {
    #[must_use]
    pub fn new(calls: Arc<MockCalls>) -> Self {
        Self {
            initialized: false,
            input_size: 0,
            calls,
            should_fail_init: false,
            should_fail_predict: false,
        }
    }

    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.should_fail_init = true;
        self
    }

    #[must_use]
    pub fn failing_predict(mut self) -> Self {
        self.should_fail_predict = true;
        self
    }

    /// Logit plane for a prompt, in encoder input space scaled to the mask side
    #[allow(clippy::cast_precision_loss, clippy::indexing_slicing)]
    fn plane(&self, prompt: &DecoderPrompt) -> Array2<f32> {
        let scale = self.input_size as f32 / MOCK_MASK_SIDE as f32;
        let coords = prompt.point_coords.index_axis(Axis(0), 0);
        let labels = prompt.point_labels.index_axis(Axis(0), 0);

        let mut corners = (None, None);
        let mut points = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            let p = (coords[[i, 0]], coords[[i, 1]]);
            match label as i32 {
                1 => points.push(p),
                2 => corners.0 = Some(p),
                3 => corners.1 = Some(p),
                _ => {},
            }
        }
        let radius = self.input_size as f32 * 0.1;

        Array2::from_shape_fn((MOCK_MASK_SIDE, MOCK_MASK_SIDE), |(py, px)| {
            let x = (px as f32 + 0.5) * scale;
            let y = (py as f32 + 0.5) * scale;
            let inside = match corners {
                (Some(a), Some(b)) => x >= a.0 && x <= b.0 + 1.0 && y >= a.1 && y <= b.1 + 1.0,
                _ => points
                    .iter()
                    .any(|p| (x - p.0).powi(2) + (y - p.1).powi(2) <= radius * radius),
            };
            if inside {
                10.0
            } else {
                -10.0
            }
        })
    }
}

impl PromptSegmentationBackend for MockPromptBackend {
    fn initialize(
        &mut self,
        models: &ModelManager,
        _config: &SegmenterConfig,
    ) -> Result<Option<Duration>> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_init {
            return Err(RecolorError::model("Mock initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.input_size = models.manifest().input_size as usize;
        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn embed(&self, image: &Array4<f32>) -> Result<ImageEmbedding> {
        self.calls.embed.fetch_add(1, Ordering::SeqCst);
        if !self.initialized {
            return Err(RecolorError::inference("Mock backend not initialized"));
        }
        let expected = [1, 3, self.input_size, self.input_size];
        if image.shape() != expected {
            return Err(RecolorError::inference(format!(
                "Mock encoder expected {expected:?}, got {:?}",
                image.shape()
            )));
        }
        Ok(ImageEmbedding::new(vec![ArrayD::zeros(IxDyn(&[1, 4, 2, 2]))]))
    }

    fn predict(&self, embedding: &ImageEmbedding, prompt: &DecoderPrompt) -> Result<DecoderOutput> {
        self.calls.predict.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_predict {
            return Err(RecolorError::inference("Mock decoder failure"));
        }
        if embedding.is_empty() {
            return Err(RecolorError::inference("Empty embedding"));
        }

        let good = self.plane(prompt);
        let mut masks = Array4::<f32>::from_elem((1, 3, MOCK_MASK_SIDE, MOCK_MASK_SIDE), -10.0);
        masks.index_axis_mut(Axis(1), 1).assign(&good);
        let scores = ndarray::arr2(&[[0.2f32, 0.95, 0.4]]).into_dyn();

        Ok(DecoderOutput {
            masks: masks.into_dyn(),
            scores: Some(scores),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock".to_string(),
            encoder_bytes: 0,
            decoder_bytes: 0,
            input_size: u32::try_from(self.input_size).unwrap_or(u32::MAX),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing out mock backends that share one set of counters
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    pub calls: Arc<MockCalls>,
    pub fail_init: bool,
    pub fail_predict: bool,
    pub created: AtomicUsize,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create(&self, _config: &SegmenterConfig) -> Result<Box<dyn PromptSegmentationBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut backend = MockPromptBackend::new(Arc::clone(&self.calls));
        if self.fail_init {
            backend = backend.failing_init();
        }
        if self.fail_predict {
            backend = backend.failing_predict();
        }
        Ok(Box::new(backend))
    }

    fn available_backends(&self) -> Vec<&'static str> {
        vec!["mock"]
    }
}

/// Model directory with placeholder networks and a small input size
pub fn mock_model_dir(input_size: u32) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("encoder.onnx"), b"mock").unwrap();
    std::fs::write(dir.path().join("decoder.onnx"), b"mock").unwrap();
    std::fs::write(
        dir.path().join("model.json"),
        format!(r#"{{"name": "mock", "input_size": {input_size}}}"#),
    )
    .unwrap();
    dir
}
