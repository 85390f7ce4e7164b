//! Tract backend for promptable segmentation models
//!
//! Pure Rust inference with no native dependencies. The encoder input fact is
//! pinned to `[1, 3, S, S]` from the manifest so the graph can be optimised;
//! the decoder keeps the shapes declared in its ONNX file, which is why the
//! prompt is always padded to the manifest's fixed point count.

use crate::config::SegmenterConfig;
use crate::error::{RecolorError, Result};
use crate::inference::{DecoderOutput, DecoderPrompt, ImageEmbedding, PromptSegmentationBackend};
use crate::models::{ModelInfo, ModelManager};
use ndarray::{Array4, ArrayD, IxDyn};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend holding the encoder and decoder plans
#[derive(Debug, Default)]
pub struct TractBackend {
    encoder: Option<TractModel>,
    decoder: Option<TractModel>,
    model_manager: Option<ModelManager>,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_encoder(models: &ModelManager) -> Result<TractModel> {
        let size = models.manifest().input_size as usize;
        let data = models.load_encoder()?;
        onnx()
            .model_for_read(&mut std::io::Cursor::new(data))
            .map_err(|e| RecolorError::model(format!("Failed to load encoder: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| RecolorError::model(format!("Failed to pin encoder input: {e}")))?
            .into_optimized()
            .map_err(|e| RecolorError::model(format!("Failed to optimize encoder: {e}")))?
            .into_runnable()
            .map_err(|e| RecolorError::model(format!("Failed to create runnable encoder: {e}")))
    }

    fn load_decoder(models: &ModelManager) -> Result<TractModel> {
        let data = models.load_decoder()?;
        onnx()
            .model_for_read(&mut std::io::Cursor::new(data))
            .map_err(|e| RecolorError::model(format!("Failed to load decoder: {e}")))?
            .into_optimized()
            .map_err(|e| RecolorError::model(format!("Failed to optimize decoder: {e}")))?
            .into_runnable()
            .map_err(|e| RecolorError::model(format!("Failed to create runnable decoder: {e}")))
    }

    fn load_models(&mut self, models: &ModelManager) -> Result<Duration> {
        let start = Instant::now();
        let info = models.get_info()?;

        log::info!("🚀 Initializing Tract backend");
        log::info!("🧠 Model: {} (input {}px)", info.name, info.input_size);
        // Model size in MB (precision loss acceptable for display)
        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes() as f64 / (1024.0 * 1024.0);
        log::info!("📏 Weights: {size_mb:.2} MB");

        self.encoder = Some(Self::load_encoder(models)?);
        self.decoder = Some(Self::load_decoder(models)?);
        self.model_manager = Some(models.clone());

        let elapsed = start.elapsed();
        log::info!("✅ Tract backend initialized in {}ms", elapsed.as_millis());
        Ok(elapsed)
    }
}

fn to_tensor(array: &ArrayD<f32>) -> Result<TValue> {
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_shape(array.shape(), &data)
        .map(TValue::from)
        .map_err(|e| RecolorError::inference(format!("Failed to build input tensor: {e}")))
}

fn to_array(value: TValue) -> Result<ArrayD<f32>> {
    let tensor = value.into_tensor();
    let shape = tensor.shape().to_vec();
    let data = tensor
        .as_slice::<f32>()
        .map_err(|e| RecolorError::inference(format!("Output tensor is not f32: {e}")))?
        .to_vec();
    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| RecolorError::inference(format!("Failed to reshape output tensor: {e}")))
}

fn run(model: &TractModel, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
    let tensors = inputs
        .iter()
        .map(to_tensor)
        .collect::<Result<TVec<TValue>>>()?;
    let outputs = model
        .run(tensors)
        .map_err(|e| RecolorError::inference(format!("Tract inference failed: {e}")))?;
    outputs.into_iter().map(to_array).collect()
}

impl PromptSegmentationBackend for TractBackend {
    fn initialize(
        &mut self,
        models: &ModelManager,
        _config: &SegmenterConfig,
    ) -> Result<Option<Duration>> {
        if self.is_initialized() {
            return Ok(None);
        }
        self.load_models(models).map(Some)
    }

    fn embed(&self, image: &Array4<f32>) -> Result<ImageEmbedding> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| RecolorError::inference("Tract encoder not initialized"))?;

        let start = Instant::now();
        let outputs = run(encoder, &[image.clone().into_dyn()])?;
        if outputs.is_empty() {
            return Err(RecolorError::inference("Encoder produced no outputs"));
        }
        log::debug!(
            "Tract encoder: {} output(s) in {}ms",
            outputs.len(),
            start.elapsed().as_millis()
        );
        Ok(ImageEmbedding::new(outputs))
    }

    fn predict(&self, embedding: &ImageEmbedding, prompt: &DecoderPrompt) -> Result<DecoderOutput> {
        let decoder = self
            .decoder
            .as_ref()
            .ok_or_else(|| RecolorError::inference("Tract decoder not initialized"))?;

        let mut inputs = embedding.tensors().to_vec();
        inputs.extend(prompt.tensors());
        DecoderOutput::from_outputs(run(decoder, &inputs)?)
    }

    fn is_initialized(&self) -> bool {
        self.encoder.is_some() && self.decoder.is_some()
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| RecolorError::internal("Model manager not initialized"))?
            .get_info()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
