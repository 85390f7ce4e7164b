//! ONNX Runtime backend for promptable segmentation models
//!
//! Supports CPU, CUDA and CoreML execution providers. Sessions require
//! exclusive access to run, so each one sits behind a mutex and concurrent
//! requests serialise on inference while sharing the loaded weights.

use crate::config::{ExecutionProvider, SegmenterConfig};
use crate::error::{RecolorError, Result};
use crate::inference::{DecoderOutput, DecoderPrompt, ImageEmbedding, PromptSegmentationBackend};
use crate::models::{ModelInfo, ModelManager};
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::session::SessionInputValue;
use ort::value::Value;
use std::sync::Mutex;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime backend holding encoder and decoder sessions
#[derive(Debug, Default)]
pub struct OnnxBackend {
    encoder: Option<Mutex<Session>>,
    decoder: Option<Mutex<Session>>,
    model_manager: Option<ModelManager>,
}

impl OnnxBackend {
    /// Create a new uninitialized ONNX backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers with availability status and descriptions
    ///
    /// # Examples
    /// ```rust,no_run
    /// use object_recolor::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);
        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn session_builder(config: &SegmenterConfig) -> Result<SessionBuilder> {
        let builder = Session::builder()
            .map_err(|e| RecolorError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                RecolorError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let cuda = || {
            let provider = CUDAExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| provider.build())
        };
        let coreml = || {
            let provider = CoreMLExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| CoreMLExecutionProvider::default().with_subgraphs(true).build())
        };

        let providers: Vec<_> = match config.execution_provider {
            ExecutionProvider::Auto => [cuda(), coreml()].into_iter().flatten().collect(),
            ExecutionProvider::Cpu => Vec::new(),
            ExecutionProvider::Cuda => {
                let p: Vec<_> = cuda().into_iter().collect();
                if p.is_empty() {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
                p
            },
            ExecutionProvider::CoreMl => {
                let p: Vec<_> = coreml().into_iter().collect();
                if p.is_empty() {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
                p
            },
        };

        let builder = if providers.is_empty() {
            log::info!("Using CPU execution provider");
            builder
        } else {
            log::info!(
                "✅ Hardware acceleration enabled with {count} provider(s)",
                count = providers.len()
            );
            builder.with_execution_providers(providers).map_err(|e| {
                RecolorError::inference(format!("Failed to set execution providers: {e}"))
            })?
        };

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };
        builder
            .with_intra_threads(intra_threads)
            .map_err(|e| RecolorError::inference(format!("Failed to set intra threads: {e}")))
    }

    fn load_models(&mut self, models: &ModelManager, config: &SegmenterConfig) -> Result<Duration> {
        let start = Instant::now();
        let info = models.get_info()?;
        log::info!("🚀 Initializing ONNX Runtime backend");
        log::info!("🧠 Model: {} (input {}px)", info.name, info.input_size);
        log::info!("⚡ Requested provider: {}", config.execution_provider);

        let encoder = Self::session_builder(config)?
            .commit_from_memory(&models.load_encoder()?)
            .map_err(|e| RecolorError::model(format!("Failed to create encoder session: {e}")))?;
        let decoder = Self::session_builder(config)?
            .commit_from_memory(&models.load_decoder()?)
            .map_err(|e| RecolorError::model(format!("Failed to create decoder session: {e}")))?;

        self.encoder = Some(Mutex::new(encoder));
        self.decoder = Some(Mutex::new(decoder));
        self.model_manager = Some(models.clone());

        let elapsed = start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(elapsed)
    }
}

fn run(session: &Mutex<Session>, inputs: &[ArrayD<f32>]) -> Result<Vec<ArrayD<f32>>> {
    let mut session = session
        .lock()
        .map_err(|_| RecolorError::internal("ONNX session lock poisoned"))?;

    let names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
    if names.len() != inputs.len() {
        return Err(RecolorError::inference(format!(
            "Model expects {} inputs, got {}",
            names.len(),
            inputs.len()
        )));
    }

    let mut feed: Vec<(String, SessionInputValue<'_>)> = Vec::with_capacity(inputs.len());
    for (name, array) in names.into_iter().zip(inputs) {
        let value = Value::from_array(array.clone())
            .map_err(|e| RecolorError::inference(format!("Failed to convert input '{name}': {e}")))?;
        feed.push((name, value.into()));
    }

    let outputs = session
        .run(feed)
        .map_err(|e| RecolorError::inference(format!("ONNX inference failed: {e}")))?;

    let mut arrays = Vec::with_capacity(outputs.len());
    for (name, value) in outputs.iter() {
        let array = value
            .try_extract_array::<f32>()
            .map_err(|e| {
                RecolorError::inference(format!("Failed to extract output '{name}': {e}"))
            })?
            .to_owned();
        arrays.push(array);
    }
    Ok(arrays)
}

impl PromptSegmentationBackend for OnnxBackend {
    fn initialize(
        &mut self,
        models: &ModelManager,
        config: &SegmenterConfig,
    ) -> Result<Option<Duration>> {
        if self.is_initialized() {
            return Ok(None);
        }
        self.load_models(models, config).map(Some)
    }

    fn embed(&self, image: &Array4<f32>) -> Result<ImageEmbedding> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| RecolorError::inference("ONNX encoder not initialized"))?;
        let start = Instant::now();
        let outputs = run(encoder, &[image.clone().into_dyn()])?;
        if outputs.is_empty() {
            return Err(RecolorError::inference("Encoder produced no outputs"));
        }
        log::debug!(
            "  ⚡ Encoder inference: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(ImageEmbedding::new(outputs))
    }

    fn predict(&self, embedding: &ImageEmbedding, prompt: &DecoderPrompt) -> Result<DecoderOutput> {
        let decoder = self
            .decoder
            .as_ref()
            .ok_or_else(|| RecolorError::inference("ONNX decoder not initialized"))?;
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
        "onnx"
    }
}
