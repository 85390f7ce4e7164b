//! Promptable segmentation backend abstraction
//!
//! A backend runs two networks: an image encoder that turns a normalised
//! NCHW tensor into one or more embedding tensors, and a prompt decoder that
//! takes those embeddings followed by point/box prompts and returns mask
//! logits. Backends are positional: embeddings are fed to the decoder in the
//! order the encoder produced them, followed by [`DecoderPrompt::tensors`].

use crate::{
    config::SegmenterConfig,
    error::Result,
    models::{ModelInfo, ModelManager},
};
use ndarray::{Array1, Array2, Array3, Array4, ArrayD};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Encoder output for one image
#[derive(Debug, Clone)]
pub struct ImageEmbedding {
    tensors: Vec<ArrayD<f32>>,
}

impl ImageEmbedding {
    #[must_use]
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Self { tensors }
    }

    #[must_use]
    pub fn tensors(&self) -> &[ArrayD<f32>] {
        &self.tensors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Prompt tensors in decoder input order
#[derive(Debug, Clone)]
pub struct DecoderPrompt {
    /// `[1, N, 2]` coordinates in encoder input space
    pub point_coords: Array3<f32>,
    /// `[1, N]`: 1 foreground, 0 background, 2/3 box corners, -1 padding
    pub point_labels: Array2<f32>,
    /// `[1, 1, M, M]` previous low-resolution mask (zeros when unused)
    pub mask_input: Array4<f32>,
    /// `[1]`: 1.0 when `mask_input` carries a mask
    pub has_mask_input: Array1<f32>,
    /// `[2]`: original height and width
    pub orig_im_size: Array1<f32>,
}

impl DecoderPrompt {
    /// Tensors in the positional order expected after the embeddings
    #[must_use]
    pub fn tensors(&self) -> Vec<ArrayD<f32>> {
        vec![
            self.point_coords.clone().into_dyn(),
            self.point_labels.clone().into_dyn(),
            self.mask_input.clone().into_dyn(),
            self.has_mask_input.clone().into_dyn(),
            self.orig_im_size.clone().into_dyn(),
        ]
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_labels.len()
    }
}

/// Decoder output: mask planes and optional per-plane quality scores
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// `[.., H, W]` mask logits or probabilities
    pub masks: ArrayD<f32>,
    /// One score per mask plane
    pub scores: Option<ArrayD<f32>>,
}

impl DecoderOutput {
    /// Build from raw decoder outputs: first is the masks, second (if any) the scores
    pub fn from_outputs(mut outputs: Vec<ArrayD<f32>>) -> Result<Self> {
        if outputs.is_empty() {
            return Err(crate::error::RecolorError::inference(
                "decoder produced no outputs",
            ));
        }
        let masks = outputs.remove(0);
        let scores = if outputs.is_empty() {
            None
        } else {
            Some(outputs.remove(0))
        };
        Ok(Self { masks, scores })
    }
}

/// Trait for promptable segmentation backends
///
/// `embed` and `predict` take `&self` so a single initialised backend can be
/// shared read-only between concurrent requests.
pub trait PromptSegmentationBackend: Send + Sync + std::fmt::Debug {
    /// Load encoder and decoder from the model directory
    ///
    /// Returns the load time on first initialisation, `None` if already loaded.
    ///
    /// # Errors
    /// - Model files missing or unreadable
    /// - Network parsing or optimisation failures
    fn initialize(
        &mut self,
        models: &ModelManager,
        config: &SegmenterConfig,
    ) -> Result<Option<Duration>>;

    /// Run the image encoder
    ///
    /// # Errors
    /// - Backend not initialised
    /// - Inference failures or unexpected output shapes
    fn embed(&self, image: &Array4<f32>) -> Result<ImageEmbedding>;

    /// Run the prompt decoder against a cached embedding
    ///
    /// # Errors
    /// - Backend not initialised
    /// - Inference failures or missing outputs
    fn predict(&self, embedding: &ImageEmbedding, prompt: &DecoderPrompt) -> Result<DecoderOutput>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Backend not initialised
    fn model_info(&self) -> Result<ModelInfo>;

    /// Short backend identifier for logs and metadata
    fn name(&self) -> &'static str;
}

/// Creates backends for the shared model handle
pub trait BackendFactory: Send + Sync + std::fmt::Debug {
    /// Create an uninitialised backend
    ///
    /// # Errors
    /// - No backend compiled into this build
    fn create(&self, config: &SegmenterConfig) -> Result<Box<dyn PromptSegmentationBackend>>;

    /// Backends this factory can produce
    fn available_backends(&self) -> Vec<&'static str>;
}
