//! Prompt-driven segmentation
//!
//! A [`Segmenter`] is built once with a fixed strategy: model-guided when
//! the shared model handle is available, classical otherwise. Each request
//! goes through a [`SegmentationSession`]:
//!
//! ```text
//! Idle -> PromptsReceived -> MaskComputed
//!   \           \
//!    `-----------`-------> Failed
//! ```
//!
//! Both end states are terminal. Model failures during a request degrade to
//! the classical strategy instead of failing the session.

mod classical;
mod gmm;
mod graph;
mod guided;
mod hull;

pub use classical::{ClassicalParams, ClassicalSegmenter};
pub use guided::{ModelGuidedSegmenter, PreparedImage};

use crate::{
    config::SegmenterConfig,
    error::{RecolorError, Result},
    session::SharedModel,
    types::{Mask, Raster, SegmentationMode, SegmentationPrompt},
};
use std::sync::OnceLock;
use tracing::{info_span, warn};

/// Strategy chosen at construction
#[derive(Debug, Clone)]
pub enum SegmentationStrategy {
    ModelGuided(ModelGuidedSegmenter),
    Classical,
}

/// Lifecycle of one segmentation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    PromptsReceived,
    MaskComputed,
    Failed,
}

impl SegmenterState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::MaskComputed | Self::Failed)
    }
}

/// Mask plus the strategy that actually produced it
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    pub mask: Mask,
    pub mode: SegmentationMode,
}

/// Produces masks from prompts
#[derive(Debug, Clone)]
pub struct Segmenter {
    strategy: SegmentationStrategy,
    classical: ClassicalSegmenter,
}

impl Segmenter {
    /// Classical-only segmenter
    #[must_use]
    pub fn classical(params: ClassicalParams) -> Self {
        Self {
            strategy: SegmentationStrategy::Classical,
            classical: ClassicalSegmenter::new(params),
        }
    }

    /// Model-guided segmenter with classical fallback
    #[must_use]
    pub fn model_guided(model: ModelGuidedSegmenter, params: ClassicalParams) -> Self {
        Self {
            strategy: SegmentationStrategy::ModelGuided(model),
            classical: ClassicalSegmenter::new(params),
        }
    }

    /// Pick the strategy from configuration and model availability
    ///
    /// Never fails: an unavailable model selects the classical strategy.
    #[must_use]
    pub fn from_config(config: &SegmenterConfig, model: &SharedModel) -> Self {
        let params = ClassicalParams::from(config);
        match model.get() {
            Some(handle) => Self::model_guided(ModelGuidedSegmenter::new(handle), params),
            None => {
                if config.model_dir.is_some() && !config.prefer_classical {
                    warn!("model weights unavailable, using classical segmentation");
                }
                Self::classical(params)
            },
        }
    }

    #[must_use]
    pub fn strategy(&self) -> &SegmentationStrategy {
        &self.strategy
    }

    #[must_use]
    pub fn is_model_guided(&self) -> bool {
        matches!(self.strategy, SegmentationStrategy::ModelGuided(_))
    }

    /// Bind a raster; the model encoder runs at most once per prepared raster
    #[must_use]
    pub fn prepare<'a>(&'a self, raster: &'a Raster) -> PreparedRaster<'a> {
        PreparedRaster {
            segmenter: self,
            raster,
            embedding: OnceLock::new(),
        }
    }

    /// One-shot segmentation through a fresh session
    pub fn segment(&self, raster: &Raster, prompt: &SegmentationPrompt) -> Result<SegmentationOutcome> {
        let prepared = self.prepare(raster);
        let mut session = prepared.session();
        session.submit(prompt.clone())?;
        session.compute()
    }

    fn classical_outcome(&self, raster: &Raster, prompt: &SegmentationPrompt) -> Result<SegmentationOutcome> {
        let mode = if prompt.bbox.is_some() {
            SegmentationMode::ClassicalBox
        } else {
            SegmentationMode::Classical
        };
        let mask = self.classical.segment(raster, prompt)?;
        Ok(SegmentationOutcome { mask, mode })
    }
}

/// A raster bound to a segmenter, caching the image encoding
#[derive(Debug)]
pub struct PreparedRaster<'a> {
    segmenter: &'a Segmenter,
    raster: &'a Raster,
    embedding: OnceLock<std::result::Result<PreparedImage, String>>,
}

impl<'a> PreparedRaster<'a> {
    /// Start a new request against this raster
    #[must_use]
    pub fn session(&'a self) -> SegmentationSession<'a> {
        SegmentationSession {
            prepared: self,
            state: SegmenterState::Idle,
            prompt: None,
        }
    }

    #[must_use]
    pub fn raster(&self) -> &Raster {
        self.raster
    }

    fn run(&self, prompt: &SegmentationPrompt) -> Result<SegmentationOutcome> {
        let SegmentationStrategy::ModelGuided(model) = &self.segmenter.strategy else {
            return self.segmenter.classical_outcome(self.raster, prompt);
        };

        let embedding = self
            .embedding
            .get_or_init(|| model.prepare(self.raster).map_err(|e| e.to_string()));
        let guided = match embedding {
            Ok(prepared) => model.segment_prepared(prepared, prompt),
            Err(reason) => Err(RecolorError::inference(reason.clone())),
        };

        match guided {
            Ok(mask) => Ok(SegmentationOutcome {
                mask,
                mode: SegmentationMode::ModelGuided,
            }),
            Err(e) => {
                warn!(error = %e, backend = model.backend_name(), "model-guided segmentation failed, falling back to classical");
                self.segmenter.classical_outcome(self.raster, prompt)
            },
        }
    }
}

/// One prompt-to-mask request
#[derive(Debug)]
pub struct SegmentationSession<'a> {
    prepared: &'a PreparedRaster<'a>,
    state: SegmenterState,
    prompt: Option<SegmentationPrompt>,
}

impl SegmentationSession<'_> {
    #[must_use]
    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Validate and accept the prompt
    ///
    /// # Errors
    /// - [`RecolorError::InsufficientPrompts`], [`RecolorError::InvalidBoundingBox`] or
    ///   [`RecolorError::PromptOutOfBounds`]; the session moves to `Failed`
    /// - [`RecolorError::Processing`] if prompts were already submitted
    pub fn submit(&mut self, prompt: SegmentationPrompt) -> Result<()> {
        if self.state != SegmenterState::Idle {
            return Err(RecolorError::processing(format!(
                "prompts can only be submitted to an idle session (state: {:?})",
                self.state
            )));
        }
        let (width, height) = self.prepared.raster.dimensions();
        if let Err(e) = prompt.validate_within(width, height) {
            self.state = SegmenterState::Failed;
            return Err(e);
        }
        self.prompt = Some(prompt);
        self.state = SegmenterState::PromptsReceived;
        Ok(())
    }

    /// Compute the mask for the submitted prompt
    ///
    /// # Errors
    /// - [`RecolorError::Processing`] if no prompt is pending
    pub fn compute(&mut self) -> Result<SegmentationOutcome> {
        let prompt = match (self.state, self.prompt.as_ref()) {
            (SegmenterState::PromptsReceived, Some(prompt)) => prompt,
            _ => {
                return Err(RecolorError::processing(format!(
                    "no prompts pending (state: {:?})",
                    self.state
                )))
            },
        };

        let span = info_span!("segment", points = prompt.points.len(), has_box = prompt.bbox.is_some());
        let _guard = span.enter();

        match self.prepared.run(prompt) {
            Ok(outcome) => {
                self.state = SegmenterState::MaskComputed;
                Ok(outcome)
            },
            Err(e) => {
                self.state = SegmenterState::Failed;
                Err(e)
            },
        }
    }
}
