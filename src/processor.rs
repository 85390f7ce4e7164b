//! End-to-end edit pipeline
//!
//! [`EditPipeline`] runs Loader → Detector → Segmenter → Refiner → Recolorer
//! and optionally the Exporter. Each stage consumes the previous stage's
//! artifact by reference and produces a new one; nothing is shared between
//! requests except the read-only model handle.

use crate::{
    config::PipelineConfig,
    detect::{Detector, ObjectDetector},
    error::{RecolorError, Result},
    recolor::Recolorer,
    refine::{apply_shadow, Refiner},
    segmentation::Segmenter,
    services::{
        ExportedFiles, Exporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
        ProgressReporter, ProgressTracker,
    },
    session::SharedModel,
    types::{
        BoundingBox, DetectionMode, EditMetadata, EditResult, PointPrompt, ProcessingTimings,
        PromptSet, PromptSummary, RecolorSpec, SegmentationPrompt,
    },
};
use instant::Instant;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, span, Level};

/// One edit: the upload, what to select and how to recolor it
///
/// Point and box prompts are in the pixel coordinates of the decoded
/// upload; they are rescaled when the loader downsamples.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub prompt: SegmentationPrompt,
    /// Text query resolved by the detector when no box was given
    pub query: Option<String>,
    pub spec: RecolorSpec,
}

impl EditRequest {
    #[must_use]
    pub fn new<B: Into<Vec<u8>>, S: Into<String>>(
        bytes: B,
        content_type: S,
        spec: RecolorSpec,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            prompt: SegmentationPrompt::default(),
            query: None,
            spec,
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: SegmentationPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_query<S: Into<String>>(mut self, query: S) -> Self {
        self.query = Some(query.into()).filter(|q: &String| !q.trim().is_empty());
        self
    }
}

/// An edit result plus the files written for it
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub result: EditResult,
    pub files: ExportedFiles,
}

/// Stateless edit pipeline
pub struct EditPipeline {
    config: PipelineConfig,
    model: Arc<SharedModel>,
    detector: Detector,
    reporter: Arc<dyn ProgressReporter>,
    exporter: Exporter,
}

impl EditPipeline {
    /// Pipeline with its own lazily loaded model handle
    ///
    /// # Errors
    /// Invalid configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let model = Arc::new(SharedModel::new(config.segmenter.clone()));
        Self::with_shared_model(config, model)
    }

    /// Pipeline over the process-wide model handle
    ///
    /// # Errors
    /// Invalid configuration
    pub fn global(config: PipelineConfig) -> Result<Self> {
        let model = SharedModel::global(&config.segmenter);
        Self::with_shared_model(config, model)
    }

    /// Pipeline over an existing model handle
    ///
    /// # Errors
    /// Invalid configuration
    pub fn with_shared_model(config: PipelineConfig, model: Arc<SharedModel>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            exporter: Exporter::new(config.export.clone()),
            detector: Detector::unavailable(),
            reporter: Arc::new(NoOpProgressReporter),
            model,
            config,
        })
    }

    /// Attach a detector for text queries
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = Detector::new(detector, self.config.detector.clone());
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &Arc<SharedModel> {
        &self.model
    }

    /// Whether the model handle has been loaded; never triggers a load
    #[must_use]
    pub fn is_model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    /// Whether the configuration still validates
    #[must_use]
    pub fn is_constructible(&self) -> bool {
        self.config.validate().is_ok()
    }

    /// Run every stage except export
    ///
    /// # Errors
    /// - Upload errors: `PayloadTooLarge`, `UnsupportedFormat`, `DecodeError`
    /// - Prompt errors: `InsufficientPrompts`, `InvalidBoundingBox`, `PromptOutOfBounds`
    /// - `InvalidConfig` for out-of-range recolor parameters
    /// - `Cancelled` when `cancel` fires between stages
    #[instrument(
        skip(self, request, cancel),
        fields(
            content_type = %request.content_type,
            bytes = request.bytes.len(),
            target = %request.spec.target
        )
    )]
    pub fn run(&self, request: &EditRequest, cancel: &CancellationToken) -> Result<EditResult> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let outcome = self.run_stages(request, cancel, &mut tracker);
        match &outcome {
            Ok(result) => tracker.report_completion(&result.metadata().timings),
            Err(e) => tracker.report_error(&e.to_string()),
        }
        outcome
    }

    /// Run the pipeline and write its artifacts
    ///
    /// # Errors
    /// Everything [`EditPipeline::run`] returns, plus `WriteError`
    pub fn run_and_export(
        &self,
        request: &EditRequest,
        cancel: &CancellationToken,
    ) -> Result<EditOutcome> {
        let result = self.run(request, cancel)?;
        checkpoint(cancel, ProcessingStage::Export)?;
        self.export(result)
    }

    /// Write an existing result
    ///
    /// # Errors
    /// `WriteError` when the output directory is not writable
    pub fn export(&self, result: EditResult) -> Result<EditOutcome> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        tracker.report_stage(ProcessingStage::Export);
        let (result, files) = self.exporter.export(result).inspect_err(|e| {
            tracker.report_error(&e.to_string());
        })?;
        Ok(EditOutcome { result, files })
    }

    fn run_stages(
        &self,
        request: &EditRequest,
        cancel: &CancellationToken,
        tracker: &mut ProgressTracker,
    ) -> Result<EditResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        // Cheap checks first
        request.spec.validate()?;
        if !request.prompt.is_sufficient() && request.query.is_none() {
            return Err(RecolorError::insufficient_prompts(
                "at least one foreground point, a bounding box or a text query is required",
            ));
        }

        checkpoint(cancel, ProcessingStage::Loading)?;
        tracker.report_stage(ProcessingStage::Loading);
        let stage_start = Instant::now();
        let loaded = ImageIOService::load_from_bytes(
            &request.bytes,
            &request.content_type,
            &self.config.loader,
        )?;
        timings.decode_ms = elapsed_ms(stage_start);
        let raster = loaded.raster;
        let processed_dimensions = raster.dimensions();

        // Prompts arrive in source coordinates
        let (sw, sh) = loaded.source_dimensions;
        if request.prompt.bbox.is_some() {
            request.prompt.validate_within(sw, sh)?;
        } else {
            request.prompt.points.validate_within(sw, sh)?;
        }
        let mut prompt =
            scale_prompt(&request.prompt, loaded.source_dimensions, processed_dimensions)?;

        let mut detection_mode = DetectionMode::NotRequested;
        let mut selected_object = request.prompt.bbox.as_ref().and_then(|b| b.label.clone());
        if let (Some(query), None) = (request.query.as_deref(), prompt.bbox.as_ref()) {
            checkpoint(cancel, ProcessingStage::Detection)?;
            tracker.report_stage(ProcessingStage::Detection);
            let stage_start = Instant::now();
            let report = {
                let _span = span!(Level::DEBUG, "detection", query).entered();
                self.detector.detect(&raster, query)
            };
            timings.detection_ms = elapsed_ms(stage_start);
            detection_mode = report.mode;
            selected_object = Some(query.to_string());
            if let Some(best) = report.best() {
                selected_object = Some(best.label.clone());
                prompt.bbox = Some(best.labelled_box());
            }
        }
        prompt.validate_within(processed_dimensions.0, processed_dimensions.1)?;

        checkpoint(cancel, ProcessingStage::Segmentation)?;
        tracker.report_stage(ProcessingStage::Segmentation);
        let was_loaded = self.model.is_loaded();
        let stage_start = Instant::now();
        let segmenter = Segmenter::from_config(&self.config.segmenter, &self.model);
        if !was_loaded && segmenter.is_model_guided() {
            timings.model_load_ms = elapsed_ms(stage_start);
        }
        let stage_start = Instant::now();
        let segmentation = {
            let _span = span!(
                Level::INFO,
                "segmentation",
                model_guided = segmenter.is_model_guided(),
                points = prompt.points.len(),
                has_box = prompt.bbox.is_some()
            )
            .entered();
            segmenter.segment(&raster, &prompt)?
        };
        timings.segmentation_ms = elapsed_ms(stage_start);

        checkpoint(cancel, ProcessingStage::Refinement)?;
        tracker.report_stage(ProcessingStage::Refinement);
        let stage_start = Instant::now();
        let refined = Refiner::new(self.config.refine.clone()).refine(&segmentation.mask)?;
        let mask = if self.config.shadow.enabled {
            apply_shadow(&raster, &refined, &self.config.shadow)
        } else {
            refined
        };
        timings.refine_ms = elapsed_ms(stage_start);

        checkpoint(cancel, ProcessingStage::Recolor)?;
        tracker.report_stage(ProcessingStage::Recolor);
        let stage_start = Instant::now();
        let recolored = {
            let _span = span!(Level::DEBUG, "recolor", strength = request.spec.strength).entered();
            Recolorer::new().recolor(&raster, &mask, &request.spec)?
        };
        timings.recolor_ms = elapsed_ms(stage_start);
        timings.total_ms = elapsed_ms(total_start);

        let metadata = EditMetadata {
            request_id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            selected_object,
            color_hex: request.spec.target.to_hex(),
            strength: request.spec.strength,
            chroma_scale: request.spec.chroma_scale,
            source_color_hex: request.spec.source_color.map(|c| c.to_hex()),
            detection_mode,
            segmentation_mode: segmentation.mode,
            prompts: PromptSummary::from(&prompt),
            refine: self.config.refine.clone(),
            shadow_expanded: self.config.shadow.enabled,
            source_dimensions: loaded.source_dimensions,
            processed_dimensions,
            mask_coverage: mask.coverage(),
            timings,
        };
        let result = EditResult::new(recolored, mask, metadata)?;

        info!(
            mode = %result.metadata().segmentation_mode,
            coverage = result.metadata().mask_coverage,
            total_ms = result.metadata().timings.total_ms,
            "edit complete"
        );
        debug!("{}", result.timing_summary());
        Ok(result)
    }
}

impl std::fmt::Debug for EditPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditPipeline")
            .field("config", &self.config)
            .field("model", &self.model)
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

fn checkpoint(cancel: &CancellationToken, stage: ProcessingStage) -> Result<()> {
    if cancel.is_cancelled() {
        debug!(stage = %stage, "edit cancelled");
        return Err(RecolorError::Cancelled(stage.description().to_string()));
    }
    Ok(())
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Map prompts from source pixel coordinates onto the processed raster
///
/// Points land on the pixel containing their scaled position; boxes grow
/// outward so they never collapse below one pixel.
pub(crate) fn scale_prompt(
    prompt: &SegmentationPrompt,
    from: (u32, u32),
    to: (u32, u32),
) -> Result<SegmentationPrompt> {
    if from == to {
        return Ok(prompt.clone());
    }
    let floor = |v: u32, src: u32, dst: u32| -> u32 {
        u32::try_from(u64::from(v) * u64::from(dst) / u64::from(src.max(1))).unwrap_or(dst)
    };
    let ceil = |v: u32, src: u32, dst: u32| -> u32 {
        let src = u64::from(src.max(1));
        u32::try_from((u64::from(v) * u64::from(dst)).div_ceil(src)).unwrap_or(dst)
    };

    let points: PromptSet = prompt
        .points
        .iter()
        .map(|p| PointPrompt {
            x: floor(p.x, from.0, to.0).min(to.0.saturating_sub(1)),
            y: floor(p.y, from.1, to.1).min(to.1.saturating_sub(1)),
            label: p.label,
        })
        .collect();

    let bbox = match &prompt.bbox {
        Some(b) => {
            let x_min = floor(b.x_min, from.0, to.0).min(to.0.saturating_sub(1));
            let y_min = floor(b.y_min, from.1, to.1).min(to.1.saturating_sub(1));
            let x_max = ceil(b.x_max, from.0, to.0).min(to.0).max(x_min + 1);
            let y_max = ceil(b.y_max, from.1, to.1).min(to.1).max(y_min + 1);
            let mut scaled = BoundingBox::new(x_min, y_min, x_max, y_max)?;
            scaled.label.clone_from(&b.label);
            scaled.confidence = b.confidence;
            Some(scaled)
        },
        None => None,
    };

    Ok(SegmentationPrompt { points, bbox })
}
