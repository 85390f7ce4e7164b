#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Object Recolor
//!
//! Select an object in an image with clicks or a box, then recolor it while
//! keeping its shading.
//!
//! The pipeline runs `Loader → Detector → Segmenter → Refiner → Recolorer → Exporter`:
//!
//! - **Loading**: PNG, JPEG and WebP uploads with size limits and optional downsampling
//! - **Detection**: optional text-query detectors that turn a query into a box prompt
//! - **Segmentation**: a promptable ONNX model when weights are present, otherwise a
//!   classical colour-model graph cut seeded from the prompts
//! - **Refinement**: threshold, morphological close/open, Gaussian feathering and
//!   optional shadow expansion
//! - **Recolor**: CIE L\*a\*b\* blend that keeps lightness and alpha
//! - **Export**: result PNG, mask preview and a JSON metadata record
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use object_recolor::{
//!     BoundingBox, EditPipeline, EditRequest, PipelineConfig, RecolorSpec, SegmentationPrompt,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .max_dimension(1024)
//!     .feather_radius(3.0)
//!     .build()?;
//! let pipeline = EditPipeline::new(config)?;
//!
//! let bytes = std::fs::read("car.jpg")?;
//! let request = EditRequest::new(bytes, "image/jpeg", RecolorSpec::parse("#1e90ff")?)
//!     .with_prompt(SegmentationPrompt::from_box(BoundingBox::new(120, 80, 640, 420)?));
//! let outcome = pipeline.run_and_export(&request, &CancellationToken::new())?;
//! println!("wrote {}", outcome.files.result.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `tract` (default): pure Rust model backend
//! - `onnx`: ONNX Runtime backend with CUDA/CoreML execution providers
//! - `cli` (default): `object-recolor` binary, progress bars and tracing setup
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`, `tracing-files`: extra tracing outputs for the CLI
//!
//! Without model weights (or with neither backend compiled in) every request
//! uses the classical segmenter; model problems never surface as errors.

pub mod api;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod detect;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod recolor;
pub mod refine;
pub mod segmentation;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

// Public API exports
pub use api::{EditService, HealthStatus};
pub use backends::DefaultBackendFactory;
pub use color::RgbColor;
pub use config::{
    ConcurrencyConfig, DetectorConfig, ExecutionProvider, ExportConfig, LoaderConfig,
    PipelineConfig, PipelineConfigBuilder, RecolorDefaults, RefineConfig, SegmenterConfig,
    ShadowConfig,
};
pub use detect::{Detection, DetectionReport, Detector, ObjectDetector, PrecomputedDetector};
pub use error::{RecolorError, Result};
pub use inference::{BackendFactory, PromptSegmentationBackend};
pub use models::{ModelInfo, ModelManager, ModelManifest};
pub use processor::{EditOutcome, EditPipeline, EditRequest};
pub use recolor::Recolorer;
pub use refine::{expand_mask_to_include_shadow, Refiner};
pub use segmentation::{
    ClassicalParams, ClassicalSegmenter, SegmentationStrategy, Segmenter, SegmenterState,
};
pub use services::{
    ConsoleProgressReporter, ContentType, ExportedFiles, Exporter, ImageIOService, LoadedImage,
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use session::SharedModel;
pub use types::{
    BoundingBox, DetectionMode, EditMetadata, EditResult, Mask, PointPrompt, ProcessingTimings,
    PromptLabel, PromptSet, Raster, RecolorSpec, SegmentationMode, SegmentationPrompt,
};
pub use utils::{draw_detections, draw_prompts, OverlayStyle};

#[cfg(feature = "cli")]
pub use tracing_config::{
    init_cli_tracing, spans, TracingConfig, TracingFormat, TracingGuard, TracingOutput,
};

/// Recolor an upload with the process-wide model handle
///
/// Runs on the blocking thread pool and never exports.
///
/// # Examples
///
/// ```rust,no_run
/// use object_recolor::{recolor_from_bytes, EditRequest, PipelineConfig, PointPrompt, PromptSet,
///     RecolorSpec, SegmentationPrompt};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let request = EditRequest::new(upload, "image/png", RecolorSpec::parse("rgb(220, 30, 30)")?)
///     .with_prompt(SegmentationPrompt::from_points(
///         PromptSet::new().with(PointPrompt::foreground(310, 200)),
///     ));
/// let result = recolor_from_bytes(request, PipelineConfig::default()).await?;
/// println!("{}", result.timing_summary());
/// # Ok(())
/// # }
/// ```
pub async fn recolor_from_bytes(
    request: EditRequest,
    config: PipelineConfig,
) -> Result<EditResult> {
    EditService::from_config(config)?
        .edit(request, CancellationToken::new())
        .await
}

/// Recolor an image read from an async stream
///
/// Reading stops one byte past the upload limit so oversized streams fail
/// with `PayloadTooLarge` without being buffered whole.
pub async fn recolor_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    content_type: &str,
    prompt: SegmentationPrompt,
    spec: RecolorSpec,
    config: PipelineConfig,
) -> Result<EditResult> {
    let limit = config.loader.max_upload_bytes as u64;
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .await?;

    let request = EditRequest::new(bytes, content_type, spec).with_prompt(prompt);
    recolor_from_bytes(request, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_png() -> Vec<u8> {
        Raster::from_fn(64, 48, |x, y| {
            if (16..48).contains(&x) && (12..36).contains(&y) {
                image::Rgba([40, 40, 40, 255])
            } else {
                image::Rgba([235, 235, 235, 255])
            }
        })
        .to_png_bytes()
        .unwrap()
    }

    fn classical() -> PipelineConfig {
        PipelineConfig::builder().prefer_classical(true).build().unwrap()
    }

    #[tokio::test]
    async fn test_recolor_from_reader() {
        let prompt = SegmentationPrompt::from_box(BoundingBox::new(14, 10, 50, 38).unwrap());
        let result = recolor_from_reader(
            std::io::Cursor::new(scene_png()),
            "image/png",
            prompt,
            RecolorSpec::new(RgbColor::new(0, 0, 255)),
            classical(),
        )
        .await
        .unwrap();
        assert_eq!(result.dimensions(), (64, 48));
        assert_eq!(result.metadata().segmentation_mode, SegmentationMode::ClassicalBox);
    }

    #[tokio::test]
    async fn test_reader_over_limit_is_rejected() {
        let mut config = classical();
        config.loader.max_upload_bytes = 16;
        let err = recolor_from_reader(
            std::io::Cursor::new(scene_png()),
            "image/png",
            SegmentationPrompt::from_box(BoundingBox::new(0, 0, 8, 8).unwrap()),
            RecolorSpec::new(RgbColor::DEFAULT),
            config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RecolorError::PayloadTooLarge { .. }));
    }
}
