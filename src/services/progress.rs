//! Progress reporting service
//!
//! Separates stage progress from the pipeline so each frontend can render it
//! its own way.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Pipeline stages reported while an edit runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Checking and decoding the upload
    Loading,
    /// Resolving a text query into a bounding box
    Detection,
    /// Computing the object mask
    Segmentation,
    /// Morphology, feathering and shadow expansion
    Refinement,
    /// Applying the colour change
    Recolor,
    /// Writing artifacts
    Export,
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Loading => "Loading image",
            ProcessingStage::Detection => "Detecting object",
            ProcessingStage::Segmentation => "Segmenting object",
            ProcessingStage::Refinement => "Refining mask",
            ProcessingStage::Recolor => "Recoloring",
            ProcessingStage::Export => "Saving result",
            ProcessingStage::Completed => "Edit completed",
        }
    }

    /// Typical progress percentage once this stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Loading => 5,
            ProcessingStage::Detection => 15,
            ProcessingStage::Segmentation => 25,
            ProcessingStage::Refinement => 70,
            ProcessingStage::Recolor => 80,
            ProcessingStage::Export => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the edit started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
            stage,
            description,
        }
    }
}

/// Receives progress while an edit runs
///
/// Reporters are shared across worker threads.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Logs progress through the `log` facade
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a console reporter; `verbose` adds elapsed times and stage timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ Recolor completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Decode: {}ms", timings.decode_ms);
            log::info!("    • Detection: {}ms", timings.detection_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Refinement: {}ms", timings.refine_ms);
            log::info!("    • Recolor: {}ms", timings.recolor_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Per-request progress state over a shared reporter
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker that reports nowhere
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    pub fn report_completion(&mut self, timings: &ProcessingTimings) {
        self.current_stage = Some(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Loading);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .field("elapsed_ms", &self.elapsed_ms())
            .finish_non_exhaustive()
    }
}
