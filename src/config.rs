//! Configuration types for the edit pipeline

use crate::error::{RecolorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = RecolorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" | "core_ml" => Ok(Self::CoreMl),
            other => Err(RecolorError::invalid_config(format!(
                "unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Limits applied while decoding uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Longest allowed side after loading; larger images are downsampled (0 = never)
    pub max_dimension: u32,
    /// Upload byte ceiling
    pub max_upload_bytes: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Segmentation strategy selection and classical-fallback tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Directory holding `encoder.onnx`/`decoder.onnx`; absent selects the classical strategy
    pub model_dir: Option<PathBuf>,
    /// Skip the model even when weights are present
    pub prefer_classical: bool,
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads for the inference backend (0 = auto)
    pub intra_threads: usize,
    /// Graph-cut refinement rounds
    pub iterations: u32,
    /// Gaussian components per colour model
    pub gmm_components: usize,
    /// Margin around the foreground hull, as a fraction of the longest side
    pub region_margin_ratio: f32,
    /// Lower bound on that margin in pixels
    pub min_region_margin: u32,
    /// Radius of the hard-constraint disc around each point
    pub seed_radius: u32,
    /// Pairwise smoothness weight
    pub smoothness: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            prefer_classical: false,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            iterations: 5,
            gmm_components: 5,
            region_margin_ratio: 0.15,
            min_region_margin: 16,
            seed_radius: 5,
            smoothness: 50.0,
        }
    }
}

/// Morphology and feathering applied to raw masks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Structuring element size; rounded up to odd and capped at 9 (0 = no morphology)
    pub kernel_size: u32,
    pub close_iterations: u32,
    pub open_iterations: u32,
    /// Gaussian feather radius in pixels (0 = hard edges)
    pub feather_radius: f32,
    /// Binarisation threshold applied before morphology
    pub mask_threshold: Option<f32>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            close_iterations: 1,
            open_iterations: 1,
            feather_radius: 2.0,
            mask_threshold: Some(0.5),
        }
    }
}

impl RefineConfig {
    /// Parameters that leave any mask unchanged
    #[must_use]
    pub fn identity() -> Self {
        Self {
            kernel_size: 0,
            close_iterations: 0,
            open_iterations: 0,
            feather_radius: 0.0,
            mask_threshold: None,
        }
    }
}

/// Growth of the mask into adjacent cast shadows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    pub dilation_px: u32,
    /// HSV value below which a ring pixel counts as shadow
    pub value_threshold: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dilation_px: 20,
            value_threshold: 0.5,
        }
    }
}

/// Defaults used when a request does not specify recolor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecolorDefaults {
    pub strength: f32,
    pub hue_tolerance_degrees: f32,
}

impl Default for RecolorDefaults {
    fn default() -> Self {
        Self {
            strength: crate::types::DEFAULT_STRENGTH,
            hue_tolerance_degrees: crate::types::DEFAULT_HUE_TOLERANCE,
        }
    }
}

/// Where exported artifacts are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub write_metadata: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            write_metadata: true,
        }
    }
}

/// Optional text-query detection stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub enabled: bool,
    /// Detections below this confidence are discarded
    pub min_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.25,
        }
    }
}

/// Worker pool sizing for the async service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Edits allowed to run at once (0 = available parallelism)
    pub max_concurrent_edits: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_edits: 0,
        }
    }
}

impl ConcurrencyConfig {
    /// Resolved permit count, never zero
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        if self.max_concurrent_edits > 0 {
            self.max_concurrent_edits
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(2)
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub segmenter: SegmenterConfig,
    pub refine: RefineConfig,
    pub shadow: ShadowConfig,
    pub recolor: RecolorDefaults,
    pub export: ExportConfig,
    pub detector: DetectorConfig,
    pub concurrency: ConcurrencyConfig,
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use object_recolor::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .max_dimension(2048)
    ///     .prefer_classical(true)
    ///     .feather_radius(3.0)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.loader.max_dimension, 2048);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Defaults overridden by process environment variables
    ///
    /// Recognised: `MAX_IMAGE_DIMENSION`, `MAX_UPLOAD_BYTES`, `MODEL_CACHE_DIR`,
    /// `PREFER_CLASSICAL`, `DATA_DIR`, `MAX_CONCURRENT_EDITS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u32, _>(&lookup, "MAX_IMAGE_DIMENSION")? {
            config.loader.max_dimension = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MAX_UPLOAD_BYTES")? {
            config.loader.max_upload_bytes = v;
        }
        if let Some(dir) = lookup("MODEL_CACHE_DIR").filter(|s| !s.trim().is_empty()) {
            config.segmenter.model_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(raw) = lookup("PREFER_CLASSICAL") {
            config.segmenter.prefer_classical = parse_flag("PREFER_CLASSICAL", &raw)?;
        }
        if let Some(dir) = lookup("DATA_DIR").filter(|s| !s.trim().is_empty()) {
            config.export.output_dir = PathBuf::from(dir.trim());
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MAX_CONCURRENT_EDITS")? {
            config.concurrency.max_concurrent_edits = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a (possibly partial) JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RecolorError::file_io_error("read config", path, &e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RecolorError::invalid_config(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Any numeric parameter outside its documented range
    pub fn validate(&self) -> Result<()> {
        if self.loader.max_upload_bytes == 0 {
            return Err(RecolorError::config_value_error(
                "max_upload_bytes",
                0,
                ">= 1",
                Some(LoaderConfig::default().max_upload_bytes),
            ));
        }

        let seg = &self.segmenter;
        if seg.iterations == 0 || seg.iterations > 50 {
            return Err(RecolorError::config_value_error(
                "iterations",
                seg.iterations,
                "1-50",
                Some(5),
            ));
        }
        if seg.gmm_components == 0 || seg.gmm_components > 16 {
            return Err(RecolorError::config_value_error(
                "gmm_components",
                seg.gmm_components,
                "1-16",
                Some(5),
            ));
        }
        if !seg.region_margin_ratio.is_finite() || !(0.0..=1.0).contains(&seg.region_margin_ratio)
        {
            return Err(RecolorError::config_value_error(
                "region_margin_ratio",
                seg.region_margin_ratio,
                "0.0-1.0",
                Some(0.15),
            ));
        }
        if !seg.smoothness.is_finite() || seg.smoothness < 0.0 {
            return Err(RecolorError::config_value_error(
                "smoothness",
                seg.smoothness,
                ">= 0",
                Some(50.0),
            ));
        }

        let refine = &self.refine;
        if refine.kernel_size > 9 {
            return Err(RecolorError::config_value_error(
                "kernel_size",
                refine.kernel_size,
                "0-9",
                Some(3),
            ));
        }
        if !refine.feather_radius.is_finite() || !(0.0..=100.0).contains(&refine.feather_radius) {
            return Err(RecolorError::config_value_error(
                "feather_radius",
                refine.feather_radius,
                "0-100",
                Some(2.0),
            ));
        }
        if let Some(t) = refine.mask_threshold {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(RecolorError::config_value_error(
                    "mask_threshold",
                    t,
                    "0.0-1.0",
                    Some(0.5),
                ));
            }
        }

        if !self.shadow.value_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.shadow.value_threshold)
        {
            return Err(RecolorError::config_value_error(
                "shadow value_threshold",
                self.shadow.value_threshold,
                "0.0-1.0",
                Some(0.5),
            ));
        }

        if !self.recolor.strength.is_finite() || !(0.0..=1.0).contains(&self.recolor.strength) {
            return Err(RecolorError::config_value_error(
                "strength",
                self.recolor.strength,
                "0.0-1.0",
                Some(crate::types::DEFAULT_STRENGTH),
            ));
        }
        if !(0.0..=180.0).contains(&self.recolor.hue_tolerance_degrees) {
            return Err(RecolorError::config_value_error(
                "hue_tolerance_degrees",
                self.recolor.hue_tolerance_degrees,
                "0-180",
                Some(crate::types::DEFAULT_HUE_TOLERANCE),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(RecolorError::config_value_error(
                "min_confidence",
                self.detector.min_confidence,
                "0.0-1.0",
                Some(0.25),
            ));
        }

        Ok(())
    }

    /// Whether the model-guided strategy should be attempted at all
    #[must_use]
    pub fn wants_model(&self) -> bool {
        !self.segmenter.prefer_classical && self.segmenter.model_dir.is_some()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RecolorError::invalid_config(format!("{key}='{raw}': {e}"))),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RecolorError::invalid_config(format!(
            "{key}='{other}' is not a boolean"
        ))),
    }
}

/// Builder for `PipelineConfig`
///
/// Numeric setters clamp into their valid range; `build` validates the rest.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Longest side after loading (0 disables downsampling)
    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.loader.max_dimension = max_dimension;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.loader.max_upload_bytes = bytes.max(1);
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.segmenter.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn prefer_classical(mut self, prefer: bool) -> Self {
        self.config.segmenter.prefer_classical = prefer;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.segmenter.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.segmenter.intra_threads = threads;
        self
    }

    /// Graph-cut rounds, clamped to 1-50
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.segmenter.iterations = iterations.clamp(1, 50);
        self
    }

    /// Colour model components, clamped to 1-16
    #[must_use]
    pub fn gmm_components(mut self, components: usize) -> Self {
        self.config.segmenter.gmm_components = components.clamp(1, 16);
        self
    }

    #[must_use]
    pub fn seed_radius(mut self, radius: u32) -> Self {
        self.config.segmenter.seed_radius = radius;
        self
    }

    /// Morphology kernel, clamped to 0-9
    #[must_use]
    pub fn kernel_size(mut self, size: u32) -> Self {
        self.config.refine.kernel_size = size.min(9);
        self
    }

    #[must_use]
    pub fn morphology_iterations(mut self, close: u32, open: u32) -> Self {
        self.config.refine.close_iterations = close;
        self.config.refine.open_iterations = open;
        self
    }

    /// Feather radius, clamped to 0-100
    #[must_use]
    pub fn feather_radius(mut self, radius: f32) -> Self {
        self.config.refine.feather_radius = if radius.is_finite() {
            radius.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: Option<f32>) -> Self {
        self.config.refine.mask_threshold = threshold.map(|t| t.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn refine(mut self, refine: RefineConfig) -> Self {
        self.config.refine = refine;
        self
    }

    #[must_use]
    pub fn shadow(mut self, shadow: ShadowConfig) -> Self {
        self.config.shadow = shadow;
        self
    }

    /// Default recolor strength, clamped to 0-1
    #[must_use]
    pub fn strength(mut self, strength: f32) -> Self {
        self.config.recolor.strength = strength.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.export.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn write_metadata(mut self, write: bool) -> Self {
        self.config.export.write_metadata = write;
        self
    }

    #[must_use]
    pub fn detector_enabled(mut self, enabled: bool) -> Self {
        self.config.detector.enabled = enabled;
        self
    }

    #[must_use]
    pub fn max_concurrent_edits(mut self, limit: usize) -> Self {
        self.config.concurrency.max_concurrent_edits = limit;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
