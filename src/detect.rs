//! Optional text-query object detection
//!
//! Detection is a pluggable capability. A missing, disabled or failing
//! detector yields an empty list tagged [`DetectionMode::Unavailable`];
//! it never fails the request.

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::types::{BoundingBox, DetectionMode, Raster};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    #[must_use]
    pub fn new<S: Into<String>>(bbox: BoundingBox, label: S, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence,
        }
    }

    /// The box carrying this detection's label and confidence
    #[must_use]
    pub fn labelled_box(&self) -> BoundingBox {
        self.bbox
            .clone()
            .with_label(self.label.clone())
            .with_confidence(self.confidence)
    }
}

/// Detection capability implemented by external classifiers
pub trait ObjectDetector: Send + Sync + std::fmt::Debug {
    /// Detect objects matching `query`; order and filtering are normalised by the caller
    ///
    /// # Errors
    /// Any failure; callers treat it as "no detections".
    fn detect(&self, raster: &Raster, query: &str) -> Result<Vec<Detection>>;

    fn name(&self) -> &'static str;
}

/// Detector answering from a fixed list, matching labels case-insensitively
#[derive(Debug, Clone, Default)]
pub struct PrecomputedDetector {
    detections: Vec<Detection>,
}

impl PrecomputedDetector {
    #[must_use]
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl ObjectDetector for PrecomputedDetector {
    fn detect(&self, _raster: &Raster, query: &str) -> Result<Vec<Detection>> {
        let query = query.trim().to_lowercase();
        Ok(self
            .detections
            .iter()
            .filter(|d| d.label.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "precomputed"
    }
}

/// Detections plus how they were obtained
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub detections: Vec<Detection>,
    pub mode: DetectionMode,
}

impl DetectionReport {
    /// Highest-confidence detection
    #[must_use]
    pub fn best(&self) -> Option<&Detection> {
        self.detections.first()
    }
}

/// Wraps an optional detector with filtering and ordering
#[derive(Debug, Clone, Default)]
pub struct Detector {
    inner: Option<Arc<dyn ObjectDetector>>,
    config: DetectorConfig,
}

impl Detector {
    /// No detection capability
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(detector: Arc<dyn ObjectDetector>, config: DetectorConfig) -> Self {
        Self {
            inner: Some(detector),
            config,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.inner.is_some()
    }

    /// Run detection for a query
    ///
    /// Results are clipped to the raster, filtered by `min_confidence` and
    /// sorted by descending confidence.
    #[must_use]
    pub fn detect(&self, raster: &Raster, query: &str) -> DetectionReport {
        if query.trim().is_empty() {
            return DetectionReport::default();
        }
        let unavailable = DetectionReport {
            detections: Vec::new(),
            mode: DetectionMode::Unavailable,
        };
        let Some(detector) = self.inner.as_ref().filter(|_| self.config.enabled) else {
            debug!(query, "no detector configured");
            return unavailable;
        };

        let raw = match detector.detect(raster, query) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(detector = detector.name(), error = %e, "detection failed");
                return unavailable;
            },
        };

        let (width, height) = raster.dimensions();
        let mut detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.config.min_confidence)
            .filter_map(|d| {
                let bbox = &d.bbox;
                let clipped = BoundingBox::new(
                    bbox.x_min.min(width),
                    bbox.y_min.min(height),
                    bbox.x_max.min(width),
                    bbox.y_max.min(height),
                )
                .ok()?;
                Some(Detection {
                    bbox: clipped,
                    label: d.label,
                    confidence: d.confidence.clamp(0.0, 1.0),
                })
            })
            .collect();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mode = if detections.is_empty() {
            DetectionMode::NoMatch
        } else {
            DetectionMode::Detected
        };
        debug!(query, count = detections.len(), ?mode, "detection complete");
        DetectionReport { detections, mode }
    }
}
