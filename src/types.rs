//! Core types flowing through the edit pipeline
//!
//! Every artifact here is immutable once constructed: stages consume a
//! reference to the previous artifact and produce a new owned one.

use crate::{
    color::RgbColor,
    config::RefineConfig,
    error::{RecolorError, Result},
};
use chrono::{DateTime, Utc};
use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Immutable RGBA8 pixel grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    image: RgbaImage,
}

impl Raster {
    /// Wrap an owned RGBA buffer
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Build a raster from raw RGBA bytes
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RecolorError::processing(format!(
                "RGBA buffer has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        ImageBuffer::from_raw(width, height, data)
            .map(Self::new)
            .ok_or_else(|| RecolorError::internal("RGBA buffer rejected by image crate"))
    }

    /// Raster of a single colour
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(ImageBuffer::from_pixel(width, height, Rgba(rgba)))
    }

    /// Raster computed pixel by pixel
    #[must_use]
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: FnMut(u32, u32) -> Rgba<u8>,
    {
        Self::new(ImageBuffer::from_fn(width, height, f))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// RGBA value at (x, y), `None` outside the grid
    #[must_use]
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Row-major RGBA pixels
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.image.pixels().map(|p| p.0)
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Encode losslessly as PNG
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// Per-pixel selection probability in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Mask {
    /// Create a mask from row-major values
    ///
    /// # Errors
    /// - Length does not equal `width * height`
    /// - Any value is non-finite or outside [0, 1]
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(RecolorError::processing(format!(
                "mask has {} values, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        if let Some(bad) = data
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(RecolorError::processing(format!(
                "mask value {bad} outside [0, 1]"
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Mask computed pixel by pixel; values are clamped into [0, 1] and NaN maps to 0
    #[must_use]
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> f32,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(sanitize(f(x, y)));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build from unchecked values, clamping into [0, 1]
    pub(crate) fn from_vec_clamped(width: u32, height: u32, mut data: Vec<f32>) -> Result<Self> {
        for v in &mut data {
            *v = sanitize(*v);
        }
        Self::new(width, height, data)
    }

    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![sanitize(value); width as usize * height as usize],
        }
    }

    /// Greyscale preview back into a mask (0 -> 0.0, 255 -> 1.0)
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image.as_raw().iter().map(|v| f32::from(*v) / 255.0).collect();
        Self {
            width,
            height,
            data,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Value at (x, y), `None` outside the grid
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Row-major values
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Values strictly above `threshold` become 1.0, everything else 0.0
    #[must_use]
    pub fn binarize(&self, threshold: f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .map(|v| if *v > threshold { 1.0 } else { 0.0 })
                .collect(),
        }
    }

    /// Whether every value is exactly 0.0 or 1.0
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0 || *v == 1.0)
    }

    /// Number of pixels with value >= `threshold`
    #[must_use]
    pub fn count_at_least(&self, threshold: f32) -> usize {
        self.data.iter().filter(|v| **v >= threshold).count()
    }

    /// Mean selection value over the grid
    #[must_use]
    pub fn coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|v| f64::from(*v)).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Greyscale preview (0.0 -> 0, 1.0 -> 255)
    #[must_use]
    pub fn to_preview(&self) -> GrayImage {
        let data = self
            .data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.count_at_least(0.5);
        let ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };
        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio: ratio,
            mean: self.coverage(),
        }
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub mean: f32,
}

/// Whether a point marks the object or its surroundings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLabel {
    Foreground,
    Background,
}

/// A single user click in raster coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointPrompt {
    pub x: u32,
    pub y: u32,
    pub label: PromptLabel,
}

impl PointPrompt {
    #[must_use]
    pub fn foreground(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            label: PromptLabel::Foreground,
        }
    }

    #[must_use]
    pub fn background(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            label: PromptLabel::Background,
        }
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.label == PromptLabel::Foreground
    }

    #[must_use]
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x < width && self.y < height
    }
}

/// Ordered collection of point prompts
///
/// Insertion order is preserved for display; it does not influence results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptSet(Vec<PointPrompt>);

impl PromptSet {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, prompt: PointPrompt) {
        self.0.push(prompt);
    }

    /// Builder-style push
    #[must_use]
    pub fn with(mut self, prompt: PointPrompt) -> Self {
        self.0.push(prompt);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointPrompt> {
        self.0.iter()
    }

    pub fn foreground(&self) -> impl Iterator<Item = &PointPrompt> {
        self.0.iter().filter(|p| p.is_foreground())
    }

    pub fn background(&self) -> impl Iterator<Item = &PointPrompt> {
        self.0.iter().filter(|p| !p.is_foreground())
    }

    #[must_use]
    pub fn has_foreground(&self) -> bool {
        self.0.iter().any(PointPrompt::is_foreground)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[PointPrompt] {
        &self.0
    }

    /// Reject the first point that lies outside a `width` x `height` raster
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        match self.0.iter().find(|p| !p.is_within(width, height)) {
            Some(p) => Err(RecolorError::PromptOutOfBounds {
                x: p.x,
                y: p.y,
                width,
                height,
            }),
            None => Ok(()),
        }
    }
}

impl FromIterator<PointPrompt> for PromptSet {
    fn from_iter<I: IntoIterator<Item = PointPrompt>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PromptSet {
    type Item = PointPrompt;
    type IntoIter = std::vec::IntoIter<PointPrompt>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Axis-aligned box in raster pixels; `x_max`/`y_max` are exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl BoundingBox {
    /// Create a box, rejecting degenerate extents
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Result<Self> {
        if x_min >= x_max || y_min >= y_max {
            return Err(RecolorError::invalid_bbox(format!(
                "({x_min}, {y_min}, {x_max}, {y_max}) needs x_min < x_max and y_min < y_max"
            )));
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
            label: None,
            confidence: None,
        })
    }

    /// Box from percentages (0-100) of a `width` x `height` raster
    ///
    /// Edges are rounded to the nearest pixel and clamped so the box is at
    /// least one pixel wide and high.
    pub fn from_percent(
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RecolorError::invalid_bbox("raster has no pixels"));
        }
        if [left, top, right, bottom].iter().any(|v| !v.is_finite()) {
            return Err(RecolorError::invalid_bbox("percentages must be finite"));
        }
        if left >= right || top >= bottom {
            return Err(RecolorError::invalid_bbox(format!(
                "left ({left}) must be < right ({right}) and top ({top}) < bottom ({bottom})"
            )));
        }

        let to_px = |pct: f32, extent: u32| -> i64 { (pct / 100.0 * extent as f32).round() as i64 };
        let (w, h) = (i64::from(width), i64::from(height));

        let x = to_px(left, width).clamp(0, w - 1);
        let y = to_px(top, height).clamp(0, h - 1);
        let x2 = to_px(right, width).min(w).max(x + 1);
        let y2 = to_px(bottom, height).min(h).max(y + 1);

        // Values are within [0, dimension] after clamping
        Self::new(x as u32, y as u32, x2 as u32, y2 as u32)
    }

    #[must_use]
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        });
        self
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }

    /// Check ordering and containment in a `width` x `height` raster
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(RecolorError::invalid_bbox(format!(
                "({}, {}, {}, {}) is degenerate",
                self.x_min, self.y_min, self.x_max, self.y_max
            )));
        }
        if self.x_max > width || self.y_max > height {
            return Err(RecolorError::invalid_bbox(format!(
                "({}, {}, {}, {}) exceeds {width}x{height} raster",
                self.x_min, self.y_min, self.x_max, self.y_max
            )));
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(RecolorError::invalid_bbox(format!(
                    "confidence {c} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// What the user pointed at: clicks, a box, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationPrompt {
    #[serde(default)]
    pub points: PromptSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl SegmentationPrompt {
    #[must_use]
    pub fn from_points(points: PromptSet) -> Self {
        Self { points, bbox: None }
    }

    #[must_use]
    pub fn from_box(bbox: BoundingBox) -> Self {
        Self {
            points: PromptSet::new(),
            bbox: Some(bbox),
        }
    }

    #[must_use]
    pub fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// At least one foreground point or a box
    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        self.bbox.is_some() || self.points.has_foreground()
    }

    /// Full validation against a `width` x `height` raster
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        if !self.is_sufficient() {
            return Err(RecolorError::insufficient_prompts(
                "at least one foreground point or a bounding box is required",
            ));
        }
        if let Some(bbox) = &self.bbox {
            bbox.validate_within(width, height)?;
        }
        self.points.validate_within(width, height)
    }
}

/// How to recolor the selected region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecolorSpec {
    pub target: RgbColor,
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Multiplier on the target chroma, in [0, 2]
    #[serde(default = "default_chroma_scale")]
    pub chroma_scale: f32,
    /// Only recolor pixels whose hue is close to this colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_color: Option<RgbColor>,
    #[serde(default = "default_hue_tolerance")]
    pub hue_tolerance_degrees: f32,
}

pub(crate) const DEFAULT_STRENGTH: f32 = 0.8;
pub(crate) const DEFAULT_HUE_TOLERANCE: f32 = 25.0;

fn default_strength() -> f32 {
    DEFAULT_STRENGTH
}

fn default_chroma_scale() -> f32 {
    1.0
}

fn default_hue_tolerance() -> f32 {
    DEFAULT_HUE_TOLERANCE
}

impl RecolorSpec {
    #[must_use]
    pub fn new(target: RgbColor) -> Self {
        Self {
            target,
            strength: DEFAULT_STRENGTH,
            chroma_scale: 1.0,
            source_color: None,
            hue_tolerance_degrees: DEFAULT_HUE_TOLERANCE,
        }
    }

    /// Parse the target from a hex or CSS colour string
    pub fn parse(target: &str) -> Result<Self> {
        Ok(Self::new(RgbColor::parse(target)?))
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    #[must_use]
    pub fn with_chroma_scale(mut self, chroma_scale: f32) -> Self {
        self.chroma_scale = chroma_scale;
        self
    }

    #[must_use]
    pub fn with_source_color(mut self, source: RgbColor, tolerance_degrees: f32) -> Self {
        self.source_color = Some(source);
        self.hue_tolerance_degrees = tolerance_degrees;
        self
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return Err(RecolorError::config_value_error(
                "strength",
                self.strength,
                "0.0-1.0",
                Some(DEFAULT_STRENGTH),
            ));
        }
        if !self.chroma_scale.is_finite() || !(0.0..=2.0).contains(&self.chroma_scale) {
            return Err(RecolorError::config_value_error(
                "chroma_scale",
                self.chroma_scale,
                "0.0-2.0",
                Some(1.0),
            ));
        }
        if !self.hue_tolerance_degrees.is_finite()
            || !(0.0..=180.0).contains(&self.hue_tolerance_degrees)
        {
            return Err(RecolorError::config_value_error(
                "hue_tolerance_degrees",
                self.hue_tolerance_degrees,
                "0-180",
                Some(DEFAULT_HUE_TOLERANCE),
            ));
        }
        Ok(())
    }
}

/// Segmentation strategy that produced a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    ModelGuided,
    Classical,
    ClassicalBox,
}

impl SegmentationMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelGuided => "model_guided",
            Self::Classical => "classical",
            Self::ClassicalBox => "classical_box",
        }
    }
}

impl std::fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the optional detection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// No text query was supplied
    #[default]
    NotRequested,
    /// Detector disabled or failed; treated as no detections
    Unavailable,
    /// Detector ran and returned no usable box
    NoMatch,
    /// A detection supplied the bounding box
    Detected,
}

/// Per-stage wall-clock timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call in the process only)
    pub model_load_ms: u64,
    pub decode_ms: u64,
    pub detection_ms: u64,
    pub segmentation_ms: u64,
    pub refine_ms: u64,
    pub recolor_ms: u64,
    /// Filled in once the result has been exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_ms: Option<u64>,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of total time spent segmenting
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.model_load_ms
            + self.decode_ms
            + self.detection_ms
            + self.segmentation_ms
            + self.refine_ms
            + self.recolor_ms;
        self.total_ms.saturating_sub(measured)
    }
}

/// Counts of the prompts that drove segmentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub foreground_points: usize,
    pub background_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl From<&SegmentationPrompt> for PromptSummary {
    fn from(prompt: &SegmentationPrompt) -> Self {
        Self {
            foreground_points: prompt.points.foreground().count(),
            background_points: prompt.points.background().count(),
            bbox: prompt.bbox.clone(),
        }
    }
}

/// Record of how an edit was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditMetadata {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    /// Text query or detection label of the edited object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_object: Option<String>,
    pub color_hex: String,
    pub strength: f32,
    pub chroma_scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_color_hex: Option<String>,
    pub detection_mode: DetectionMode,
    pub segmentation_mode: SegmentationMode,
    pub prompts: PromptSummary,
    pub refine: RefineConfig,
    pub shadow_expanded: bool,
    /// Decoded size before any downsampling
    pub source_dimensions: (u32, u32),
    /// Size the pipeline worked at
    pub processed_dimensions: (u32, u32),
    pub mask_coverage: f32,
    #[serde(rename = "timings_ms")]
    pub timings: ProcessingTimings,
}

/// Recolored raster, the mask used, and how they were produced
#[derive(Debug, Clone)]
pub struct EditResult {
    raster: Raster,
    mask: Mask,
    metadata: EditMetadata,
}

impl EditResult {
    /// Assemble a result; the mask must match the raster dimensions
    pub fn new(raster: Raster, mask: Mask, metadata: EditMetadata) -> Result<Self> {
        if raster.dimensions() != mask.dimensions() {
            return Err(RecolorError::internal(format!(
                "mask {:?} does not match raster {:?}",
                mask.dimensions(),
                raster.dimensions()
            )));
        }
        Ok(Self {
            raster,
            mask,
            metadata,
        })
    }

    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[must_use]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    #[must_use]
    pub fn metadata(&self) -> &EditMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// The same result with its export time recorded
    #[must_use]
    pub fn with_export_ms(mut self, export_ms: u64) -> Self {
        self.metadata.timings.export_ms = Some(export_ms);
        self
    }

    /// Human-readable one-liner for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        format!(
            "total {}ms (decode {}ms, detect {}ms, segment {}ms [{}], refine {}ms, recolor {}ms)",
            t.total_ms,
            t.decode_ms,
            t.detection_ms,
            t.segmentation_ms,
            self.metadata.segmentation_mode,
            t.refine_ms,
            t.recolor_ms
        )
    }
}
