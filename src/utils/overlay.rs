//! Preview overlays for selection UIs
//!
//! Draws detection boxes and prompt points onto a copy of a raster. The
//! source raster is never modified.

use crate::detect::Detection;
use crate::types::{BoundingBox, PromptLabel, PromptSet, Raster};
use image::Rgba;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const DEFAULT_COLOR: Rgba<u8> = Rgba([255, 200, 0, 255]);
const FOREGROUND_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const BACKGROUND_COLOR: Rgba<u8> = Rgba([220, 0, 0, 255]);

/// Overlay styling
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub thickness: u32,
    pub point_radius: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            point_radius: 4,
        }
    }
}

fn draw_box(canvas: &mut image::RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    for inset in 0..thickness {
        let w = bbox.width().saturating_sub(2 * inset);
        let h = bbox.height().saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let (Ok(x), Ok(y)) = (i32::try_from(bbox.x_min + inset), i32::try_from(bbox.y_min + inset))
        else {
            break;
        };
        if bbox.x_min + inset >= width || bbox.y_min + inset >= height {
            break;
        }
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
    }
}

/// Draw detection boxes, highlighting one of them
///
/// Boxes are drawn inside their extent so the outline never leaves the raster.
#[must_use]
pub fn draw_detections(
    raster: &Raster,
    detections: &[Detection],
    highlight: Option<usize>,
    style: OverlayStyle,
) -> Raster {
    let mut canvas = raster.as_image().clone();
    for (i, detection) in detections.iter().enumerate() {
        let color = if highlight == Some(i) {
            HIGHLIGHT_COLOR
        } else {
            DEFAULT_COLOR
        };
        draw_box(&mut canvas, &detection.bbox, color, style.thickness.max(1));
    }
    Raster::new(canvas)
}

/// Draw point prompts (green foreground, red background) and an optional box
#[must_use]
pub fn draw_prompts(
    raster: &Raster,
    points: &PromptSet,
    bbox: Option<&BoundingBox>,
    style: OverlayStyle,
) -> Raster {
    let mut canvas = raster.as_image().clone();
    if let Some(bbox) = bbox {
        draw_box(&mut canvas, bbox, HIGHLIGHT_COLOR, style.thickness.max(1));
    }
    for point in points.iter() {
        let color = match point.label {
            PromptLabel::Foreground => FOREGROUND_COLOR,
            PromptLabel::Background => BACKGROUND_COLOR,
        };
        if let (Ok(x), Ok(y)) = (i32::try_from(point.x), i32::try_from(point.y)) {
            draw_filled_circle_mut(&mut canvas, (x, y), style.point_radius.max(1), color);
        }
    }
    Raster::new(canvas)
}
