//! Mask refinement: threshold, closing, opening, Gaussian feather
//!
//! Structuring elements are elliptical and odd-sized. Morphology runs on an
//! 8-bit copy of the mask and ignores pixels outside the image; the Gaussian
//! replicates the border pixel.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::color::hsv_value;
use crate::config::{RefineConfig, ShadowConfig};
use crate::error::Result;
use crate::types::{Mask, Raster};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{self, grayscale_dilate, grayscale_erode};
use tracing::debug;

const MAX_KERNEL: u32 = 9;

/// Applies a fixed [`RefineConfig`] to masks
#[derive(Debug, Clone, Default)]
pub struct Refiner {
    config: RefineConfig,
}

impl Refiner {
    #[must_use]
    pub fn new(config: RefineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Refine a mask; dimensions are preserved and values stay in [0, 1]
    pub fn refine(&self, mask: &Mask) -> Result<Mask> {
        refine_mask(mask, &self.config)
    }
}

/// Effective kernel side: 0 disables morphology, otherwise odd and at most 9
#[must_use]
pub fn effective_kernel_size(size: u32) -> u32 {
    if size == 0 {
        0
    } else {
        (size | 1).min(MAX_KERNEL)
    }
}

/// Offsets of an elliptical structuring element of the given odd size
#[must_use]
pub fn elliptical_kernel(size: u32) -> Vec<(i32, i32)> {
    let size = effective_kernel_size(size).max(1) as i32;
    let r = size / 2;
    if r == 0 {
        return vec![(0, 0)];
    }
    let inv_r2 = 1.0 / f64::from(r * r);
    let mut offsets = Vec::new();
    for dy in -r..=r {
        let dx = (f64::from(r) * (f64::from(r * r - dy * dy) * inv_r2).sqrt()).round() as i32;
        for x in (-dx).max(-r)..=dx.min(r) {
            offsets.push((x, dy));
        }
    }
    offsets
}

fn structuring_element(kernel_size: u32) -> morphology::Mask {
    let side = effective_kernel_size(kernel_size).max(1);
    let r = (side / 2) as i32;
    let mut footprint = GrayImage::new(side, side);
    for (dx, dy) in elliptical_kernel(side) {
        footprint.put_pixel((dx + r) as u32, (dy + r) as u32, Luma([255]));
    }
    morphology::Mask::from_image(&footprint, r as u8, r as u8)
}

fn to_gray(mask: &Mask) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(mask.get(x, y).unwrap_or(0.0) * 255.0).round() as u8])
    })
}

fn from_gray(image: &GrayImage) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        f32::from(image.get_pixel(x, y)[0]) / 255.0
    })
}

fn repeat(mut image: GrayImage, element: &morphology::Mask, dilate: bool, times: u32) -> GrayImage {
    for _ in 0..times {
        image = if dilate {
            grayscale_dilate(&image, element)
        } else {
            grayscale_erode(&image, element)
        };
    }
    image
}

/// Morphological closing: dilate `iterations` times, then erode as often
#[must_use]
pub fn close(mask: &Mask, kernel_size: u32, iterations: u32) -> Mask {
    let element = structuring_element(kernel_size);
    let dilated = repeat(to_gray(mask), &element, true, iterations);
    from_gray(&repeat(dilated, &element, false, iterations))
}

/// Morphological opening: erode `iterations` times, then dilate as often
#[must_use]
pub fn open(mask: &Mask, kernel_size: u32, iterations: u32) -> Mask {
    let element = structuring_element(kernel_size);
    let eroded = repeat(to_gray(mask), &element, false, iterations);
    from_gray(&repeat(eroded, &element, true, iterations))
}

/// Gaussian blur with sigma = max(0.5, radius); radius 0 is the identity
#[must_use]
pub fn feather(mask: &Mask, radius: f32) -> Mask {
    if radius <= 0.0 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let plane: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width, height, |x, y| Luma([mask.get(x, y).unwrap_or(0.0)]));
    let blurred = gaussian_blur_f32(&plane, radius.max(0.5));
    Mask::from_fn(width, height, |x, y| blurred.get_pixel(x, y)[0].clamp(0.0, 1.0))
}

/// Threshold (when morphology runs), close, open, feather
pub fn refine_mask(mask: &Mask, config: &RefineConfig) -> Result<Mask> {
    let kernel = effective_kernel_size(config.kernel_size);
    let morphology = kernel > 0 && (config.close_iterations > 0 || config.open_iterations > 0);

    let mut current = mask.clone();
    if morphology {
        if let Some(threshold) = config.mask_threshold {
            current = current.binarize(threshold);
        }
        if config.close_iterations > 0 {
            current = close(&current, kernel, config.close_iterations);
        }
        if config.open_iterations > 0 {
            current = open(&current, kernel, config.open_iterations);
        }
    }
    if config.feather_radius > 0.0 {
        current = feather(&current, config.feather_radius);
    }

    debug!(
        kernel,
        close = config.close_iterations,
        open = config.open_iterations,
        feather = config.feather_radius,
        coverage = current.coverage(),
        "mask refined"
    );
    Ok(current)
}

/// Grow a mask into adjacent dark pixels (cast shadows)
///
/// Pixels within `dilation_px` of the mask whose HSV value is below
/// `value_threshold` are added at full strength. Existing coverage is kept.
#[must_use]
pub fn expand_mask_to_include_shadow(
    raster: &Raster,
    mask: &Mask,
    dilation_px: u32,
    value_threshold: f32,
) -> Mask {
    let (width, height) = mask.dimensions();
    if dilation_px == 0 || raster.dimensions() != mask.dimensions() {
        return mask.clone();
    }
    let seeds = GrayImage::from_fn(width, height, |x, y| {
        Luma([if mask.get(x, y).unwrap_or(0.0) >= 0.5 { 255 } else { 0 }])
    });
    let distance_sq = euclidean_squared_distance_transform(&seeds);

    let limit_sq = f64::from(dilation_px).powi(2);
    let mut added = 0usize;
    let expanded = Mask::from_fn(width, height, |x, y| {
        let d = distance_sq.get_pixel(x, y)[0];
        if d > 0.0 && d <= limit_sq {
            if let Some(p) = raster.get_pixel(x, y) {
                if hsv_value([p[0], p[1], p[2]]) < value_threshold {
                    added += 1;
                    return 1.0;
                }
            }
        }
        mask.get(x, y).unwrap_or(0.0)
    });
    debug!(added, dilation_px, "shadow pixels added to mask");
    expanded
}

/// Shadow expansion driven by configuration; disabled returns the mask unchanged
#[must_use]
pub fn apply_shadow(raster: &Raster, mask: &Mask, config: &ShadowConfig) -> Mask {
    if config.enabled {
        expand_mask_to_include_shadow(raster, mask, config.dilation_px, config.value_threshold)
    } else {
        mask.clone()
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use image::Rgba;

    fn square_mask(size: u32, lo: u32, hi: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_kernel_shapes_match_ellipse() {
        assert_eq!(elliptical_kernel(1), vec![(0, 0)]);
        // 3x3 ellipse is a cross
        let k3 = elliptical_kernel(3);
        assert_eq!(k3.len(), 5);
        assert!(!k3.contains(&(1, 1)));
        // 5x5 drops only the four corners' neighbours on the top/bottom rows
        let k5 = elliptical_kernel(5);
        assert_eq!(k5.len(), 17);
        assert!(k5.contains(&(0, -2)));
        assert!(!k5.contains(&(1, -2)));
        assert!(k5.contains(&(2, -1)));
    }

    #[test]
    fn test_kernel_size_normalisation() {
        assert_eq!(effective_kernel_size(0), 0);
        assert_eq!(effective_kernel_size(2), 3);
        assert_eq!(effective_kernel_size(4), 5);
        assert_eq!(effective_kernel_size(9), 9);
        assert_eq!(effective_kernel_size(40), 9);
    }

    #[test]
    fn test_identity_config_leaves_mask_unchanged() {
        let mask = Mask::from_fn(16, 12, |x, y| ((x * 7 + y * 3) % 11) as f32 / 10.0);
        let refined = refine_mask(&mask, &RefineConfig::identity()).unwrap();
        assert_eq!(refined, mask);
    }

    #[test]
    fn test_structuring_element_follows_ellipse() {
        assert_eq!(structuring_element(3), morphology::Mask::diamond(1));
        assert_eq!(structuring_element(1), morphology::Mask::square(0));
        let k5 = GrayImage::from_fn(5, 5, |x, y| {
            let inside = elliptical_kernel(5).contains(&(x as i32 - 2, y as i32 - 2));
            Luma([if inside { 255 } else { 0 }])
        });
        assert_eq!(structuring_element(5), morphology::Mask::from_image(&k5, 2, 2));
    }

    #[test]
    fn test_morphology_keeps_soft_values_within_quantisation() {
        let mask = Mask::filled(12, 12, 0.4);
        let closed = close(&mask, 5, 2);
        assert!(closed.as_slice().iter().all(|v| (*v - 0.4).abs() <= 1.0 / 255.0));
    }

    #[test]
    fn test_closing_fills_pinhole() {
        let mut mask = square_mask(20, 4, 16).into_vec();
        mask[10 * 20 + 10] = 0.0;
        let mask = Mask::new(20, 20, mask).unwrap();
        let closed = close(&mask, 3, 1);
        assert_eq!(closed.get(10, 10), Some(1.0));
        assert_eq!(closed.get(0, 0), Some(0.0));
    }

    #[test]
    fn test_opening_removes_speck() {
        let mut values = square_mask(20, 4, 16).into_vec();
        values[20 + 18] = 1.0;
        let mask = Mask::new(20, 20, values).unwrap();
        let opened = open(&mask, 3, 1);
        assert_eq!(opened.get(18, 1), Some(0.0));
        assert_eq!(opened.get(10, 10), Some(1.0));
    }

    #[test]
    fn test_feather_softens_edges_within_range() {
        let mask = square_mask(40, 8, 32);
        let soft = feather(&mask, 3.0);
        assert_eq!(soft.dimensions(), (40, 40));
        assert!(soft.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        let edge = soft.get(8, 20).unwrap();
        assert!(edge > 0.2 && edge < 0.8, "edge value {edge}");
        assert!(soft.get(20, 20).unwrap() > 0.95);
        assert!(soft.get(0, 0).unwrap() < 0.01);
    }

    #[test]
    fn test_feather_preserves_uniform_mask() {
        let mask = Mask::filled(7, 5, 1.0);
        let soft = feather(&mask, 2.0);
        assert!(soft.as_slice().iter().all(|v| (*v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_threshold_applies_before_morphology() {
        let mask = Mask::filled(9, 9, 0.6);
        let config = RefineConfig {
            feather_radius: 0.0,
            ..RefineConfig::default()
        };
        let refined = refine_mask(&mask, &config).unwrap();
        assert!(refined.as_slice().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_shadow_expansion_adds_dark_ring_only() {
        // object in the middle, dark shadow to its right, bright floor elsewhere
        let raster = Raster::from_fn(40, 20, |x, _| {
            if (22..30).contains(&x) {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([220, 220, 220, 255])
            }
        });
        let mask = Mask::from_fn(40, 20, |x, y| {
            if (12..22).contains(&x) && (5..15).contains(&y) {
                1.0
            } else {
                0.0
            }
        });
        let expanded = expand_mask_to_include_shadow(&raster, &mask, 5, 0.5);
        assert_eq!(expanded.get(24, 10), Some(1.0));
        assert_eq!(expanded.get(29, 10), Some(0.0), "beyond the dilation radius");
        assert_eq!(expanded.get(8, 10), Some(0.0), "bright pixels are not shadow");
        assert_eq!(expanded.get(15, 10), Some(1.0));
    }

    #[test]
    fn test_shadow_expansion_of_empty_mask_adds_nothing() {
        let raster = Raster::filled(12, 8, [5, 5, 5, 255]);
        let empty = Mask::filled(12, 8, 0.0);
        assert_eq!(expand_mask_to_include_shadow(&raster, &empty, 4, 0.5), empty);
    }

    #[test]
    fn test_shadow_disabled_is_identity() {
        let raster = Raster::filled(10, 10, [0, 0, 0, 255]);
        let mask = square_mask(10, 3, 6);
        assert_eq!(apply_shadow(&raster, &mask, &ShadowConfig::default()), mask);
        assert_eq!(expand_mask_to_include_shadow(&raster, &mask, 0, 0.5), mask);
    }
}
