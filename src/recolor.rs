//! Luminance-preserving recolor in CIE L*a*b* (D65)
//!
//! Each pixel keeps its L*; a*/b* move toward the target by
//! `mask * strength`. Chroma that falls outside sRGB is pulled back toward
//! the neutral axis at constant L* before quantising.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::color::{
    hue_distance, hue_saturation, in_gamut, lab_to_unit_rgb, rgb_to_lab, unit_rgb_to_u8,
};
use crate::error::{RecolorError, Result};
use crate::types::{Mask, Raster, RecolorSpec};
use image::{ImageBuffer, Rgba};
use palette::Lab;
use tracing::debug;

/// Pixels below this HSV saturation have no meaningful hue for gating
const MIN_GATING_SATURATION: f32 = 0.1;
const GAMUT_BISECTION_STEPS: u32 = 16;

/// Applies a [`RecolorSpec`] through a mask
#[derive(Debug, Clone, Copy, Default)]
pub struct Recolorer;

impl Recolorer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Produce a recolored copy of `raster`
    ///
    /// # Errors
    /// - Mask dimensions differ from the raster
    /// - Invalid spec parameters
    pub fn recolor(&self, raster: &Raster, mask: &Mask, spec: &RecolorSpec) -> Result<Raster> {
        recolor(raster, mask, spec)
    }
}

/// Map L*a*b* to unit sRGB, shrinking chroma at constant L* until it fits
fn gamut_map(l: f32, a: f32, b: f32) -> [f32; 3] {
    let direct = lab_to_unit_rgb(Lab::new(l, a, b));
    if in_gamut(direct) {
        return direct;
    }
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..GAMUT_BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if in_gamut(lab_to_unit_rgb(Lab::new(l, a * mid, b * mid))) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lab_to_unit_rgb(Lab::new(l, a * lo, b * lo))
}

/// Recolor `raster` where `mask` is non-zero
///
/// Pixels with zero effective weight are copied byte for byte; alpha is
/// always copied.
pub fn recolor(raster: &Raster, mask: &Mask, spec: &RecolorSpec) -> Result<Raster> {
    if raster.dimensions() != mask.dimensions() {
        return Err(RecolorError::processing_stage_error(
            "recolor",
            &format!(
                "mask {:?} does not match raster {:?}",
                mask.dimensions(),
                raster.dimensions()
            ),
            None,
        ));
    }
    spec.validate()?;

    let target = spec.target.to_lab();
    let (target_a, target_b) = (target.a * spec.chroma_scale, target.b * spec.chroma_scale);
    let gate = spec
        .source_color
        .map(|c| (c.hue_saturation().0, spec.hue_tolerance_degrees));

    let (width, height) = raster.dimensions();
    let weights = mask.as_slice();
    let mut changed = 0usize;

    let out = ImageBuffer::from_fn(width, height, |x, y| {
        let src = raster.as_image().get_pixel(x, y).0;
        let idx = y as usize * width as usize + x as usize;
        let mut w = weights.get(idx).copied().unwrap_or(0.0) * spec.strength;

        if w > 0.0 {
            if let Some((source_hue, tolerance)) = gate {
                let (hue, saturation) = hue_saturation([src[0], src[1], src[2]]);
                if saturation < MIN_GATING_SATURATION || hue_distance(hue, source_hue) > tolerance {
                    w = 0.0;
                }
            }
        }
        if w <= 0.0 {
            return Rgba(src);
        }

        let lab = rgb_to_lab([src[0], src[1], src[2]]);
        let a = lab.a + (target_a - lab.a) * w;
        let b = lab.b + (target_b - lab.b) * w;
        let [r, g, bl] = unit_rgb_to_u8(gamut_map(lab.l, a, b));
        changed += 1;
        Rgba([r, g, bl, src[3]])
    });

    debug!(
        changed,
        total = raster.pixel_count(),
        target = %spec.target,
        strength = spec.strength,
        "recolor applied"
    );
    Ok(Raster::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RgbColor;

    fn gradient() -> Raster {
        Raster::from_fn(32, 16, |x, y| {
            Rgba([(x * 8) as u8, (y * 16) as u8, 128, (x * 4 + y) as u8])
        })
    }

    fn red() -> RecolorSpec {
        RecolorSpec::new(RgbColor::new(255, 0, 0)).with_strength(1.0)
    }

    #[test]
    fn test_strength_zero_is_identity() {
        let raster = gradient();
        let mask = Mask::filled(32, 16, 1.0);
        let spec = red().with_strength(0.0);
        let once = recolor(&raster, &mask, &spec).unwrap();
        let twice = recolor(&once, &mask, &spec).unwrap();
        assert_eq!(once, raster);
        assert_eq!(twice, raster);
    }

    #[test]
    fn test_zero_mask_pixels_are_untouched() {
        let raster = gradient();
        let mask = Mask::from_fn(32, 16, |x, _| if x < 16 { 0.0 } else { 1.0 });
        let out = recolor(&raster, &mask, &red()).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(out.get_pixel(x, y), raster.get_pixel(x, y));
            }
        }
        assert_ne!(out.get_pixel(20, 8), raster.get_pixel(20, 8));
    }

    #[test]
    fn test_alpha_always_preserved() {
        let raster = gradient();
        let mask = Mask::from_fn(32, 16, |x, y| ((x + y) % 5) as f32 / 4.0);
        let out = recolor(&raster, &mask, &red()).unwrap();
        for (a, b) in out.pixels().zip(raster.pixels()) {
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn test_grey_to_red_keeps_lightness() {
        let raster = Raster::from_fn(10, 10, |x, _| {
            let v = 60 + (x * 12) as u8;
            Rgba([v, v, v, 255])
        });
        let mask = Mask::filled(10, 10, 1.0);
        let out = recolor(&raster, &mask, &red()).unwrap();
        for (o, i) in out.pixels().zip(raster.pixels()) {
            let lo = rgb_to_lab([o[0], o[1], o[2]]);
            let li = rgb_to_lab([i[0], i[1], i[2]]);
            assert!((lo.l - li.l).abs() < 1.5, "L* {} vs {}", lo.l, li.l);
            assert!(o[0] > o[1] && o[0] > o[2], "not red: {o:?}");
            assert!(lo.a > 10.0);
        }
    }

    #[test]
    fn test_hue_gating_limits_edit_to_source_colour() {
        // left half blue, right half green
        let raster = Raster::from_fn(20, 4, |x, _| {
            if x < 10 {
                Rgba([30, 60, 200, 255])
            } else {
                Rgba([40, 180, 50, 255])
            }
        });
        let mask = Mask::filled(20, 4, 1.0);
        let spec = red().with_source_color(RgbColor::new(0, 0, 255), 30.0);
        let out = recolor(&raster, &mask, &spec).unwrap();
        assert_ne!(out.get_pixel(2, 2), raster.get_pixel(2, 2));
        assert_eq!(out.get_pixel(15, 2), raster.get_pixel(15, 2));
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let raster = gradient();
        let mask = Mask::zeros(8, 8);
        assert!(recolor(&raster, &mask, &red()).is_err());
    }

    #[test]
    fn test_gamut_map_stays_in_range() {
        let rgb = gamut_map(95.0, 80.0, 70.0);
        assert!(in_gamut(rgb));
        let direct = gamut_map(50.0, 0.0, 0.0);
        assert!(in_gamut(direct));
    }
}
