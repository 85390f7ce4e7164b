//! Colour parsing and CIE L*a*b* conversions
//!
//! Colours arrive either as hex strings (`#RRGGBB`, `RRGGBB`) or CSS
//! functional notation (`rgb(..)`, `rgba(..)`), optionally with 0-1 float
//! components. Some colour pickers emit `#rgba(..)`; the leading `#` is
//! tolerated in that case.

use crate::error::{RecolorError, Result};
use palette::{white_point::D65, FromColor, Hsv, Lab, Srgb};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An opaque 8-bit sRGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// Fallback colour used by [`RgbColor::parse_or_default`]
    pub const DEFAULT: Self = Self::new(255, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex or CSS colour string
    ///
    /// # Errors
    /// - [`RecolorError::InvalidColor`] when the string is neither six hex
    ///   digits nor `rgb()`/`rgba()` notation
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(RecolorError::invalid_color("empty color string"));
        }

        let mut s = trimmed;
        if s.starts_with('#') && s.to_ascii_lowercase().contains("rgb") {
            s = s.trim_start_matches('#').trim();
        }

        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex_digits(hex);
        }

        if let Some(color) = Self::parse_css(s)? {
            return Ok(color);
        }

        Err(RecolorError::invalid_color(format!(
            "'{trimmed}' is not #RRGGBB, rgb() or rgba()"
        )))
    }

    /// Parse a colour, falling back to [`RgbColor::DEFAULT`] on malformed input
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        match Self::parse(value) {
            Ok(color) => color,
            Err(e) => {
                log::warn!("{e}; falling back to {}", Self::DEFAULT);
                Self::DEFAULT
            },
        }
    }

    fn from_hex_digits(hex: &str) -> Result<Self> {
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| RecolorError::invalid_color(format!("bad hex digits in '{hex}'")))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    fn parse_css(s: &str) -> Result<Option<Self>> {
        let lower = s.to_ascii_lowercase();
        let body = if let Some(rest) = lower.strip_prefix("rgba") {
            rest
        } else if let Some(rest) = lower.strip_prefix("rgb") {
            rest
        } else {
            return Ok(None);
        };

        let body = body.trim_start();
        let Some(inner) = body.strip_prefix('(') else {
            return Ok(None);
        };
        let inner = inner.trim_end().trim_end_matches(')');

        let components = inner
            .split(',')
            .take(3)
            .map(|part| {
                part.trim().parse::<f32>().map_err(|_| {
                    RecolorError::invalid_color(format!("bad component '{}' in '{s}'", part.trim()))
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        let &[r, g, b] = components.as_slice() else {
            return Err(RecolorError::invalid_color(format!(
                "expected three components in '{s}'"
            )));
        };
        if [r, g, b].iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(RecolorError::invalid_color(format!(
                "components must be non-negative in '{s}'"
            )));
        }

        // Components all <= 1 are treated as unit floats
        let scale = if r <= 1.0 && g <= 1.0 && b <= 1.0 {
            255.0
        } else {
            1.0
        };
        let to_u8 = |c: f32| (c * scale).clamp(0.0, 255.0).round() as u8;
        Ok(Some(Self::new(to_u8(r), to_u8(g), to_u8(b))))
    }

    /// Lower-case `#rrggbb` representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn to_array(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Convert to CIE L*a*b* under D65
    #[must_use]
    pub fn to_lab(&self) -> Lab<D65, f32> {
        rgb_to_lab([self.r, self.g, self.b])
    }

    /// Hue in degrees and saturation in [0, 1]
    #[must_use]
    pub fn hue_saturation(&self) -> (f32, f32) {
        hue_saturation([self.r, self.g, self.b])
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RgbColor {
    type Err = RecolorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RgbColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RgbColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Convert an 8-bit sRGB triple to L*a*b* (D65)
#[must_use]
pub fn rgb_to_lab(rgb: [u8; 3]) -> Lab<D65, f32> {
    Lab::from_color(unit_srgb(rgb))
}

/// Convert L*a*b* back to unit-range sRGB components without clamping
#[must_use]
pub fn lab_to_unit_rgb(lab: Lab<D65, f32>) -> [f32; 3] {
    let srgb: Srgb<f32> = Srgb::from_color(lab);
    [srgb.red, srgb.green, srgb.blue]
}

/// Whether unit-range sRGB components are representable without clipping
#[must_use]
pub fn in_gamut(rgb: [f32; 3]) -> bool {
    const EPS: f32 = 1e-4;
    rgb.iter().all(|c| c.is_finite() && *c >= -EPS && *c <= 1.0 + EPS)
}

/// Quantise unit-range components to 8 bits, clamping out-of-range values
#[must_use]
pub fn unit_rgb_to_u8(rgb: [f32; 3]) -> [u8; 3] {
    rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Hue in degrees [0, 360) and HSV saturation in [0, 1]
#[must_use]
pub fn hue_saturation(rgb: [u8; 3]) -> (f32, f32) {
    let hsv: Hsv = Hsv::from_color(unit_srgb(rgb));
    (hsv.hue.into_positive_degrees(), hsv.saturation)
}

/// HSV value (brightness) in [0, 1]
#[must_use]
pub fn hsv_value(rgb: [u8; 3]) -> f32 {
    f32::from(rgb[0].max(rgb[1]).max(rgb[2])) / 255.0
}

/// Smallest angular distance between two hues, in degrees
#[must_use]
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

fn unit_srgb(rgb: [u8; 3]) -> Srgb<f32> {
    Srgb::new(
        f32::from(rgb[0]) / 255.0,
        f32::from(rgb[1]) / 255.0,
        f32::from(rgb[2]) / 255.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(RgbColor::parse("#FF0000").unwrap(), RgbColor::new(255, 0, 0));
        assert_eq!(RgbColor::parse("00ff7f").unwrap(), RgbColor::new(0, 255, 127));
        assert_eq!(RgbColor::parse("  #1a2B3c ").unwrap(), RgbColor::new(26, 43, 60));
    }

    #[test]
    fn test_parse_css() {
        assert_eq!(
            RgbColor::parse("rgb(10, 20, 30)").unwrap(),
            RgbColor::new(10, 20, 30)
        );
        assert_eq!(
            RgbColor::parse("rgba(255, 128, 0, 0.5)").unwrap(),
            RgbColor::new(255, 128, 0)
        );
        assert_eq!(
            RgbColor::parse("#rgba(0, 0, 255, 1)").unwrap(),
            RgbColor::new(0, 0, 255)
        );
        // unit floats
        assert_eq!(
            RgbColor::parse("rgba(1.0, 0.5, 0.0, 1)").unwrap(),
            RgbColor::new(255, 128, 0)
        );
        // out of range components clamp
        assert_eq!(
            RgbColor::parse("rgb(300, 20, 2)").unwrap(),
            RgbColor::new(255, 20, 2)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RgbColor::parse("").is_err());
        assert!(RgbColor::parse("#FFF").is_err());
        assert!(RgbColor::parse("rgb(1, 2)").is_err());
        assert!(RgbColor::parse("rgb(a, b, c)").is_err());
        assert!(RgbColor::parse("hsl(10, 20%, 30%)").is_err());
        assert_eq!(RgbColor::parse_or_default("nonsense"), RgbColor::DEFAULT);
    }

    #[test]
    fn test_serde_as_hex() {
        let color = RgbColor::new(255, 16, 0);
        let json = serde_json::to_string(&color).unwrap();
        assert_eq!(json, "\"#ff1000\"");
        let back: RgbColor = serde_json::from_str("\"rgb(255,16,0)\"").unwrap();
        assert_eq!(back, color);
    }

    #[test]
    fn test_lab_roundtrip_primaries() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [128, 128, 128], [0, 0, 0]] {
            let back = unit_rgb_to_u8(lab_to_unit_rgb(rgb_to_lab(rgb)));
            for c in 0..3 {
                assert!((i16::from(back[c]) - i16::from(rgb[c])).abs() <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_grey_has_neutral_lab() {
        let lab = rgb_to_lab([128, 128, 128]);
        assert!(lab.a.abs() < 0.01);
        assert!(lab.b.abs() < 0.01);
        assert!((lab.l - 53.59).abs() < 0.1);
    }

    #[test]
    fn test_hue_helpers() {
        let (hue, sat) = hue_saturation([255, 0, 0]);
        assert!(hue.abs() < 0.5 || (360.0 - hue).abs() < 0.5);
        assert!((sat - 1.0).abs() < 1e-6);

        let (_, grey_sat) = hue_saturation([90, 90, 90]);
        assert!(grey_sat.abs() < 1e-6);

        assert!((hue_distance(350.0, 10.0) - 20.0).abs() < 1e-4);
        assert!((hue_distance(90.0, 270.0) - 180.0).abs() < 1e-4);
        assert!((hsv_value([10, 200, 50]) - 200.0 / 255.0).abs() < 1e-6);
    }
}
