//! Accepted upload content types
//!
//! Maps declared MIME types onto the decoders the loader is willing to run.

use crate::error::{RecolorError, Result};
use image::ImageFormat;
use std::str::FromStr;

/// Content types in the loader allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Png,
    Jpeg,
    #[cfg(feature = "webp-support")]
    WebP,
}

impl ContentType {
    /// Every accepted content type, in allow-list order
    pub const ALL: &'static [ContentType] = &[
        ContentType::Png,
        ContentType::Jpeg,
        #[cfg(feature = "webp-support")]
        ContentType::WebP,
    ];

    /// Parse a declared MIME type
    ///
    /// Parameters such as `; charset=binary` are ignored and matching is
    /// case-insensitive. `image/jpg` is accepted as an alias for JPEG.
    ///
    /// # Examples
    /// ```rust
    /// use object_recolor::services::ContentType;
    ///
    /// assert_eq!(ContentType::from_mime("IMAGE/PNG").unwrap(), ContentType::Png);
    /// assert!(ContentType::from_mime("image/gif").is_err());
    /// ```
    pub fn from_mime(mime: &str) -> Result<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            #[cfg(feature = "webp-support")]
            "image/webp" => Ok(Self::WebP),
            _ => Err(RecolorError::unsupported_format(mime.trim())),
        }
    }

    /// Guess the content type from a file extension
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            #[cfg(feature = "webp-support")]
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            #[cfg(feature = "webp-support")]
            Self::WebP => "image/webp",
        }
    }

    /// Decoder used for this content type
    #[must_use]
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            #[cfg(feature = "webp-support")]
            Self::WebP => ImageFormat::WebP,
        }
    }
}

impl FromStr for ContentType {
    type Err = RecolorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_mime(s)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}
