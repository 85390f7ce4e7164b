//! Image loading and PNG writing
//!
//! The loader enforces the upload allow-list and byte ceiling before any
//! decoding work, then normalises everything to RGBA8 and downsamples
//! oversized images.

use crate::{
    config::LoaderConfig,
    error::{RecolorError, Result},
    services::format::ContentType,
    types::{Mask, Raster},
};
use image::imageops::FilterType;
use std::path::Path;

/// Decoded upload ready for the pipeline
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub raster: Raster,
    pub content_type: ContentType,
    /// Decoded size before downsampling
    pub source_dimensions: (u32, u32),
}

impl LoadedImage {
    /// Whether the raster was downsampled during loading
    #[must_use]
    pub fn was_resized(&self) -> bool {
        self.raster.dimensions() != self.source_dimensions
    }
}

/// Service for decoding uploads and writing PNG artifacts
pub struct ImageIOService;

impl ImageIOService {
    /// Decode raw bytes with a declared content type
    ///
    /// # Arguments
    /// * `bytes` - Raw upload
    /// * `content_type` - Declared MIME type
    /// * `config` - Byte ceiling and maximum dimension
    ///
    /// # Errors
    /// - `PayloadTooLarge` when `bytes` exceeds `max_upload_bytes`
    /// - `UnsupportedFormat` when the content type is not allowed
    /// - `DecodeError` when the bytes are not a valid image of that type
    ///
    /// # Examples
    /// ```rust,no_run
    /// use object_recolor::{config::LoaderConfig, services::ImageIOService};
    ///
    /// let bytes = std::fs::read("input.png")?;
    /// let loaded = ImageIOService::load_from_bytes(&bytes, "image/png", &LoaderConfig::default())?;
    /// println!("{:?}", loaded.raster.dimensions());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_from_bytes(
        bytes: &[u8],
        content_type: &str,
        config: &LoaderConfig,
    ) -> Result<LoadedImage> {
        if bytes.len() > config.max_upload_bytes {
            return Err(RecolorError::PayloadTooLarge {
                size: bytes.len(),
                limit: config.max_upload_bytes,
            });
        }
        let content_type = ContentType::from_mime(content_type)?;

        let decoded = image::load_from_memory_with_format(bytes, content_type.image_format())
            .map_err(|e| RecolorError::decode(format!("{content_type}: {e}")))?;
        let source_dimensions = (decoded.width(), decoded.height());
        if source_dimensions.0 == 0 || source_dimensions.1 == 0 {
            return Err(RecolorError::decode("image has no pixels"));
        }

        let raster = Self::downsample(Raster::new(decoded.to_rgba8()), config.max_dimension);
        log::debug!(
            "Loaded {} {}x{} -> {}x{} ({} bytes)",
            content_type,
            source_dimensions.0,
            source_dimensions.1,
            raster.width(),
            raster.height(),
            bytes.len()
        );

        Ok(LoadedImage {
            raster,
            content_type,
            source_dimensions,
        })
    }

    /// Load an image file, inferring the content type from its extension
    ///
    /// # Errors
    /// - File cannot be read
    /// - Any error from [`ImageIOService::load_from_bytes`]
    pub fn load_from_path<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<LoadedImage> {
        let path = path.as_ref();
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ContentType::from_extension)
            .ok_or_else(|| {
                RecolorError::unsupported_format(format!(
                    "cannot infer content type of '{}'",
                    path.display()
                ))
            })?;
        let bytes =
            std::fs::read(path).map_err(|e| RecolorError::file_io_error("read image", path, &e))?;
        Self::load_from_bytes(&bytes, content_type.mime(), config)
    }

    /// Load an image from an async reader
    ///
    /// Reading stops one byte past the ceiling so an oversized stream is
    /// never buffered in full.
    ///
    /// # Errors
    /// - Reader failure
    /// - Any error from [`ImageIOService::load_from_bytes`]
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        reader: R,
        content_type: &str,
        config: &LoaderConfig,
    ) -> Result<LoadedImage> {
        use tokio::io::AsyncReadExt;

        let limit = u64::try_from(config.max_upload_bytes)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut buffer = Vec::new();
        reader.take(limit).read_to_end(&mut buffer).await?;
        Self::load_from_bytes(&buffer, content_type, config)
    }

    /// Target size when the longer side must not exceed `max_dimension`
    ///
    /// The longer side becomes exactly `max_dimension`; the other side is
    /// scaled and rounded, never below one pixel. `0` disables resizing.
    #[must_use]
    pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
        let larger = width.max(height);
        if max_dimension == 0 || larger <= max_dimension {
            return (width, height);
        }
        let scale = |side: u32| -> u32 {
            let scaled = (u64::from(side) * u64::from(max_dimension) * 2 + u64::from(larger))
                / (2 * u64::from(larger));
            u32::try_from(scaled).unwrap_or(max_dimension).max(1)
        };
        if width >= height {
            (max_dimension, scale(height))
        } else {
            (scale(width), max_dimension)
        }
    }

    /// Downsample with Lanczos3 so the longer side fits `max_dimension`
    #[must_use]
    pub fn downsample(raster: Raster, max_dimension: u32) -> Raster {
        let (width, height) = raster.dimensions();
        let (tw, th) = Self::target_dimensions(width, height, max_dimension);
        if (tw, th) == (width, height) {
            return raster;
        }
        Raster::new(image::imageops::resize(
            raster.as_image(),
            tw,
            th,
            FilterType::Lanczos3,
        ))
    }

    /// Write a raster as lossless PNG
    ///
    /// # Errors
    /// `WriteError` when the file cannot be created or encoded
    pub fn save_png<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
        let path = path.as_ref();
        raster
            .as_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| RecolorError::write_error(path, e.to_string()))
    }

    /// Write a mask as an 8-bit greyscale PNG preview
    ///
    /// # Errors
    /// `WriteError` when the file cannot be created or encoded
    pub fn save_mask_png<P: AsRef<Path>>(mask: &Mask, path: P) -> Result<()> {
        let path = path.as_ref();
        mask.to_preview()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| RecolorError::write_error(path, e.to_string()))
    }
}
