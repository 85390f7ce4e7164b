//! Persisting edit results
//!
//! Every export writes one recolored PNG, one greyscale mask preview and one
//! JSON metadata record. File names derive from the clock and a random
//! suffix, never from user input. The recorded `export_ms` covers the image
//! writes; the metadata record is written last and carries that figure.

use crate::{
    config::ExportConfig,
    error::{RecolorError, Result},
    services::io::ImageIOService,
    types::EditResult,
};
use instant::Instant;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Paths written by one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFiles {
    pub result: PathBuf,
    pub mask: PathBuf,
    /// Absent when metadata was disabled or could not be written
    pub metadata: Option<PathBuf>,
}

/// Writes edit artifacts into the configured output directory
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    #[must_use]
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Time-ordered file stem unique within the process
    fn file_stem() -> String {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{stamp}_{}", suffix.get(..8).unwrap_or(&suffix))
    }

    /// Write the result, mask preview and metadata
    ///
    /// Returns the result with its export time recorded, alongside the paths.
    ///
    /// # Errors
    /// `WriteError` when the output directory cannot be created or either
    /// image cannot be written. Metadata failures are logged only.
    pub fn export(&self, result: EditResult) -> Result<(EditResult, ExportedFiles)> {
        let start = Instant::now();
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| RecolorError::write_error(dir, e.to_string()))?;

        let stem = Self::file_stem();
        let result_path = dir.join(format!("{stem}_recolored.png"));
        let mask_path = dir.join(format!("{stem}_mask.png"));

        ImageIOService::save_png(result.raster(), &result_path)?;
        ImageIOService::save_mask_png(result.mask(), &mask_path)?;
        let export_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = result.with_export_ms(export_ms);

        let metadata = if self.config.write_metadata {
            let path = dir.join(format!("{stem}_metadata.json"));
            match Self::write_metadata(&result, &path) {
                Ok(()) => Some(path),
                Err(e) => {
                    log::warn!("⚠️ Failed to write metadata {}: {}", path.display(), e);
                    None
                },
            }
        } else {
            None
        };

        log::info!("💾 Exported {} in {}ms", result_path.display(), export_ms);
        let files = ExportedFiles {
            result: result_path,
            mask: mask_path,
            metadata,
        };
        Ok((result, files))
    }

    fn write_metadata(result: &EditResult, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(result.metadata())
            .map_err(|e| RecolorError::internal(format!("serialize metadata: {e}")))?;
        std::fs::write(path, json).map_err(|e| RecolorError::write_error(path, e.to_string()))
    }
}
