//! Model directory resolution and manifest loading
//!
//! A model directory holds an image encoder, a prompt decoder and an
//! optional `model.json` manifest:
//!
//! ```text
//! <model_dir>/
//!   encoder.onnx
//!   decoder.onnx
//!   model.json      (optional)
//! ```
//!
//! Weights are never downloaded; an absent or incomplete directory yields
//! [`RecolorError::ModelUnavailable`], which the segmenter answers by
//! falling back to the classical strategy.

use crate::error::{RecolorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest describing how to feed the encoder/decoder pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelManifest {
    pub name: String,
    /// Square encoder input side; the longest image side is resized to this
    pub input_size: u32,
    pub pixel_mean: [f32; 3],
    pub pixel_std: [f32; 3],
    /// Fixed decoder point count; prompts are padded with label -1
    pub max_points: usize,
    /// Side of the decoder's `mask_input` tensor
    pub mask_input_size: usize,
    /// Decoder emits logits (sigmoid applied) rather than probabilities
    pub output_is_logits: bool,
    pub encoder_file: String,
    pub decoder_file: String,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            name: "sam".to_string(),
            input_size: 1024,
            pixel_mean: [123.675, 116.28, 103.53],
            pixel_std: [58.395, 57.12, 57.375],
            max_points: 8,
            mask_input_size: 256,
            output_is_logits: true,
            encoder_file: "encoder.onnx".to_string(),
            decoder_file: "decoder.onnx".to_string(),
        }
    }
}

impl ModelManifest {
    /// Validate manifest values
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.input_size > 4096 {
            return Err(RecolorError::config_value_error(
                "input_size",
                self.input_size,
                "1-4096",
                Some(1024),
            ));
        }
        if self.pixel_std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RecolorError::model("pixel_std entries must be positive"));
        }
        if self.max_points < 2 {
            return Err(RecolorError::config_value_error(
                "max_points",
                self.max_points,
                ">= 2",
                Some(8),
            ));
        }
        if self.mask_input_size == 0 {
            return Err(RecolorError::model("mask_input_size must be positive"));
        }
        Ok(())
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub encoder_bytes: u64,
    pub decoder_bytes: u64,
    pub input_size: u32,
}

impl ModelInfo {
    /// Combined weight size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.encoder_bytes + self.decoder_bytes
    }
}

/// Resolves encoder/decoder files for a model directory
#[derive(Debug, Clone)]
pub struct ModelManager {
    dir: PathBuf,
    manifest: ModelManifest,
}

impl ModelManager {
    /// Open a model directory
    ///
    /// # Errors
    /// - [`RecolorError::ModelUnavailable`] when the directory or either network is missing
    /// - [`RecolorError::Model`] when `model.json` exists but is malformed
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(RecolorError::model_unavailable(format!(
                "model directory not found: {}",
                dir.display()
            )));
        }

        let manifest_path = dir.join("model.json");
        let mut manifest = if manifest_path.exists() {
            let raw = fs::read_to_string(&manifest_path).map_err(|e| {
                RecolorError::model_error_with_context(
                    "read manifest of",
                    &manifest_path,
                    &e.to_string(),
                    &[],
                )
            })?;
            serde_json::from_str::<ModelManifest>(&raw).map_err(|e| {
                RecolorError::model_error_with_context(
                    "parse manifest of",
                    &manifest_path,
                    &e.to_string(),
                    &["check model.json against the documented fields"],
                )
            })?
        } else {
            ModelManifest::default()
        };
        if !manifest_path.exists() {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                manifest.name = name.to_string();
            }
        }
        manifest.validate()?;

        let manager = Self { dir, manifest };
        for path in [manager.encoder_path(), manager.decoder_path()] {
            if !path.is_file() {
                return Err(RecolorError::model_unavailable(format!(
                    "missing network file: {}",
                    path.display()
                )));
            }
        }

        log::debug!(
            "Resolved model '{}' in {}",
            manager.manifest.name,
            manager.dir.display()
        );
        Ok(manager)
    }

    /// Conventional per-user model location, if it exists
    #[must_use]
    pub fn default_model_dir() -> Option<PathBuf> {
        let dir = dirs::cache_dir()?.join("object-recolor").join("models");
        dir.is_dir().then_some(dir)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    #[must_use]
    pub fn encoder_path(&self) -> PathBuf {
        self.dir.join(&self.manifest.encoder_file)
    }

    #[must_use]
    pub fn decoder_path(&self) -> PathBuf {
        self.dir.join(&self.manifest.decoder_file)
    }

    /// Read encoder weights
    pub fn load_encoder(&self) -> Result<Vec<u8>> {
        let path = self.encoder_path();
        fs::read(&path).map_err(|e| RecolorError::file_io_error("read encoder", &path, &e))
    }

    /// Read decoder weights
    pub fn load_decoder(&self) -> Result<Vec<u8>> {
        let path = self.decoder_path();
        fs::read(&path).map_err(|e| RecolorError::file_io_error("read decoder", &path, &e))
    }

    /// Get model information
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size = |path: PathBuf| -> Result<u64> {
            fs::metadata(&path)
                .map(|m| m.len())
                .map_err(|e| RecolorError::file_io_error("stat", &path, &e))
        };
        Ok(ModelInfo {
            name: self.manifest.name.clone(),
            encoder_bytes: size(self.encoder_path())?,
            decoder_bytes: size(self.decoder_path())?,
            input_size: self.manifest.input_size,
        })
    }
}
