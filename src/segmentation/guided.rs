//! Model-guided segmentation through a promptable encoder/decoder
//!
//! The image is resized so its longest side equals the encoder input size,
//! normalised per channel and zero-padded at the bottom/right. Prompts are
//! mapped into that frame; decoder masks are mapped back by cropping the
//! padded area and resizing bilinearly to the raster.

#![allow(clippy::cast_precision_loss, clippy::indexing_slicing)]

use crate::{
    error::{RecolorError, Result},
    inference::{DecoderOutput, DecoderPrompt, ImageEmbedding},
    models::ModelManifest,
    session::ModelHandle,
    types::{Mask, Raster, SegmentationPrompt},
};
use image::{imageops, imageops::FilterType, ImageBuffer, Luma};
use ndarray::{Array1, Array2, Array3, Array4};
use std::sync::Arc;

const LABEL_PADDING: f32 = -1.0;
const LABEL_BACKGROUND: f32 = 0.0;
const LABEL_FOREGROUND: f32 = 1.0;
const LABEL_BOX_TOP_LEFT: f32 = 2.0;
const LABEL_BOX_BOTTOM_RIGHT: f32 = 3.0;

/// Mapping between raster coordinates and the encoder's square input
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ResizeTransform {
    pub scale: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub input_size: u32,
}

impl ResizeTransform {
    pub(crate) fn new(width: u32, height: u32, input_size: u32) -> Self {
        let longest = width.max(height).max(1);
        let scale = input_size as f32 / longest as f32;
        let resize = |side: u32| ((side as f32 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            resized_width: resize(width),
            resized_height: resize(height),
            input_size,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, y * self.scale)
    }
}

/// Encoder output for one raster, reusable across prompts
#[derive(Debug, Clone)]
pub struct PreparedImage {
    embedding: ImageEmbedding,
    transform: ResizeTransform,
    width: u32,
    height: u32,
}

/// Resize, normalise and pad a raster into an NCHW tensor
pub(crate) fn preprocess(raster: &Raster, manifest: &ModelManifest) -> (Array4<f32>, ResizeTransform) {
    let transform = ResizeTransform::new(raster.width(), raster.height(), manifest.input_size);
    let resized = imageops::resize(
        raster.as_image(),
        transform.resized_width,
        transform.resized_height,
        FilterType::Triangle,
    );

    let side = manifest.input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (f32::from(pixel.0[c]) - manifest.pixel_mean[c]) / manifest.pixel_std[c];
        }
    }
    (tensor, transform)
}

/// Encode points and box into decoder inputs
///
/// Without a box a single padding point is appended; the result is then
/// padded to `max_points` with label -1.
pub(crate) fn decoder_prompt(
    prompt: &SegmentationPrompt,
    transform: &ResizeTransform,
    manifest: &ModelManifest,
    width: u32,
    height: u32,
) -> Result<DecoderPrompt> {
    let mut entries: Vec<(f32, f32, f32)> = prompt
        .points
        .iter()
        .map(|p| {
            let (x, y) = transform.map(p.x as f32, p.y as f32);
            let label = if p.is_foreground() {
                LABEL_FOREGROUND
            } else {
                LABEL_BACKGROUND
            };
            (x, y, label)
        })
        .collect();

    if let Some(bbox) = &prompt.bbox {
        let (x0, y0) = transform.map(bbox.x_min as f32, bbox.y_min as f32);
        let (x1, y1) = transform.map((bbox.x_max - 1) as f32, (bbox.y_max - 1) as f32);
        entries.push((x0, y0, LABEL_BOX_TOP_LEFT));
        entries.push((x1, y1, LABEL_BOX_BOTTOM_RIGHT));
    } else {
        entries.push((0.0, 0.0, LABEL_PADDING));
    }

    if entries.len() > manifest.max_points {
        return Err(RecolorError::inference(format!(
            "prompt needs {} decoder points, model accepts {}",
            entries.len(),
            manifest.max_points
        )));
    }
    entries.resize(manifest.max_points, (0.0, 0.0, LABEL_PADDING));

    let n = entries.len();
    let mut coords = Array3::<f32>::zeros((1, n, 2));
    let mut labels = Array2::<f32>::zeros((1, n));
    for (i, (x, y, label)) in entries.into_iter().enumerate() {
        coords[[0, i, 0]] = x;
        coords[[0, i, 1]] = y;
        labels[[0, i]] = label;
    }

    let m = manifest.mask_input_size;
    Ok(DecoderPrompt {
        point_coords: coords,
        point_labels: labels,
        mask_input: Array4::zeros((1, 1, m, m)),
        has_mask_input: Array1::zeros(1),
        orig_im_size: Array1::from(vec![height as f32, width as f32]),
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Select the best mask plane and bring it back to raster resolution
pub(crate) fn postprocess(
    output: &DecoderOutput,
    transform: &ResizeTransform,
    manifest: &ModelManifest,
    width: u32,
    height: u32,
) -> Result<Mask> {
    let shape = output.masks.shape();
    if shape.len() < 2 {
        return Err(RecolorError::inference(format!(
            "decoder mask must be at least 2-D, got {shape:?}"
        )));
    }
    let plane_h = shape[shape.len() - 2];
    let plane_w = shape[shape.len() - 1];
    let plane_len = plane_h * plane_w;
    let planes = if plane_len == 0 {
        0
    } else {
        output.masks.len() / plane_len
    };
    if planes == 0 {
        return Err(RecolorError::inference("decoder returned an empty mask"));
    }

    let best = output
        .scores
        .as_ref()
        .filter(|s| s.len() == planes)
        .and_then(|s| {
            s.iter()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                    Some((_, b)) if b >= v => best,
                    _ => Some((i, v)),
                })
        })
        .map_or(0, |(i, _)| i);

    let plane: Vec<f32> = output
        .masks
        .iter()
        .skip(best * plane_len)
        .take(plane_len)
        .copied()
        .collect();

    let values = if (plane_w, plane_h) == (width as usize, height as usize) {
        plane
    } else {
        let pw = u32::try_from(plane_w).map_err(|_| RecolorError::inference("mask too wide"))?;
        let ph = u32::try_from(plane_h).map_err(|_| RecolorError::inference("mask too tall"))?;
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(pw, ph, plane)
            .ok_or_else(|| RecolorError::inference("mask plane size mismatch"))?;

        // Square planes cover the padded encoder input; crop to the image area
        let (cw, ch) = if pw == ph {
            let frac = |resized: u32| {
                ((resized as f32 / transform.input_size as f32) * pw as f32).ceil() as u32
            };
            (
                frac(transform.resized_width).clamp(1, pw),
                frac(transform.resized_height).clamp(1, ph),
            )
        } else {
            (pw, ph)
        };
        let cropped = imageops::crop_imm(&buffer, 0, 0, cw, ch).to_image();
        imageops::resize(&cropped, width, height, FilterType::Triangle).into_raw()
    };

    let probabilities = if manifest.output_is_logits {
        values.into_iter().map(sigmoid).collect()
    } else {
        values
    };
    Mask::from_vec_clamped(width, height, probabilities)
}

/// Segmenter backed by the shared model handle
#[derive(Debug, Clone)]
pub struct ModelGuidedSegmenter {
    handle: Arc<ModelHandle>,
}

impl ModelGuidedSegmenter {
    #[must_use]
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.handle.backend().name()
    }

    /// Run the encoder once for a raster
    pub fn prepare(&self, raster: &Raster) -> Result<PreparedImage> {
        let (tensor, transform) = preprocess(raster, self.handle.manifest());
        let embedding = self.handle.backend().embed(&tensor)?;
        Ok(PreparedImage {
            embedding,
            transform,
            width: raster.width(),
            height: raster.height(),
        })
    }

    /// Decode a mask for a prompt against a prepared image
    pub fn segment_prepared(
        &self,
        prepared: &PreparedImage,
        prompt: &SegmentationPrompt,
    ) -> Result<Mask> {
        let manifest = self.handle.manifest();
        let decoder_input = decoder_prompt(
            prompt,
            &prepared.transform,
            manifest,
            prepared.width,
            prepared.height,
        )?;
        let output = self
            .handle
            .backend()
            .predict(&prepared.embedding, &decoder_input)?;
        postprocess(
            &output,
            &prepared.transform,
            manifest,
            prepared.width,
            prepared.height,
        )
    }

    pub fn segment(&self, raster: &Raster, prompt: &SegmentationPrompt) -> Result<Mask> {
        let prepared = self.prepare(raster)?;
        self.segment_prepared(&prepared, prompt)
    }
}
