//! End-to-end edit workflows on synthetic images
//!
//! Everything here runs the classical segmenter, so no model weights are needed.

use image::{ImageFormat, Rgba, RgbaImage};
use object_recolor::{
    color::rgb_to_lab, BoundingBox, Detection, DetectionMode, EditPipeline, EditRequest,
    EditService, Mask, PipelineConfig, PointPrompt, PrecomputedDetector, PromptSet, Raster,
    RecolorSpec, Recolorer, Result, RgbColor, SegmentationMode, SegmentationPrompt,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const BACKGROUND: Rgba<u8> = Rgba([235, 235, 230, 255]);
const SQUARE: Rgba<u8> = Rgba([30, 110, 200, 255]);

/// Opaque scene with a uniform `side`×`side` square centred on (`cx`, `cy`)
fn square_scene(width: u32, height: u32, cx: u32, cy: u32, side: u32) -> RgbaImage {
    let (x0, y0) = (cx - side / 2, cy - side / 2);
    RgbaImage::from_fn(width, height, |x, y| {
        if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
            SQUARE
        } else {
            BACKGROUND
        }
    })
}

fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => image::DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .write_to(&mut buffer, format)
            .unwrap(),
        _ => image.write_to(&mut buffer, format).unwrap(),
    }
    buffer.into_inner()
}

fn classical_config(output_dir: &std::path::Path) -> Result<PipelineConfig> {
    PipelineConfig::builder()
        .prefer_classical(true)
        .feather_radius(3.0)
        .output_dir(output_dir)
        .build()
}

fn point(x: u32, y: u32) -> SegmentationPrompt {
    SegmentationPrompt::from_points(PromptSet::new().with(PointPrompt::foreground(x, y)))
}

#[test]
fn test_single_point_recovers_square() -> Result<()> {
    let temp = TempDir::new()?;
    let png = encode(&square_scene(800, 600, 400, 300, 100), ImageFormat::Png);
    let pipeline = EditPipeline::new(classical_config(temp.path())?)?;

    let request = EditRequest::new(png, "image/png", RecolorSpec::parse("#ff0000")?)
        .with_prompt(point(400, 300));
    let result = pipeline.run(&request, &CancellationToken::new())?;

    assert_eq!(result.dimensions(), (800, 600));
    assert_eq!(result.metadata().segmentation_mode, SegmentationMode::Classical);

    let mask = result.mask();
    assert_eq!(mask.dimensions(), (800, 600));
    let inside = (350..450)
        .flat_map(|y| (350..450).map(move |x| (x, y)))
        .filter(|&(x, y)| mask.get(x, y).unwrap_or(0.0) >= 0.5)
        .count();
    assert!(inside >= 9_000, "only {inside} of 10000 square pixels selected");

    // Far from the square nothing is selected
    assert_eq!(mask.get(100, 100), Some(0.0));
    assert_eq!(mask.get(700, 500), Some(0.0));
    assert!(mask.count_at_least(0.5) < 11_000);
    Ok(())
}

#[test]
fn test_grey_to_red_keeps_luminance() -> Result<()> {
    let grey = Raster::from_fn(64, 4, |x, _| {
        let v = 30 + (x * 3) as u8;
        Rgba([v, v, v, 255])
    });
    let spec = RecolorSpec::parse("#FF0000")?.with_strength(1.0);
    let out = Recolorer::new().recolor(&grey, &Mask::filled(64, 4, 1.0), &spec)?;

    for (src, dst) in grey.pixels().zip(out.pixels()) {
        let before = rgb_to_lab([src[0], src[1], src[2]]);
        let after = rgb_to_lab([dst[0], dst[1], dst[2]]);
        assert!(
            (before.l - after.l).abs() < 1.5,
            "L* drifted from {} to {} for {:?}",
            before.l,
            after.l,
            src
        );
        assert!(dst[0] > dst[1] && dst[0] > dst[2], "{dst:?} is not red");
        assert!(after.a > 10.0, "a* {} shows no red shift", after.a);
        assert_eq!(dst[3], 255);
    }
    Ok(())
}

#[test]
fn test_export_writes_three_artifacts() -> Result<()> {
    let temp = TempDir::new()?;
    let output_dir = temp.path().join("edits");
    let pipeline = EditPipeline::new(classical_config(&output_dir)?)?;
    let png = encode(&square_scene(120, 90, 60, 45, 40), ImageFormat::Png);

    let request = EditRequest::new(png, "image/png", RecolorSpec::parse("rgb(20, 200, 60)")?)
        .with_prompt(SegmentationPrompt::from_box(BoundingBox::new(30, 15, 90, 75)?));
    let outcome = pipeline.run_and_export(&request, &CancellationToken::new())?;

    assert!(outcome.files.result.starts_with(&output_dir));
    let reread = image::open(&outcome.files.result)?.to_rgba8();
    assert_eq!(&reread, outcome.result.raster().as_image());

    let mask_preview = image::open(&outcome.files.mask)?.to_luma8();
    assert_eq!(mask_preview.dimensions(), (120, 90));
    assert_eq!(mask_preview.get_pixel(60, 45).0[0], 255);

    let metadata_path = outcome.files.metadata.as_ref().expect("metadata written");
    let metadata: serde_json::Value = serde_json::from_slice(&std::fs::read(metadata_path)?)
        .expect("metadata is JSON");
    assert_eq!(metadata["color_hex"], "#14c83c");
    assert_eq!(metadata["segmentation_mode"], "classical_box");
    assert_eq!(metadata["detection_mode"], "not_requested");
    assert!(metadata["timings_ms"]["total_ms"].is_u64());
    assert_eq!(
        metadata["timings_ms"]["export_ms"].as_u64(),
        outcome.result.metadata().timings.export_ms
    );
    assert!(outcome.result.metadata().timings.export_ms.is_some());
    Ok(())
}

#[test]
fn test_large_upload_is_downsampled_and_prompts_scaled() -> Result<()> {
    let temp = TempDir::new()?;
    let config = PipelineConfig::builder()
        .prefer_classical(true)
        .max_dimension(500)
        .output_dir(temp.path())
        .build()?;
    let pipeline = EditPipeline::new(config)?;
    let png = encode(&square_scene(2000, 1000, 1000, 500, 400), ImageFormat::Png);

    // Prompt in source pixels
    let request = EditRequest::new(png, "image/png", RecolorSpec::parse("#00ff00")?)
        .with_prompt(point(1000, 500));
    let result = pipeline.run(&request, &CancellationToken::new())?;

    let metadata = result.metadata();
    assert_eq!(metadata.source_dimensions, (2000, 1000));
    assert_eq!(metadata.processed_dimensions, (500, 250));
    assert_eq!(result.dimensions(), (500, 250));
    assert_eq!(result.mask().dimensions(), (500, 250));
    assert!(result.mask().get(250, 125).unwrap_or(0.0) > 0.5);
    Ok(())
}

#[test]
fn test_jpeg_upload() -> Result<()> {
    let temp = TempDir::new()?;
    let pipeline = EditPipeline::new(classical_config(temp.path())?)?;
    let jpeg = encode(&square_scene(160, 120, 80, 60, 50), ImageFormat::Jpeg);

    let request = EditRequest::new(jpeg, "image/jpeg", RecolorSpec::parse("#ffa500")?)
        .with_prompt(point(80, 60));
    let result = pipeline.run(&request, &CancellationToken::new())?;
    assert_eq!(result.dimensions(), (160, 120));
    assert!(result.mask().get(80, 60).unwrap_or(0.0) > 0.5);
    Ok(())
}

#[test]
fn test_query_selects_detected_box() -> Result<()> {
    let temp = TempDir::new()?;
    let detector = PrecomputedDetector::new(vec![
        Detection::new(BoundingBox::new(2, 2, 10, 10)?, "cup", 0.4),
        Detection::new(BoundingBox::new(35, 20, 85, 70)?, "blue car", 0.9),
    ]);
    let pipeline =
        EditPipeline::new(classical_config(temp.path())?)?.with_detector(Arc::new(detector));
    let png = encode(&square_scene(120, 90, 60, 45, 40), ImageFormat::Png);

    let request =
        EditRequest::new(png, "image/png", RecolorSpec::parse("#ff00ff")?).with_query("car");
    let result = pipeline.run(&request, &CancellationToken::new())?;

    let metadata = result.metadata();
    assert_eq!(metadata.detection_mode, DetectionMode::Detected);
    assert_eq!(metadata.selected_object.as_deref(), Some("blue car"));
    assert_eq!(metadata.segmentation_mode, SegmentationMode::ClassicalBox);
    assert!(result.mask().get(60, 45).unwrap_or(0.0) > 0.5);
    assert_eq!(result.mask().get(5, 5), Some(0.0));
    Ok(())
}

#[test]
fn test_source_colour_gate_limits_recolor() -> Result<()> {
    // Left half red, right half blue, both fully masked
    let raster = Raster::from_fn(20, 10, |x, _| {
        if x < 10 {
            Rgba([200, 30, 30, 255])
        } else {
            Rgba([30, 30, 200, 255])
        }
    });
    let spec = RecolorSpec::new(RgbColor::new(0, 200, 0))
        .with_strength(1.0)
        .with_source_color(RgbColor::new(255, 0, 0), 20.0);
    let out = Recolorer::new().recolor(&raster, &Mask::filled(20, 10, 1.0), &spec)?;

    assert_ne!(out.get_pixel(2, 5), raster.get_pixel(2, 5));
    assert_eq!(out.get_pixel(15, 5), raster.get_pixel(15, 5));
    Ok(())
}

#[tokio::test]
async fn test_service_runs_batch_in_order() -> Result<()> {
    let temp = TempDir::new()?;
    let config = PipelineConfig::builder()
        .prefer_classical(true)
        .max_concurrent_edits(2)
        .output_dir(temp.path())
        .build()?;
    let service = EditService::new(EditPipeline::new(config)?);

    let sizes = [(90, 60), (120, 80), (60, 90), (100, 100)];
    let requests = sizes
        .iter()
        .map(|&(w, h)| {
            let png = encode(&square_scene(w, h, w / 2, h / 2, 30), ImageFormat::Png);
            EditRequest::new(png, "image/png", RecolorSpec::new(RgbColor::DEFAULT))
                .with_prompt(point(w / 2, h / 2))
        })
        .collect();

    let results = service.edit_many(requests, &CancellationToken::new()).await;
    assert_eq!(results.len(), sizes.len());
    for (result, &(w, h)) in results.into_iter().zip(&sizes) {
        assert_eq!(result?.dimensions(), (w, h));
    }
    assert_eq!(service.available_permits(), 2);
    Ok(())
}

#[tokio::test]
async fn test_service_edit_and_export() -> Result<()> {
    let temp = TempDir::new()?;
    let service = EditService::new(EditPipeline::new(classical_config(temp.path())?)?);
    let png = encode(&square_scene(80, 60, 40, 30, 20), ImageFormat::Png);

    let request = EditRequest::new(png, "image/png", RecolorSpec::parse("#123456")?)
        .with_prompt(point(40, 30));
    let outcome = service
        .edit_and_export(request, CancellationToken::new())
        .await?;
    assert!(outcome.files.result.exists());
    assert!(outcome.files.mask.exists());
    Ok(())
}
