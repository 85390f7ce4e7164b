//! Invariants that must hold for any input

use image::{ImageFormat, Rgba, RgbaImage};
use object_recolor::{
    refine::refine_mask, BoundingBox, EditPipeline, EditRequest, ImageIOService, LoaderConfig,
    Mask, PipelineConfig, PointPrompt, PromptSet, Raster, RecolorSpec, Recolorer, RefineConfig,
    Result, RgbColor, SegmentationPrompt,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Deterministic, textured test image with varying alpha
fn textured(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 7 + y * 3) % 256) as u8;
        let g = ((x * 2 + y * 5 + 40) % 256) as u8;
        let b = if (x / 8 + y / 8) % 2 == 0 { 200 } else { 60 };
        let a = (128 + (x + y) % 128) as u8;
        Rgba([r, g, b, a])
    })
}

fn png(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn pipeline(temp: &TempDir) -> Result<EditPipeline> {
    EditPipeline::new(
        PipelineConfig::builder()
            .prefer_classical(true)
            .output_dir(temp.path())
            .build()?,
    )
}

fn prompt() -> SegmentationPrompt {
    SegmentationPrompt::from_points(
        PromptSet::new()
            .with(PointPrompt::foreground(30, 20))
            .with(PointPrompt::foreground(36, 26))
            .with(PointPrompt::background(2, 2)),
    )
}

#[test]
fn test_strength_zero_returns_input() -> Result<()> {
    let temp = TempDir::new()?;
    let source = textured(64, 48);
    let request = EditRequest::new(
        png(&source),
        "image/png",
        RecolorSpec::new(RgbColor::new(0, 255, 0)).with_strength(0.0),
    )
    .with_prompt(prompt());

    let result = pipeline(&temp)?.run(&request, &CancellationToken::new())?;
    assert_eq!(result.raster().as_image(), &source);
    Ok(())
}

#[test]
fn test_recolor_is_idempotent_at_strength_zero() -> Result<()> {
    let raster = Raster::new(textured(40, 30));
    let mask = Mask::from_fn(40, 30, |x, _| x as f32 / 39.0);
    let spec = RecolorSpec::new(RgbColor::new(255, 0, 255)).with_strength(0.0);

    let once = Recolorer::new().recolor(&raster, &mask, &spec)?;
    let twice = Recolorer::new().recolor(&once, &mask, &spec)?;
    assert_eq!(once, raster);
    assert_eq!(twice, once);
    Ok(())
}

#[test]
fn test_zero_mask_pixels_are_bit_identical() -> Result<()> {
    let raster = Raster::new(textured(50, 40));
    // Checkerboard of zero and partial weights
    let mask = Mask::from_fn(50, 40, |x, y| if (x + y) % 2 == 0 { 0.0 } else { 0.7 });
    let spec = RecolorSpec::new(RgbColor::new(10, 200, 90)).with_strength(1.0);
    let out = Recolorer::new().recolor(&raster, &mask, &spec)?;

    let mut changed = 0;
    for y in 0..40 {
        for x in 0..50 {
            if (x + y) % 2 == 0 {
                assert_eq!(out.get_pixel(x, y), raster.get_pixel(x, y), "({x}, {y})");
            } else if out.get_pixel(x, y) != raster.get_pixel(x, y) {
                changed += 1;
            }
        }
    }
    assert!(changed > 0);
    Ok(())
}

#[test]
fn test_alpha_is_always_copied() -> Result<()> {
    let temp = TempDir::new()?;
    let source = textured(64, 48);
    let request = EditRequest::new(png(&source), "image/png", RecolorSpec::parse("#3050ff")?)
        .with_prompt(SegmentationPrompt::from_box(BoundingBox::new(8, 8, 56, 40)?));

    let result = pipeline(&temp)?.run(&request, &CancellationToken::new())?;
    for (before, after) in source.pixels().zip(result.raster().pixels()) {
        assert_eq!(before.0[3], after[3]);
    }
    Ok(())
}

#[test]
fn test_output_dimensions_match_processed_input() -> Result<()> {
    let temp = TempDir::new()?;
    let pipeline = pipeline(&temp)?;
    for (w, h) in [(9, 5), (64, 48), (17, 93), (300, 7)] {
        let spec = RecolorSpec::new(RgbColor::DEFAULT);
        let request = EditRequest::new(png(&textured(w, h)), "image/png", spec)
            .with_prompt(SegmentationPrompt::from_box(BoundingBox::new(0, 0, w, h)?));
        let result = pipeline.run(&request, &CancellationToken::new())?;
        assert_eq!(result.dimensions(), (w, h));
        assert_eq!(result.mask().dimensions(), (w, h));
        assert!(result.mask().as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }
    Ok(())
}

#[test]
fn test_resize_keeps_aspect_ratio() -> Result<()> {
    assert_eq!(ImageIOService::target_dimensions(4000, 2000, 1000), (1000, 500));
    assert_eq!(ImageIOService::target_dimensions(2000, 4000, 1000), (500, 1000));
    assert_eq!(ImageIOService::target_dimensions(1001, 3, 1000), (1000, 3));
    assert_eq!(ImageIOService::target_dimensions(5000, 1, 1000), (1000, 1));
    assert_eq!(ImageIOService::target_dimensions(800, 600, 1000), (800, 600));
    assert_eq!(ImageIOService::target_dimensions(4000, 2000, 0), (4000, 2000));

    let config = LoaderConfig {
        max_dimension: 1000,
        max_upload_bytes: 64 * 1024 * 1024,
    };
    let big = RgbaImage::from_pixel(4000, 2000, Rgba([90, 120, 150, 255]));
    let loaded = ImageIOService::load_from_bytes(&png(&big), "image/png", &config)?;
    assert_eq!(loaded.raster.dimensions(), (1000, 500));
    assert_eq!(loaded.source_dimensions, (4000, 2000));
    assert!(loaded.was_resized());
    Ok(())
}

#[test]
fn test_pipeline_is_deterministic() -> Result<()> {
    let temp = TempDir::new()?;
    let pipeline = pipeline(&temp)?;
    let spec = RecolorSpec::parse("#c03080")?;
    let request = EditRequest::new(png(&textured(72, 54)), "image/png", spec).with_prompt(prompt());

    let a = pipeline.run(&request, &CancellationToken::new())?;
    let b = pipeline.run(&request, &CancellationToken::new())?;
    assert_eq!(a.raster(), b.raster());
    assert_eq!(a.mask(), b.mask());
    assert_ne!(a.metadata().request_id, b.metadata().request_id);
    Ok(())
}

#[test]
fn test_refine_with_zero_parameters_is_identity() -> Result<()> {
    let mask = Mask::from_fn(30, 20, |x, y| ((x * y) % 7) as f32 / 6.0);
    assert_eq!(refine_mask(&mask, &RefineConfig::identity())?, mask);

    let feathered = refine_mask(
        &mask,
        &RefineConfig {
            feather_radius: 4.0,
            ..RefineConfig::default()
        },
    )?;
    assert_eq!(feathered.dimensions(), mask.dimensions());
    assert!(feathered.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    Ok(())
}
