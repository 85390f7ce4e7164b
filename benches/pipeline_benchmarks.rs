use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{ImageFormat, Rgba, RgbaImage};
use object_recolor::{
    expand_mask_to_include_shadow, refine::refine_mask, BoundingBox, ClassicalParams,
    ClassicalSegmenter, EditPipeline, EditRequest, Mask, PipelineConfig, PointPrompt, PromptSet,
    Raster, RecolorSpec, Recolorer, RefineConfig, RgbColor, SegmentationPrompt,
};
use tokio_util::sync::CancellationToken;

const SIZES: [(u32, u32); 3] = [(256, 192), (640, 480), (1024, 768)];

fn scene(width: u32, height: u32) -> RgbaImage {
    let (x0, y0, x1, y1) = (width / 4, height / 4, width * 3 / 4, height * 3 / 4);
    RgbaImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            let shade = (60 + (x + y) % 40) as u8;
            Rgba([shade, shade + 40, 190, 255])
        } else {
            Rgba([228, 226, 220, 255])
        }
    })
}

/// Rough blob with hard edges, like a raw segmenter output
fn rough_mask(width: u32, height: u32) -> Mask {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 3.0;
    Mask::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let speckle = (x * 31 + y * 17) % 97 == 0;
        if (d < radius) != speckle {
            0.85
        } else {
            0.0
        }
    })
}

fn png(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn bench_refine(c: &mut Criterion) {
    let mut group = c.benchmark_group("refine_mask");
    let config = RefineConfig {
        feather_radius: 3.0,
        ..RefineConfig::default()
    };

    for (width, height) in SIZES {
        let mask = rough_mask(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &mask,
            |b, mask| b.iter(|| refine_mask(black_box(mask), &config).unwrap()),
        );
    }
    group.finish();
}

fn bench_shadow(c: &mut Criterion) {
    let (width, height) = (640, 480);
    let raster = Raster::new(scene(width, height));
    let mask = rough_mask(width, height);

    c.bench_function("shadow_expansion_640x480", |b| {
        b.iter(|| expand_mask_to_include_shadow(black_box(&raster), black_box(&mask), 15, 0.35));
    });
}

fn bench_recolor(c: &mut Criterion) {
    let mut group = c.benchmark_group("recolor");
    let recolorer = Recolorer::new();
    let spec = RecolorSpec::new(RgbColor::new(220, 40, 40));
    let gated = spec.clone().with_source_color(RgbColor::new(60, 100, 190), 25.0);

    for (width, height) in SIZES {
        let raster = Raster::new(scene(width, height));
        let mask = rough_mask(width, height);
        let label = format!("{width}x{height}");

        group.bench_with_input(BenchmarkId::new("lab_blend", &label), &raster, |b, raster| {
            b.iter(|| recolorer.recolor(black_box(raster), &mask, &spec).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("source_gated", &label), &raster, |b, raster| {
            b.iter(|| recolorer.recolor(black_box(raster), &mask, &gated).unwrap());
        });
    }
    group.finish();
}

fn bench_classical_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("classical_segmentation");
    group.sample_size(10);
    let segmenter = ClassicalSegmenter::new(ClassicalParams::default());

    for (width, height) in SIZES {
        let raster = Raster::new(scene(width, height));
        let label = format!("{width}x{height}");

        let points = SegmentationPrompt::from_points(
            PromptSet::new()
                .with(PointPrompt::foreground(width / 2, height / 2))
                .with(PointPrompt::background(4, 4)),
        );
        group.bench_with_input(BenchmarkId::new("points", &label), &raster, |b, raster| {
            b.iter(|| segmenter.segment(black_box(raster), &points).unwrap());
        });

        let bbox = BoundingBox::new(width / 5, height / 5, width * 4 / 5, height * 4 / 5).unwrap();
        let boxed = SegmentationPrompt::from_box(bbox);
        group.bench_with_input(BenchmarkId::new("box", &label), &raster, |b, raster| {
            b.iter(|| segmenter.segment(black_box(raster), &boxed).unwrap());
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(10);

    let config = PipelineConfig::builder()
        .prefer_classical(true)
        .max_dimension(640)
        .feather_radius(3.0)
        .build()
        .unwrap();
    let pipeline = EditPipeline::new(config).unwrap();
    let token = CancellationToken::new();

    for (width, height) in [(640, 480), (1600, 1200)] {
        let bytes = png(&scene(width, height));
        let request = EditRequest::new(bytes, "image/png", RecolorSpec::parse("#2e8b57").unwrap())
            .with_prompt(SegmentationPrompt::from_points(
                PromptSet::new().with(PointPrompt::foreground(width / 2, height / 2)),
            ));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &request,
            |b, request| b.iter(|| pipeline.run(black_box(request), &token).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_refine,
    bench_shadow,
    bench_recolor,
    bench_classical_segmentation,
    bench_full_pipeline
);
criterion_main!(benches);
