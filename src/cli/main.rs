//! Object recolor CLI
//!
//! Selects a region with points or a box, recolors it, and writes the result,
//! mask and metadata into the output directory.

use super::config::{
    parse_box, parse_log_format, parse_percent_box, parse_point, CliConfigBuilder,
};
use crate::{
    api::EditService,
    processor::{EditPipeline, EditRequest},
    services::{
        ConsoleProgressReporter, ContentType, ImageIOService, ProcessingStage, ProgressReporter,
        ProgressUpdate,
    },
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{ProcessingTimings, Raster, RecolorSpec, SegmentationPrompt},
    utils::{draw_prompts, OverlayStyle},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

/// Recolor a selected object in an image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "object-recolor")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input images (PNG, JPEG or WebP)
    #[arg(value_name = "INPUT", required_unless_present = "health")]
    pub input: Vec<PathBuf>,

    /// Foreground point in source pixels, `x,y` (repeatable)
    #[arg(short, long = "point", value_name = "X,Y", value_parser = parse_point)]
    pub points: Vec<(u32, u32)>,

    /// Background point in source pixels, `x,y` (repeatable)
    #[arg(long = "bg-point", value_name = "X,Y", value_parser = parse_point)]
    pub bg_points: Vec<(u32, u32)>,

    /// Bounding box in source pixels, `x1,y1,x2,y2` (exclusive max)
    #[arg(short, long = "box", value_name = "X1,Y1,X2,Y2", value_parser = parse_box)]
    pub bbox: Option<[u32; 4]>,

    /// Bounding box as percentages of the image, `left,top,right,bottom`
    #[arg(long, value_name = "L,T,R,B", value_parser = parse_percent_box, conflicts_with = "bbox")]
    pub box_percent: Option<[f32; 4]>,

    /// Target colour: `#RRGGBB`, `rgb(r,g,b)` or `rgba(r,g,b,a)`
    #[arg(short, long, default_value = "#ff0000")]
    pub color: String,

    /// Blend strength 0-1 [default: configured strength]
    #[arg(short, long)]
    pub strength: Option<f32>,

    /// Multiplier on the target chroma (0-2)
    #[arg(long, default_value_t = 1.0)]
    pub chroma_scale: f32,

    /// Only recolor pixels whose hue is close to this colour
    #[arg(long, value_name = "COLOR")]
    pub source_color: Option<String>,

    /// Hue tolerance in degrees for --source-color
    #[arg(long, value_name = "DEGREES")]
    pub hue_tolerance: Option<f32>,

    /// Morphology kernel size (0 disables open/close)
    #[arg(long)]
    pub kernel_size: Option<u32>,

    /// Closing iterations
    #[arg(long)]
    pub close: Option<u32>,

    /// Opening iterations
    #[arg(long)]
    pub open: Option<u32>,

    /// Feather radius in pixels
    #[arg(long, value_name = "PX")]
    pub feather: Option<f32>,

    /// Binarisation threshold applied before morphology
    #[arg(long, conflicts_with = "no_threshold")]
    pub mask_threshold: Option<f32>,

    /// Keep soft mask values instead of binarising
    #[arg(long)]
    pub no_threshold: bool,

    /// Grow the mask into adjacent dark shadow pixels
    #[arg(long)]
    pub shadow: bool,

    /// Shadow search distance in pixels
    #[arg(long, value_name = "PX")]
    pub shadow_dilation: Option<u32>,

    /// Directory with encoder.onnx and decoder.onnx [default: user cache dir when present]
    #[arg(short, long)]
    pub model_dir: Option<PathBuf>,

    /// Always use the classical segmenter
    #[arg(long)]
    pub prefer_classical: bool,

    /// Execution provider for the model backend (auto, cpu, cuda, coreml)
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Inference threads (0 = auto)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Longest side after loading (0 keeps full resolution)
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Output directory [default: data]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the metadata JSON
    #[arg(long)]
    pub no_metadata: bool,

    /// Also write a preview of the prompts drawn over each input
    #[arg(long)]
    pub overlay: bool,

    /// Edits run at once (0 = available parallelism)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print service health as JSON and exit
    #[arg(long)]
    pub health: bool,

    /// Log each stage instead of drawing a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Log format: console, compact or json (json needs the `tracing-json` feature)
    #[arg(long, value_name = "FORMAT", default_value = "console", value_parser = parse_log_format)]
    pub log_format: TracingFormat,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// With --log-file, stop logging to the console
    #[cfg(feature = "tracing-files")]
    #[arg(long, requires = "log_file")]
    pub log_file_only: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Shows stage changes on the shared progress bar
struct BarProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        self.bar.inc(1);
        debug!(total_ms = timings.total_ms, "Edit finished");
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar.inc(1);
        self.bar
            .println(format!("❌ {} failed: {error}", stage.description()));
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(bar)
}

async fn read_request(
    cli: &Cli,
    input: &Path,
    spec: &RecolorSpec,
) -> Result<(EditRequest, SegmentationPrompt)> {
    let content_type = input
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ContentType::from_extension)
        .with_context(|| format!("Unsupported file extension: {}", input.display()))?;
    let prompt = CliConfigBuilder::prompt_for(cli, input)?;
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let request =
        EditRequest::new(bytes, content_type.mime(), spec.clone()).with_prompt(prompt.clone());
    Ok((request, prompt))
}

fn write_overlay(input: &Path, prompt: &SegmentationPrompt, output_dir: &Path) -> Result<PathBuf> {
    let source = image::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .to_rgba8();
    let preview = draw_prompts(
        &Raster::new(source),
        &prompt.points,
        prompt.bbox.as_ref(),
        OverlayStyle::default(),
    );
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    let path = output_dir.join(format!("{stem}_prompts.png"));
    ImageIOService::save_png(&preview, &path)?;
    Ok(path)
}

/// CLI entry point
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();
    let _guard = init_cli_tracing(CliConfigBuilder::tracing_config(&cli, &session_id))
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli)?;
    let config = CliConfigBuilder::from_cli(&cli)?;

    if cli.health {
        let service = EditService::new(EditPipeline::new(config)?);
        println!("{}", serde_json::to_string_pretty(&service.health())?);
        return Ok(());
    }

    let spec = CliConfigBuilder::recolor_spec(&cli, &config)?;
    let strategy = if config.wants_model() { "model" } else { "classical" };
    let session = spans::session(&session_id, strategy);
    let output_dir = config.export.output_dir.clone();
    let start = Instant::now();

    let mut jobs = Vec::with_capacity(cli.input.len());
    for input in &cli.input {
        let (request, prompt) = read_request(&cli, input, &spec).await?;
        if cli.overlay {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            let path = write_overlay(input, &prompt, &output_dir)?;
            info!("🖍️  Prompt preview: {}", path.display());
        }
        jobs.push((input.clone(), request));
    }

    let bar = if cli.no_progress {
        None
    } else {
        Some(progress_bar(jobs.len())?)
    };
    let reporter: Arc<dyn ProgressReporter> = match &bar {
        Some(bar) => Arc::new(BarProgressReporter { bar: bar.clone() }),
        None => Arc::new(ConsoleProgressReporter::new(cli.verbose > 0)),
    };
    let pipeline = EditPipeline::new(config)?.with_progress_reporter(reporter);
    let service = EditService::new(pipeline);
    info!(
        "🎨 Recoloring {} image(s) to {} using the {} segmenter",
        jobs.len(),
        spec.target,
        strategy
    );

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling pending edits");
                cancel.cancel();
            }
        })
    };

    let outcomes = join_all(jobs.into_iter().map(|(input, request)| {
        let span = spans::edit(&input, &spec.target.to_hex());
        let service = &service;
        let cancel = cancel.child_token();
        async move { (input, service.edit_and_export(request, cancel).await) }.instrument(span)
    }))
    .instrument(session)
    .await;
    watcher.abort();
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let mut failed = 0usize;
    for (input, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                println!("{}", outcome.files.result.display());
                info!("✅ {} → {}", input.display(), outcome.files.result.display());
                info!("   mask: {}", outcome.files.mask.display());
                if let Some(metadata) = &outcome.files.metadata {
                    info!("   metadata: {}", metadata.display());
                }
                debug!("{}", outcome.result.timing_summary());
            },
            Err(e) => {
                failed += 1;
                error!("❌ {}: {e}", input.display());
            },
        }
    }

    info!(
        "Finished {} image(s) in {:.2}s",
        cli.input.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        bail!("{failed} of {} edits failed", cli.input.len());
    }
    Ok(())
}
