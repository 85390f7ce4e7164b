//! Conversion of CLI arguments into pipeline types

use crate::cli::main_impl::Cli;
use crate::{
    color::RgbColor,
    config::{ExecutionProvider, PipelineConfig},
    models::ModelManager,
    tracing_config::{TracingConfig, TracingFormat},
    types::{BoundingBox, PointPrompt, PromptSet, RecolorSpec, SegmentationPrompt},
};
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Parse `x,y`
pub(crate) fn parse_point(value: &str) -> std::result::Result<(u32, u32), String> {
    let parts = split_numbers::<u32>(value, 2)?;
    Ok((parts[0], parts[1]))
}

/// Parse `x1,y1,x2,y2`
pub(crate) fn parse_box(value: &str) -> std::result::Result<[u32; 4], String> {
    let parts = split_numbers::<u32>(value, 4)?;
    Ok([parts[0], parts[1], parts[2], parts[3]])
}

/// Parse `left,top,right,bottom` percentages
pub(crate) fn parse_percent_box(value: &str) -> std::result::Result<[f32; 4], String> {
    let parts = split_numbers::<f32>(value, 4)?;
    if parts.iter().any(|p| !(0.0..=100.0).contains(p)) {
        return Err(format!("'{value}': percentages must be within 0-100"));
    }
    Ok([parts[0], parts[1], parts[2], parts[3]])
}

/// Parse a log format name
pub(crate) fn parse_log_format(value: &str) -> std::result::Result<TracingFormat, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "console" => Ok(TracingFormat::Console),
        "compact" => Ok(TracingFormat::Compact),
        #[cfg(feature = "tracing-json")]
        "json" => Ok(TracingFormat::Json),
        other => Err(format!("unknown log format '{other}'")),
    }
}

fn split_numbers<T: std::str::FromStr>(
    value: &str,
    count: usize,
) -> std::result::Result<Vec<T>, String> {
    let parts: Vec<T> = value
        .split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| format!("'{value}' is not {count} comma-separated numbers"))?;
    if parts.len() != count {
        return Err(format!(
            "'{value}' has {} values, expected {count}",
            parts.len()
        ));
    }
    Ok(parts)
}

/// Converts CLI arguments to pipeline configuration and requests
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Subscriber settings from `-v`, `--log-format` and `--log-file`
    pub(crate) fn tracing_config(cli: &Cli, session_id: &str) -> TracingConfig {
        let config = TracingConfig::new()
            .with_verbosity(cli.verbose)
            .with_format(cli.log_format)
            .with_session_id(session_id);
        #[cfg(feature = "tracing-files")]
        let config = match &cli.log_file {
            Some(path) if cli.log_file_only => {
                config.with_output(crate::tracing_config::TracingOutput::File(path.clone()))
            },
            Some(path) => config.with_output(crate::tracing_config::TracingOutput::Both(path.clone())),
            None => config,
        };
        config
    }

    /// Pipeline configuration: `--config` file or environment, then flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?,
            None => PipelineConfig::from_env().context("Invalid environment configuration")?,
        };

        if let Some(max) = cli.max_dimension {
            config.loader.max_dimension = max;
        }

        let segmenter = &mut config.segmenter;
        if let Some(dir) = &cli.model_dir {
            segmenter.model_dir = Some(dir.clone());
        } else if segmenter.model_dir.is_none() {
            segmenter.model_dir = ModelManager::default_model_dir();
        }
        segmenter.prefer_classical |= cli.prefer_classical;
        if let Some(provider) = &cli.execution_provider {
            segmenter.execution_provider = provider
                .parse::<ExecutionProvider>()
                .context("Invalid --execution-provider")?;
        }
        if let Some(threads) = cli.threads {
            segmenter.intra_threads = threads;
        }

        let refine = &mut config.refine;
        if let Some(size) = cli.kernel_size {
            refine.kernel_size = size;
        }
        if let Some(close) = cli.close {
            refine.close_iterations = close;
        }
        if let Some(open) = cli.open {
            refine.open_iterations = open;
        }
        if let Some(radius) = cli.feather {
            refine.feather_radius = radius;
        }
        if cli.no_threshold {
            refine.mask_threshold = None;
        } else if let Some(threshold) = cli.mask_threshold {
            refine.mask_threshold = Some(threshold);
        }

        if cli.shadow {
            config.shadow.enabled = true;
        }
        if let Some(px) = cli.shadow_dilation {
            config.shadow.dilation_px = px;
        }

        if let Some(dir) = &cli.output_dir {
            config.export.output_dir = dir.clone();
        }
        if cli.no_metadata {
            config.export.write_metadata = false;
        }
        if let Some(jobs) = cli.jobs {
            config.concurrency.max_concurrent_edits = jobs;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Recolor parameters; unset values fall back to the configured defaults
    pub(crate) fn recolor_spec(cli: &Cli, config: &PipelineConfig) -> Result<RecolorSpec> {
        let mut spec = RecolorSpec::parse(&cli.color)
            .with_context(|| format!("Invalid --color '{}'", cli.color))?
            .with_strength(cli.strength.unwrap_or(config.recolor.strength))
            .with_chroma_scale(cli.chroma_scale);
        spec.hue_tolerance_degrees = config.recolor.hue_tolerance_degrees;

        if let Some(source) = &cli.source_color {
            let source = RgbColor::parse(source)
                .with_context(|| format!("Invalid --source-color '{source}'"))?;
            let tolerance = cli
                .hue_tolerance
                .unwrap_or(config.recolor.hue_tolerance_degrees);
            spec = spec.with_source_color(source, tolerance);
        }
        spec.validate().context("Invalid recolor parameters")?;
        Ok(spec)
    }

    /// Segmentation prompt for one input
    ///
    /// Percentage boxes need the source dimensions, which are read from the
    /// image header without decoding pixels.
    pub(crate) fn prompt_for(cli: &Cli, input: &Path) -> Result<SegmentationPrompt> {
        let mut points = PromptSet::new();
        for &(x, y) in &cli.points {
            points.push(PointPrompt::foreground(x, y));
        }
        for &(x, y) in &cli.bg_points {
            points.push(PointPrompt::background(x, y));
        }
        let mut prompt = SegmentationPrompt::from_points(points);

        if let Some([x1, y1, x2, y2]) = cli.bbox {
            prompt = prompt.with_box(BoundingBox::new(x1, y1, x2, y2).context("Invalid --box")?);
        } else if let Some([left, top, right, bottom]) = cli.box_percent {
            let (width, height) = image::image_dimensions(input)
                .with_context(|| format!("Failed to read dimensions of {}", input.display()))?;
            let bbox = BoundingBox::from_percent(left, top, right, bottom, width, height)
                .context("Invalid --box-percent")?;
            prompt = prompt.with_box(bbox);
        }
        Ok(prompt)
    }

    /// Reject flag combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.health {
            return Ok(());
        }
        if cli.input.is_empty() {
            bail!("No input images given");
        }
        let has_prompt = !cli.points.is_empty() || cli.bbox.is_some() || cli.box_percent.is_some();
        if !has_prompt {
            bail!("Select a region with --point, --box or --box-percent");
        }
        if cli.hue_tolerance.is_some() && cli.source_color.is_none() {
            bail!("--hue-tolerance only applies together with --source-color");
        }
        Ok(())
    }
}
