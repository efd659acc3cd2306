//! mrxs-crop - Export the tissue area of an MRXS slide as a lossless PNG.
//!
//! This binary parses the command line, sets up logging and runs the
//! conversion pipeline or the metadata dump.

use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mrxs_crop::{
    config::{Cli, Command, ConvertConfig, InfoConfig, ReportFormat},
    crop::{ConversionReport, Converter},
    error::ConvertError,
    format::SlideProperties,
    slide::{open_slide, LevelInfo, SlideReader},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config).await,
        Command::Info(config) => run_info(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mrxs_crop=debug"
    } else {
        "mrxs_crop=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Convert Command
// =============================================================================

async fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::from(ConvertError::InvalidInput(e).exit_code());
    }

    info!("Input:  {}", config.input.display());
    info!("Output: {}", config.output.display());

    let progress = if config.no_progress {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };

    let converter = Converter::new(config.to_options()).with_progress(progress);
    match converter.run().await {
        Ok(report) => print_report(&report, config.report),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn print_report(report: &ConversionReport, format: ReportFormat) -> ExitCode {
    match format {
        ReportFormat::Json => print_json(report),
        ReportFormat::Text => {
            println!("{}", report.summary());
            println!();
            println!(
                "Preview level {} ({}x{}), downsample {}",
                report.preview_level, report.preview_width, report.preview_height, report.downsample
            );
            println!("Preview box:     {}", report.preview_box);
            println!("Full-res region: {}", report.region);
            println!("Written:         {} bytes", report.bytes_written);
            println!();
            println!("Timing");
            println!("──────────────────────────────");
            let total = report.timings.total;
            for (label, seconds) in report.timings.stages() {
                let share = if total > 0.0 {
                    seconds / total * 100.0
                } else {
                    0.0
                };
                println!("  {:<16} {:>8.3}s {:>5.1}%", label, seconds, share);
            }
            println!("──────────────────────────────");
            println!("  {:<16} {:>8.3}s", "Total", total);
            ExitCode::SUCCESS
        }
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct SlideInfo {
    format: &'static str,
    width: u32,
    height: u32,
    properties: SlideProperties,
    levels: Vec<LevelRow>,
}

#[derive(Serialize)]
struct LevelRow {
    level: usize,
    #[serde(flatten)]
    info: LevelInfo,
    stored_tiles: usize,
}

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    let slide = match open_slide(&config.input).await {
        Ok(slide) => slide,
        Err(source) => {
            let e = ConvertError::OpenFailure {
                path: config.input.display().to_string(),
                source,
            };
            error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let (width, height) = slide.dimensions().unwrap_or((0, 0));
    let levels: Vec<LevelRow> = (0..slide.level_count())
        .filter_map(|level| {
            Some(LevelRow {
                level,
                info: slide.level_info(level)?,
                stored_tiles: slide.stored_tile_count(level)?,
            })
        })
        .collect();
    let info = SlideInfo {
        format: "MIRAX",
        width,
        height,
        properties: slide.properties(),
        levels,
    };

    if config.json {
        return print_json(&info);
    }

    let props = &info.properties;
    println!("Slide:        {}", config.input.display());
    println!("Format:       {}", info.format);
    println!("Slide ID:     {}", props.slide_id);
    println!("Dimensions:   {}x{}", info.width, info.height);
    println!(
        "Camera grid:  {}x{} images, {} divisions",
        props.images_across, props.images_down, props.camera_divisions
    );
    println!("Tile format:  {}", props.tile_format);
    if let (Some(x), Some(y)) = (props.mpp_x, props.mpp_y) {
        println!("Resolution:   {:.4} x {:.4} µm/px", x, y);
    }
    if let Some(ref color) = props.background_color {
        println!("Background:   {}", color);
    }
    println!("Data files:   {}", props.data_files);
    println!();
    println!(
        "{:>5}  {:>12}  {:>10}  {:>9}  {:>8}",
        "Level", "Dimensions", "Downsample", "Tile", "Tiles"
    );
    for row in &info.levels {
        println!(
            "{:>5}  {:>12}  {:>10}  {:>9}  {:>8}",
            row.level,
            format!("{}x{}", row.info.width, row.info.height),
            row.info.downsample,
            format!("{}x{}", row.info.tile_width, row.info.tile_height),
            row.stored_tiles
        );
    }

    ExitCode::SUCCESS
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}
