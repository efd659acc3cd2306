//! Command-line configuration for mrxs-crop.
//!
//! Two subcommands are available:
//!
//! - `convert` - crop the tissue area of a slide into a PNG
//! - `info` - print slide metadata and the pyramid level table
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use mrxs_crop::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Convert(config) => { /* ... */ }
//!     Command::Info(config) => { /* ... */ }
//! }
//! ```
//!
//! Logging honours `RUST_LOG`; no other environment variables are read.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::crop::{
    ColorMode, ConvertOptions, PngCompression, PreviewSelection, RoiDetector, RoiStrategy,
    ThresholdPolarity, DEFAULT_THRESHOLD,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// mrxs-crop - Export the tissue area of an MRXS slide as a lossless PNG.
#[derive(Parser, Debug, Clone)]
#[command(name = "mrxs-crop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Crop the tissue region of a slide and save it as PNG.
    Convert(ConvertConfig),

    /// Print slide metadata and pyramid levels.
    Info(InfoConfig),
}

/// How the conversion outcome is printed on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// Summary line and timing breakdown
    #[default]
    Text,
    /// Full report as JSON
    Json,
}

// =============================================================================
// Convert Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Path to the .mrxs slide.
    pub input: PathBuf,

    /// Path of the PNG to write.
    pub output: PathBuf,

    /// Pyramid level to detect tissue on (defaults to the lowest resolution).
    #[arg(long, conflicts_with = "preview_downsample")]
    pub preview_level: Option<usize>,

    /// Detect tissue on the coarsest level not exceeding this downsample.
    #[arg(long)]
    pub preview_downsample: Option<f64>,

    /// Grayscale threshold separating background from tissue.
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: u8,

    /// Which side of the threshold is background.
    #[arg(long, value_enum, default_value_t = ThresholdPolarity::DarkBackground)]
    pub polarity: ThresholdPolarity,

    /// How the tissue box is derived from the mask.
    #[arg(long, value_enum, default_value_t = RoiStrategy::All)]
    pub strategy: RoiStrategy,

    /// Channel layout of the output PNG.
    #[arg(long, value_enum, default_value_t = ColorMode::Rgb)]
    pub color_mode: ColorMode,

    /// PNG compression effort.
    #[arg(long, value_enum, default_value_t = PngCompression::Default)]
    pub compression: PngCompression,

    /// Output format of the final report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,

    /// Hide the progress bar.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConvertConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(factor) = self.preview_downsample {
            if !factor.is_finite() || factor < 1.0 {
                return Err(format!(
                    "preview_downsample must be a finite number >= 1, got {}",
                    factor
                ));
            }
        }

        match self.output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => {}
            _ => {
                return Err(format!(
                    "output path must end in .png: {}",
                    self.output.display()
                ))
            }
        }

        RoiDetector::new(self.threshold, self.polarity, self.strategy)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Preview selection implied by the flags.
    pub fn preview(&self) -> PreviewSelection {
        match (self.preview_level, self.preview_downsample) {
            (Some(level), _) => PreviewSelection::Level(level),
            (None, Some(factor)) => PreviewSelection::Downsample(factor),
            (None, None) => PreviewSelection::Lowest,
        }
    }

    /// Build pipeline options from the parsed flags.
    pub fn to_options(&self) -> ConvertOptions {
        ConvertOptions::new(self.input.clone(), self.output.clone())
            .with_preview(self.preview())
            .with_threshold(self.threshold)
            .with_polarity(self.polarity)
            .with_strategy(self.strategy)
            .with_color_mode(self.color_mode)
            .with_compression(self.compression)
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the .mrxs slide.
    pub input: PathBuf,

    /// Print metadata as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
