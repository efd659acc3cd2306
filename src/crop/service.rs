//! Conversion pipeline.
//!
//! The [`Converter`] runs the whole slide-to-PNG conversion:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Converter                           │
//! │                                                              │
//! │  1. Open slide        4. Rescale box to level 0              │
//! │  2. Read preview      5. Read full-resolution region         │
//! │  3. Detect tissue     6. Colour mode + PNG write             │
//! │                                                              │
//! │      │                     │                      │          │
//! │      ▼                     ▼                      ▼          │
//! │ ┌────────────┐     ┌───────────────┐     ┌────────────────┐  │
//! │ │ SlideReader│     │  RoiDetector  │     │ PngCropEncoder │  │
//! │ └────────────┘     └───────────────┘     └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run strictly in order and the first failure aborts the run. Every
//! error is tagged with the [`Stage`] it came from.

use std::path::PathBuf;
use std::time::Instant;

use image::DynamicImage;
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::error::{AtStage, ConvertError, PipelineError, Stage};
use crate::slide::{open_slide, SlideReader};

use super::detect::{RoiDetector, RoiStrategy, ThresholdPolarity, DEFAULT_THRESHOLD};
use super::encoder::{ColorMode, PngCompression, PngCropEncoder};
use super::extract::extract_region;
use super::report::{ConversionReport, StageTimings};
use super::rescale::rescale_box;

/// Progress units per stage; they sum to 100.
const PROGRESS_OPEN: u64 = 10;
const PROGRESS_DETECTION: u64 = 15;
const PROGRESS_COORDINATES: u64 = 15;
const PROGRESS_READING: u64 = 30;
const PROGRESS_PROCESSING: u64 = 20;
const PROGRESS_SAVING: u64 = 10;
const PROGRESS_TOTAL: u64 = 100;

// =============================================================================
// Options
// =============================================================================

/// Which pyramid level tissue detection runs on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PreviewSelection {
    /// The lowest-resolution level
    #[default]
    Lowest,
    /// An explicit level index
    Level(usize),
    /// The coarsest level whose downsample does not exceed this factor
    Downsample(f64),
}

/// Everything a conversion needs to know.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub preview: PreviewSelection,
    pub threshold: u8,
    pub polarity: ThresholdPolarity,
    pub strategy: RoiStrategy,
    pub color_mode: ColorMode,
    pub compression: PngCompression,
}

impl ConvertOptions {
    /// Options with every tunable at its default.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            preview: PreviewSelection::default(),
            threshold: DEFAULT_THRESHOLD,
            polarity: ThresholdPolarity::default(),
            strategy: RoiStrategy::default(),
            color_mode: ColorMode::default(),
            compression: PngCompression::default(),
        }
    }

    pub fn with_preview(mut self, preview: PreviewSelection) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_polarity(mut self, polarity: ThresholdPolarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_strategy(mut self, strategy: RoiStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    pub fn with_compression(mut self, compression: PngCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Build the detector these options describe.
    pub fn detector(&self) -> Result<RoiDetector, ConvertError> {
        RoiDetector::new(self.threshold, self.polarity, self.strategy)
    }
}

// =============================================================================
// Converter
// =============================================================================

/// Runs one slide-to-PNG conversion.
///
/// # Example
///
/// ```ignore
/// use mrxs_crop::crop::{ConvertOptions, Converter};
///
/// let options = ConvertOptions::new("slide.mrxs", "tissue.png");
/// let report = Converter::new(options).run().await?;
/// println!("{}", report.summary());
/// ```
pub struct Converter {
    options: ConvertOptions,
    encoder: PngCropEncoder,
    progress: ProgressBar,
}

impl Converter {
    /// Create a converter with a hidden progress bar.
    pub fn new(options: ConvertOptions) -> Self {
        let encoder = PngCropEncoder::new(options.compression);
        Self {
            options,
            encoder,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report stage progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_length(PROGRESS_TOTAL);
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Open the input slide and convert it.
    ///
    /// Options and the output directory are checked before the slide is
    /// opened, so a bad destination fails without reading any pixels.
    pub async fn run(&self) -> Result<ConversionReport, PipelineError> {
        let result = self.run_inner().await;
        self.finish(&result);
        result
    }

    /// Convert an already opened slide.
    pub async fn run_with_slide<S: SlideReader>(
        &self,
        slide: S,
    ) -> Result<ConversionReport, PipelineError> {
        let started = Instant::now();
        let result = match self.prepare() {
            Ok(detector) => {
                self.progress.inc(PROGRESS_OPEN);
                self.convert(slide, detector, started, 0.0).await
            }
            Err(e) => Err(e),
        };
        self.finish(&result);
        result
    }

    async fn run_inner(&self) -> Result<ConversionReport, PipelineError> {
        let started = Instant::now();
        let detector = self.prepare()?;

        self.progress.set_message("Opening slide");
        let input = &self.options.input;
        info!(path = %input.display(), "Opening slide");
        let slide = open_slide(input)
            .await
            .map_err(|source| ConvertError::OpenFailure {
                path: input.display().to_string(),
                source,
            })
            .at(Stage::Open)?;
        let open = started.elapsed().as_secs_f64();

        if let Some((width, height)) = slide.dimensions() {
            info!(
                slide_id = slide.slide_id(),
                width,
                height,
                levels = slide.level_count(),
                "Slide opened"
            );
        }
        self.progress.inc(PROGRESS_OPEN);

        self.convert(slide, detector, started, open).await
    }

    /// Validate options and destination ahead of any slide I/O.
    fn prepare(&self) -> Result<RoiDetector, PipelineError> {
        let detector = self.options.detector().at(Stage::Detection)?;
        PngCropEncoder::check_destination(&self.options.output).at(Stage::Saving)?;
        Ok(detector)
    }

    fn finish(&self, result: &Result<ConversionReport, PipelineError>) {
        match result {
            Ok(report) => self.progress.finish_with_message(report.summary()),
            Err(e) => self.progress.abandon_with_message(format!("Failed: {}", e.stage)),
        }
    }

    async fn convert<S: SlideReader>(
        &self,
        slide: S,
        detector: RoiDetector,
        started: Instant,
        open: f64,
    ) -> Result<ConversionReport, PipelineError> {
        let mut timings = StageTimings {
            open,
            ..StageTimings::default()
        };

        // Detection on the preview level
        self.progress.set_message("Detecting tissue");
        let t = Instant::now();
        let preview_level = self.select_preview_level(&slide).at(Stage::Detection)?;
        let (preview_width, preview_height) = slide
            .level_dimensions(preview_level)
            .ok_or_else(|| {
                ConvertError::InvalidInput(format!("level {} has no dimensions", preview_level))
            })
            .at(Stage::Detection)?;
        debug!(
            level = preview_level,
            width = preview_width,
            height = preview_height,
            "Reading preview"
        );
        let preview = slide
            .read_region(preview_level, (0, 0), (preview_width, preview_height))
            .await
            .at(Stage::Detection)?;
        let preview_box = detector
            .detect(&DynamicImage::ImageRgba8(preview))
            .at(Stage::Detection)?
            .ok_or_else(|| ConvertError::DegenerateRegion("no tissue detected".to_string()))
            .at(Stage::Detection)?;

        let full_frame = preview_box.is_full_frame(preview_width, preview_height);
        if full_frame {
            info!("Tissue covers the whole preview, exporting the full slide");
        }
        info!(region = %preview_box, level = preview_level, "Tissue detected");
        timings.detection = t.elapsed().as_secs_f64();
        self.progress.inc(PROGRESS_DETECTION);

        // Preview box to level 0
        self.progress.set_message("Calculating coordinates");
        let t = Instant::now();
        let downsample = slide
            .level_downsample(preview_level)
            .ok_or_else(|| {
                ConvertError::InvalidInput(format!("level {} has no downsample", preview_level))
            })
            .at(Stage::CoordinateCalc)?;
        let full = slide
            .dimensions()
            .ok_or_else(|| ConvertError::InvalidInput("slide has no levels".to_string()))
            .at(Stage::CoordinateCalc)?;
        let region = rescale_box(&preview_box, downsample, full).at(Stage::CoordinateCalc)?;
        info!(region = %region, downsample, "Full-resolution region");
        timings.coordinate_calc = t.elapsed().as_secs_f64();
        self.progress.inc(PROGRESS_COORDINATES);

        // Full-resolution read
        self.progress.set_message("Reading full-resolution region");
        let t = Instant::now();
        let pixels = extract_region(&slide, &region)
            .await
            .at(Stage::ImageReading)?;
        drop(slide);
        timings.image_reading = t.elapsed().as_secs_f64();
        self.progress.inc(PROGRESS_READING);

        self.progress.set_message("Processing image");
        let t = Instant::now();
        let image = self.options.color_mode.apply(pixels);
        PngCropEncoder::check_supported(&image).at(Stage::Processing)?;
        timings.processing = t.elapsed().as_secs_f64();
        self.progress.inc(PROGRESS_PROCESSING);

        self.progress.set_message("Saving PNG");
        let t = Instant::now();
        let output = &self.options.output;
        let bytes_written = self.encoder.write(&image, output).at(Stage::Saving)?;
        timings.saving = t.elapsed().as_secs_f64();
        self.progress.inc(PROGRESS_SAVING);

        timings.total = started.elapsed().as_secs_f64();
        info!(
            path = %output.display(),
            width = image.width(),
            height = image.height(),
            bytes = bytes_written,
            seconds = timings.total,
            "Saved cropped image"
        );

        Ok(ConversionReport {
            input: self.options.input.clone(),
            output: output.clone(),
            preview_level,
            preview_width,
            preview_height,
            downsample,
            threshold: detector.threshold(),
            polarity: detector.polarity(),
            strategy: detector.strategy(),
            preview_box,
            region,
            full_frame,
            output_width: image.width(),
            output_height: image.height(),
            color_mode: self.options.color_mode,
            compression: self.encoder.compression(),
            bytes_written,
            timings,
        })
    }

    fn select_preview_level<S: SlideReader>(&self, slide: &S) -> Result<usize, ConvertError> {
        let count = slide.level_count();
        if count == 0 {
            return Err(ConvertError::InvalidInput("slide has no levels".to_string()));
        }

        match self.options.preview {
            PreviewSelection::Lowest => Ok(count - 1),
            PreviewSelection::Level(level) if level < count => Ok(level),
            PreviewSelection::Level(level) => Err(ConvertError::InvalidInput(format!(
                "preview level {} out of range (slide has {} levels)",
                level, count
            ))),
            PreviewSelection::Downsample(factor) if factor.is_finite() && factor > 0.0 => slide
                .best_level_for_downsample(factor)
                .ok_or_else(|| {
                    ConvertError::InvalidInput(format!("no level for downsample {}", factor))
                }),
            PreviewSelection::Downsample(factor) => Err(ConvertError::InvalidInput(format!(
                "preview downsample must be finite and positive, got {}",
                factor
            ))),
        }
    }
}
