use std::path::PathBuf;

use serde::Serialize;

use super::detect::{RoiStrategy, ThresholdPolarity};
use super::encoder::{ColorMode, PngCompression};
use super::BoundingBox;

/// Wall-clock seconds spent in each pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub open: f64,
    pub detection: f64,
    pub coordinate_calc: f64,
    pub image_reading: f64,
    pub processing: f64,
    pub saving: f64,
    pub total: f64,
}

impl StageTimings {
    /// `(label, seconds)` pairs in pipeline order, excluding the total.
    pub fn stages(&self) -> [(&'static str, f64); 6] {
        [
            ("Open", self.open),
            ("Detection", self.detection),
            ("Coordinate calc", self.coordinate_calc),
            ("Image reading", self.image_reading),
            ("Processing", self.processing),
            ("Saving", self.saving),
        ]
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,

    /// Level the tissue box was detected on
    pub preview_level: usize,
    pub preview_width: u32,
    pub preview_height: u32,

    /// Level-0 pixels per preview pixel
    pub downsample: f64,

    pub threshold: u8,
    pub polarity: ThresholdPolarity,
    pub strategy: RoiStrategy,

    /// Box found on the preview
    pub preview_box: BoundingBox,

    /// Box read at full resolution
    pub region: BoundingBox,

    /// Detection covered the whole preview
    pub full_frame: bool,

    pub output_width: u32,
    pub output_height: u32,
    pub color_mode: ColorMode,
    pub compression: PngCompression,
    pub bytes_written: u64,

    pub timings: StageTimings,
}

impl ConversionReport {
    /// One-line success message.
    pub fn summary(&self) -> String {
        format!(
            "Successfully saved {}x{} cropped image (original size)",
            self.output_width, self.output_height
        )
    }
}
