//! Tissue cropping pipeline.
//!
//! This module turns an opened slide into a PNG of its tissue area:
//!
//! - [`RoiDetector`]: threshold a low-resolution preview and find the tissue box
//! - [`rescale_box`]: map the preview box onto level-0 pixels
//! - [`extract_region`]: read the level-0 region
//! - [`PngCropEncoder`]: write the pixels losslessly
//! - [`Converter`]: run the stages in order and report the outcome

mod detect;
mod encoder;
mod extract;
mod region;
mod report;
mod rescale;
mod service;

pub use detect::{RoiDetector, RoiStrategy, ThresholdPolarity, DEFAULT_THRESHOLD};
pub use encoder::{ColorMode, PngCompression, PngCropEncoder};
pub use extract::extract_region;
pub use region::BoundingBox;
pub use report::{ConversionReport, StageTimings};
pub use rescale::rescale_box;
pub use service::{ConvertOptions, Converter, PreviewSelection};
