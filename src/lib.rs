//! # mrxs-crop
//!
//! Export the tissue area of a MIRAX (`.mrxs`) Whole Slide Image as a
//! lossless PNG at full resolution.
//!
//! Slides are mostly empty scanner background around a comparatively small
//! piece of tissue. The converter finds the tissue on a low-resolution
//! pyramid level, maps that box back to level 0 and writes only those pixels.
//!
//! ## Features
//!
//! - **Native MIRAX reader**: parses `Slidedat.ini` and `Index.dat` and decodes
//!   JPEG/PNG/BMP tiles from the data files, no external libraries required
//! - **Tissue detection**: fixed-threshold mask with either an all-pixels or a
//!   largest-contour bounding box
//! - **Lossless output**: PNG written atomically through a temporary file
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Range readers over local files and an LRU block cache
//! - [`mod@format`] - Format detection and the MIRAX parser
//! - [`slide`] - Format-agnostic slide abstraction
//! - [`crop`] - Detection, rescaling, extraction, PNG encoding and the converter
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mrxs_crop::{ConvertOptions, Converter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let options = ConvertOptions::new("slide.mrxs", "tissue.png").with_threshold(20);
//!
//!     match Converter::new(options).run().await {
//!         Ok(report) => println!("{}", report.summary()),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod crop;
pub mod error;
pub mod format;
pub mod io;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, Command, ConvertConfig, InfoConfig, ReportFormat};
pub use crop::{
    extract_region, rescale_box, BoundingBox, ColorMode, ConversionReport, ConvertOptions,
    Converter, PngCompression, PngCropEncoder, PreviewSelection, RoiDetector, RoiStrategy,
    StageTimings, ThresholdPolarity,
};
pub use error::{ConvertError, FormatError, IoError, PipelineError, SlideError, Stage};
pub use format::{detect_format, MiraxReader, SlideFormat, SlideProperties};
pub use io::{BlockCache, LocalFileReader, MemoryReader, RangeReader};
pub use slide::{open_slide, LevelInfo, LocalSlideSource, MemorySlideSource, SlideReader, SlideSource};
