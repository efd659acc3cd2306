//! Slide abstraction layer.
//!
//! This module provides a unified interface for working with Whole Slide Images
//! regardless of their underlying format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Conversion pipeline            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (levels, downsamples, read_region)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             MiraxReader                 │
//! │  (Slidedat.ini + Index.dat + Data*.dat) │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     SlideSource → RangeReader           │
//! └─────────────────────────────────────────┘
//! ```

mod reader;
mod source;

use std::path::Path;

use tracing::debug;

use crate::error::FormatError;
use crate::format::{detect_format, mirax_data_dir, MiraxReader, SlideFormat};
use crate::io::LocalFileReader;

pub use reader::{LevelInfo, SlideReader};
pub use source::{LocalSlideSource, MemorySlideSource, SlideSource};

/// Detect the format of a slide on disk and open it.
///
/// # Errors
///
/// Returns a [`FormatError`] if the path is missing, is not a supported
/// slide, or its files are corrupt.
pub async fn open_slide(path: &Path) -> Result<MiraxReader<LocalFileReader>, FormatError> {
    let format = detect_format(path).await?;
    debug!(path = %path.display(), format = format.name(), "Detected slide format");

    match format {
        SlideFormat::Mirax => {
            let source = LocalSlideSource::new(mirax_data_dir(path));
            Ok(MiraxReader::open(&source).await?)
        }
    }
}
