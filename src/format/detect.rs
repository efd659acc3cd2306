//! Format detection for Whole Slide Image files.
//!
//! Detection is path based: MIRAX keeps its pixel data in a directory next
//! to the `.mrxs` file, so the marker file alone says little. A slide is
//! recognised when the extension matches and the data directory carries a
//! `Slidedat.ini`.

use std::path::{Path, PathBuf};

use crate::error::{FormatError, IoError};

use super::mirax::SLIDEDAT_FILE;

/// Extension of MIRAX marker files (compared case-insensitively).
pub const MIRAX_EXTENSION: &str = "mrxs";

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// 3DHISTECH MIRAX (`.mrxs` + data directory)
    Mirax,
}

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::Mirax => "MIRAX",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Directory holding a MIRAX slide's data: the marker path without extension.
pub fn mirax_data_dir(path: &Path) -> PathBuf {
    path.with_extension("")
}

/// Detect the format of a slide file.
///
/// # Errors
///
/// - [`IoError::NotFound`] if the path or the slide's data files are missing
/// - [`FormatError::UnsupportedFormat`] for anything that is not a MIRAX slide
pub async fn detect_format(path: &Path) -> Result<SlideFormat, FormatError> {
    let display = path.display().to_string();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| IoError::from_std(display.clone(), e))?;

    if !metadata.is_file() {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("{} is not a file", display),
        });
    }

    let is_mirax = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(MIRAX_EXTENSION))
        .unwrap_or(false);
    if !is_mirax {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("{} does not have a .{} extension", display, MIRAX_EXTENSION),
        });
    }

    let slidedat = mirax_data_dir(path).join(SLIDEDAT_FILE);
    let found = tokio::fs::try_exists(&slidedat)
        .await
        .map_err(|e| IoError::from_std(slidedat.display().to_string(), e))?;
    if !found {
        return Err(IoError::NotFound(slidedat.display().to_string()).into());
    }

    Ok(SlideFormat::Mirax)
}
