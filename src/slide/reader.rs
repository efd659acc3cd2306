//! SlideReader trait for format-agnostic slide access.
//!
//! The conversion pipeline only talks to this trait, so it runs the same
//! against a parsed MIRAX slide and against synthetic slides in tests.

use async_trait::async_trait;
use image::RgbaImage;
use serde::Serialize;

use crate::error::SlideError;

// =============================================================================
// Level Information
// =============================================================================

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Width of each stored tile in pixels
    pub tile_width: u32,

    /// Height of each stored tile in pixels
    pub tile_height: u32,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 2.0, etc.
    pub downsample: f64,
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-agnostic interface to an opened multi-resolution slide.
///
/// Level 0 is always the full-resolution image. Metadata queries are
/// synchronous; pixel reads go through [`SlideReader::read_region`].
#[async_trait]
pub trait SlideReader: Send + Sync {
    /// Get the number of pyramid levels.
    fn level_count(&self) -> usize;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Get the downsample factor for a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Get the stored tile size for a level.
    fn tile_size(&self, level: usize) -> Option<(u32, u32)>;

    /// Get dimensions of the full-resolution (level 0) image.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    /// Get complete information about a level.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let (tile_width, tile_height) = self.tile_size(level)?;
        let downsample = self.level_downsample(level)?;

        Some(LevelInfo {
            width,
            height,
            tile_width,
            tile_height,
            downsample,
        })
    }

    /// Find the best level for a given downsample factor.
    ///
    /// Returns the level with the largest downsample that does not exceed
    /// `downsample`, so the result is never coarser than requested. Factors
    /// below 1.0 select level 0. Returns `None` for an empty pyramid or a
    /// non-finite factor.
    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        if !downsample.is_finite() || self.level_count() == 0 {
            return None;
        }

        let mut best = 0;
        for level in 1..self.level_count() {
            match self.level_downsample(level) {
                Some(d) if d <= downsample => best = level,
                _ => break,
            }
        }
        Some(best)
    }

    /// Read a region as RGBA pixels.
    ///
    /// # Arguments
    ///
    /// * `level` - Pyramid level to read from
    /// * `origin` - Top-left corner in level-0 coordinates
    /// * `size` - `(width, height)` in pixels of the requested level
    ///
    /// Areas of the slide without stored image data are transparent black.
    async fn read_region(
        &self,
        level: usize,
        origin: (u32, u32),
        size: (u32, u32),
    ) -> Result<RgbaImage, SlideError>;
}

// =============================================================================
// Tests
// =============================================================================
