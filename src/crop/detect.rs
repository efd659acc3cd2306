//! Tissue region detection on a low-resolution preview.
//!
//! The preview is converted to 8-bit grayscale and split into tissue and
//! background with a fixed threshold. Scanner background is usually the
//! black "no data" area around the scanned tissue, so the default polarity
//! treats dark pixels as background.

use clap::ValueEnum;
use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use serde::Serialize;
use tracing::debug;

use crate::error::ConvertError;

use super::BoundingBox;

/// Default background threshold: anything brighter than this is tissue.
pub const DEFAULT_THRESHOLD: u8 = 10;

/// Mask value for tissue pixels.
const TISSUE: u8 = 255;

/// Which side of the threshold counts as background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdPolarity {
    /// Background is dark: tissue iff `gray > threshold`
    #[default]
    DarkBackground,
    /// Background is bright: tissue iff `gray < threshold`
    LightBackground,
}

/// How the tissue box is derived from the thresholded mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoiStrategy {
    /// Enclose every tissue pixel
    #[default]
    All,
    /// Enclose only the largest external contour
    LargestContour,
}

/// Threshold-based region-of-interest detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiDetector {
    threshold: u8,
    polarity: ThresholdPolarity,
    strategy: RoiStrategy,
}

impl Default for RoiDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            polarity: ThresholdPolarity::DarkBackground,
            strategy: RoiStrategy::All,
        }
    }
}

impl RoiDetector {
    /// Create a detector.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidInput`] if no 8-bit intensity could ever be
    /// classified as tissue (255 with dark background, 0 with light
    /// background).
    pub fn new(
        threshold: u8,
        polarity: ThresholdPolarity,
        strategy: RoiStrategy,
    ) -> Result<Self, ConvertError> {
        let usable = match polarity {
            ThresholdPolarity::DarkBackground => threshold < u8::MAX,
            ThresholdPolarity::LightBackground => threshold > u8::MIN,
        };
        if !usable {
            return Err(ConvertError::InvalidInput(format!(
                "threshold {} leaves no tissue intensities with {:?}",
                threshold, polarity
            )));
        }

        Ok(Self {
            threshold,
            polarity,
            strategy,
        })
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn polarity(&self) -> ThresholdPolarity {
        self.polarity
    }

    pub fn strategy(&self) -> RoiStrategy {
        self.strategy
    }

    /// Classify one grayscale intensity.
    #[inline]
    pub fn is_tissue(&self, gray: u8) -> bool {
        match self.polarity {
            ThresholdPolarity::DarkBackground => gray > self.threshold,
            ThresholdPolarity::LightBackground => gray < self.threshold,
        }
    }

    /// Binary mask: 255 for tissue, 0 for background.
    pub fn mask(&self, gray: &GrayImage) -> GrayImage {
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if self.is_tissue(gray.get_pixel(x, y)[0]) {
                Luma([TISSUE])
            } else {
                Luma([0])
            }
        })
    }

    /// Detect the tissue bounding box of a preview image.
    ///
    /// Returns `Ok(None)` when no pixel is classified as tissue.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidInput`] if the preview has zero area.
    pub fn detect(&self, preview: &DynamicImage) -> Result<Option<BoundingBox>, ConvertError> {
        if preview.width() == 0 || preview.height() == 0 {
            return Err(ConvertError::InvalidInput(format!(
                "preview has zero area ({}x{})",
                preview.width(),
                preview.height()
            )));
        }

        let gray = preview.to_luma8();
        let mask = self.mask(&gray);

        let found = match self.strategy {
            RoiStrategy::All => tissue_bounds(&mask),
            RoiStrategy::LargestContour => largest_contour_bounds(&mask),
        };

        debug!(
            width = mask.width(),
            height = mask.height(),
            threshold = self.threshold,
            strategy = ?self.strategy,
            found = ?found,
            "Detected tissue region"
        );

        Ok(found)
    }
}

/// Box enclosing every non-zero mask pixel.
fn tissue_bounds(mask: &GrayImage) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;
    for (x, y, px) in mask.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        match bounds.as_mut() {
            Some(b) => b.include(x, y),
            None => bounds = Some(BoundingBox::point(x, y)),
        }
    }
    bounds
}

/// Box of the largest external contour, by enclosed polygon area.
///
/// The mask is traced inside a one-pixel background border, so tissue that
/// touches the image edge still forms an outer contour. Ties keep the first
/// contour found in raster order.
fn largest_contour_bounds(mask: &GrayImage) -> Option<BoundingBox> {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);
    let contours: Vec<Contour<u32>> = find_contours(&padded);

    let mut best: Option<(f64, &Contour<u32>)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
    {
        let area = polygon_area(contour);
        if best.map_or(true, |(a, _)| area > a) {
            best = Some((area, contour));
        }
    }

    let (_, contour) = best?;
    let mut points = contour.points.iter();
    // Tissue points sit inside the border, so x and y are at least 1
    let first = points.next()?;
    let mut bounds = BoundingBox::point(first.x - 1, first.y - 1);
    for p in points {
        bounds.include(p.x - 1, p.y - 1);
    }
    Some(bounds)
}

/// Shoelace area of a contour's point loop.
fn polygon_area(contour: &Contour<u32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (twice.abs() as f64) / 2.0
}
