use image::RgbaImage;
use tracing::debug;

use crate::error::{ConvertError, SlideError};
use crate::slide::SlideReader;

use super::BoundingBox;

/// Read a full-resolution region from a slide.
///
/// The box must lie entirely within level 0; it is never truncated to fit.
/// The whole region is materialised in memory.
///
/// # Errors
///
/// - [`ConvertError::OutOfBounds`] if the box exceeds the slide
/// - [`ConvertError::InvalidInput`] if the slide reports no levels
/// - [`ConvertError::ReadFailure`] if the slide cannot produce the pixels
pub async fn extract_region<S>(slide: &S, region: &BoundingBox) -> Result<RgbaImage, ConvertError>
where
    S: SlideReader + ?Sized,
{
    let (slide_width, slide_height) = slide
        .dimensions()
        .ok_or_else(|| ConvertError::InvalidInput("slide has no levels".to_string()))?;

    if !region.fits_within(slide_width, slide_height) {
        return Err(ConvertError::OutOfBounds {
            x: region.x_min,
            y: region.y_min,
            width: region.width(),
            height: region.height(),
            slide_width,
            slide_height,
        });
    }

    debug!(
        x = region.x_min,
        y = region.y_min,
        width = region.width(),
        height = region.height(),
        megapixels = region.area() as f64 / 1e6,
        "Reading full-resolution region"
    );

    let pixels = slide.read_region(0, region.origin(), region.size()).await?;

    if pixels.dimensions() != region.size() {
        return Err(SlideError::InvalidRegion(format!(
            "reader returned {}x{} for a {}x{} request",
            pixels.width(),
            pixels.height(),
            region.width(),
            region.height()
        ))
        .into());
    }

    Ok(pixels)
}
