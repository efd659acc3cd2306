//! Mapping boxes from a preview level to full resolution.

use crate::error::ConvertError;

use super::BoundingBox;

/// Scale a preview-level box to full-resolution coordinates.
///
/// Each edge is multiplied by `factor` and rounded to the nearest pixel;
/// the far edges are scaled as exclusive bounds so a box covering the whole
/// preview maps onto the whole slide. The result is clamped to
/// `[0, full_width) × [0, full_height)`.
///
/// # Errors
///
/// - [`ConvertError::InvalidInput`] if `factor` is not finite and positive,
///   or the full-resolution frame is empty
/// - [`ConvertError::DegenerateRegion`] if clamping leaves nothing
pub fn rescale_box(
    bbox: &BoundingBox,
    factor: f64,
    full: (u32, u32),
) -> Result<BoundingBox, ConvertError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ConvertError::InvalidInput(format!(
            "downsample factor must be finite and positive, got {}",
            factor
        )));
    }

    let (full_width, full_height) = full;
    if full_width == 0 || full_height == 0 {
        return Err(ConvertError::InvalidInput(format!(
            "full-resolution frame is empty ({}x{})",
            full_width, full_height
        )));
    }

    let x0 = scale_edge(bbox.x_min, factor, full_width);
    let y0 = scale_edge(bbox.y_min, factor, full_height);
    let x1 = scale_edge(bbox.x_max + 1, factor, full_width);
    let y1 = scale_edge(bbox.y_max + 1, factor, full_height);

    if x1 <= x0 || y1 <= y0 {
        return Err(ConvertError::DegenerateRegion(format!(
            "box {} scaled by {} is empty within {}x{}",
            bbox, factor, full_width, full_height
        )));
    }

    Ok(BoundingBox {
        x_min: x0,
        y_min: y0,
        x_max: x1 - 1,
        y_max: y1 - 1,
    })
}

/// Scale one edge coordinate and clamp it to `[0, limit]`.
#[inline]
fn scale_edge(value: u32, factor: f64, limit: u32) -> u32 {
    (value as f64 * factor).round().clamp(0.0, limit as f64) as u32
}
