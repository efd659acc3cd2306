use std::fmt;

use serde::Serialize;

/// Axis-aligned box in pixel coordinates, inclusive on both ends.
///
/// A box always covers at least one pixel: `x_min <= x_max` and
/// `y_min <= y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    /// Create a box, returning `None` if the corners are out of order.
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Option<Self> {
        (x_min <= x_max && y_min <= y_max).then_some(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Box covering a whole `width × height` frame.
    pub fn full(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Self::new(0, 0, width - 1, height - 1)
    }

    /// Single-pixel box.
    pub const fn point(x: u32, y: u32) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x,
            y_max: y,
        }
    }

    /// Grow the box to include a pixel.
    pub fn include(&mut self, x: u32, y: u32) {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
    }

    pub const fn width(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    pub const fn height(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    /// Top-left corner.
    pub const fn origin(&self) -> (u32, u32) {
        (self.x_min, self.y_min)
    }

    /// `(width, height)`.
    pub const fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Number of pixels covered.
    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Whether the box lies inside a `width × height` frame.
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x_max < width && self.y_max < height
    }

    /// Whether the box covers the whole `width × height` frame.
    pub fn is_full_frame(&self, width: u32, height: u32) -> bool {
        Self::full(width, height) == Some(*self)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})-({}, {}) [{}x{}]",
            self.x_min,
            self.y_min,
            self.x_max,
            self.y_max,
            self.width(),
            self.height()
        )
    }
}
