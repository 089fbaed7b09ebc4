//! Axis-aligned rectangles.

use std::fmt;

use super::AspectRatio;

/// An axis-aligned rectangle.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: [f32; 2],
    size: [f32; 2],
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: [x_center, y_center],
            size: [width, height],
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width * 0.5,
            top_left_y + height * 0.5,
            width,
            height,
        )
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    ///
    /// # Panics
    ///
    /// This method will panic if `self` has a width or height of 0.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        assert!(self.width() > 0.0 && self.height() > 0.0);

        let mut res = *self;
        let target_width = self.height() * target_aspect.as_f32();
        if target_width >= self.width() {
            res.size[0] = target_width;
        } else {
            let target_height = self.width() / target_aspect.as_f32();
            res.size[1] = target_height;
        }

        res
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.center[0] - self.size[0] * 0.5
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.center[1] - self.size[1] * 0.5
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size[0]
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size[1]
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{}), size {}x{}",
            self.x(),
            self.y(),
            self.width(),
            self.height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_to_fit() {
        let rect = Rect::from_top_left(0.0, 0.0, 100.0, 50.0);
        let grown = rect.grow_to_fit_aspect(AspectRatio::SQUARE);
        assert_eq!(grown.width(), 100.0);
        assert_eq!(grown.height(), 100.0);
        // Grows symmetrically around the center.
        assert_eq!(grown.y(), -25.0);
        assert_eq!(grown.x(), 0.0);

        let tall = Rect::from_top_left(10.0, 0.0, 30.0, 60.0);
        let grown = tall.grow_to_fit_aspect(AspectRatio::SQUARE);
        assert_eq!(grown.width(), 60.0);
        assert_eq!(grown.height(), 60.0);
        assert_eq!(grown.x(), -5.0);
    }
}
