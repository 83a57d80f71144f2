//! Widget geometry in the single global coordinate space.
//!
//! Every widget rectangle is expressed in the same 2-D space; a child is not
//! positioned relative to its parent. The y axis grows upwards, so `top` is
//! the larger of the two vertical edges.

/// An axis-aligned rectangle given by its four edges.
///
/// Rectangles built with [`Rect::new`] satisfy `right >= left` and
/// `top >= bottom`; swapped edges are normalised. A rectangle written as a
/// struct literal is taken as given, and an inverted one simply contains no
/// points. Zero-width or zero-height rectangles are allowed and contain no
/// points either.
///
/// Extents and deltas are computed in `i64`, so any pair of `i32` edges is
/// valid. Shifting a rectangle saturates each edge at the `i32` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge (inclusive).
    pub left: i32,
    /// Top edge (exclusive).
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (inclusive).
    pub bottom: i32,
}

/// Clamp a widened coordinate back into the `i32` range.
#[inline]
fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

impl Rect {
    /// An empty rectangle at the origin.
    pub const ZERO: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    /// Create a rectangle from its edges, swapping any inverted pair.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left: left.min(right),
            top: top.max(bottom),
            right: left.max(right),
            bottom: top.min(bottom),
        }
    }

    /// Create a rectangle from its bottom-left corner and size.
    ///
    /// The far edges saturate at the `i32` range.
    pub fn from_origin_size(left: i32, bottom: i32, width: i32, height: i32) -> Self {
        Self::new(
            left,
            bottom.saturating_add(height),
            left.saturating_add(width),
            bottom,
        )
    }

    /// Horizontal extent.
    #[inline]
    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    /// Vertical extent.
    #[inline]
    pub fn height(&self) -> i64 {
        i64::from(self.top) - i64::from(self.bottom)
    }

    /// Whether the rectangle has no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Whether the point lies inside the rectangle.
    ///
    /// Left and bottom edges are inclusive, right and top edges exclusive, so
    /// adjacent rectangles never both claim a point and degenerate rectangles
    /// claim none.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.bottom && y < self.top
    }

    /// The same rectangle shifted by `(dx, dy)`, each edge saturating at the
    /// `i32` range.
    pub fn translated(&self, dx: i64, dy: i64) -> Self {
        let shift = |edge: i32, by: i64| saturate(i64::from(edge).saturating_add(by));
        Self {
            left: shift(self.left, dx),
            top: shift(self.top, dy),
            right: shift(self.right, dx),
            bottom: shift(self.bottom, dy),
        }
    }

    /// The change that turns `self` into `other`.
    pub fn delta_to(&self, other: &Rect) -> GeometryDelta {
        GeometryDelta {
            dx: i64::from(other.left) - i64::from(self.left),
            dy: i64::from(other.bottom) - i64::from(self.bottom),
            dwidth: other.width() - self.width(),
            dheight: other.height() - self.height(),
        }
    }
}

/// Position and size change carried by a reshape notification.
///
/// `dx`/`dy` describe how far the bottom-left corner moved; `dwidth` and
/// `dheight` how much the size grew (negative when it shrank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GeometryDelta {
    /// Horizontal movement of the left edge.
    pub dx: i64,
    /// Vertical movement of the bottom edge.
    pub dy: i64,
    /// Change in width.
    pub dwidth: i64,
    /// Change in height.
    pub dheight: i64,
}

impl GeometryDelta {
    /// Whether the bottom-left corner moved.
    pub fn is_moved(&self) -> bool {
        self.dx != 0 || self.dy != 0
    }
}
