//! Rectangles and points in canonical and pixel coordinates.
//!
//! Canonical coordinates are continuous, unscaled and use square pixels.
//! Pixel coordinates address samples after the pixel aspect ratio, the render
//! scale and field extraction have been applied. Rectangles are half open:
//! `x1 <= x < x2`, `y1 <= y < y2`.

use crate::core::types::Field;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate value flagging an unbounded maximum.
pub const INFINITE_MAX: i32 = i32::MAX;

/// Coordinate value flagging an unbounded minimum.
pub const INFINITE_MIN: i32 = i32::MIN;

/// A 2D point in double precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointD {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
}

impl PointD {
    /// Create a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The identity render scale.
    pub const fn unit() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// An integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RectI {
    /// Left edge, inclusive.
    pub x1: i32,
    /// Bottom edge, inclusive.
    pub y1: i32,
    /// Right edge, exclusive.
    pub x2: i32,
    /// Top edge, exclusive.
    pub y2: i32,
}

impl RectI {
    /// Create a rectangle from its corners.
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a rectangle from a `[x1, y1, x2, y2]` array.
    pub fn from_array(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    /// The rectangle as a `[x1, y1, x2, y2]` array.
    pub fn to_array(self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// A rectangle covering the whole plane.
    pub const fn infinite() -> Self {
        Self::new(INFINITE_MIN, INFINITE_MIN, INFINITE_MAX, INFINITE_MAX)
    }

    /// Width in pixels, zero when empty.
    pub fn width(&self) -> u64 {
        (self.x2 as i64 - self.x1 as i64).max(0) as u64
    }

    /// Height in pixels, zero when empty.
    pub fn height(&self) -> u64 {
        (self.y2 as i64 - self.y1 as i64).max(0) as u64
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width() * self.height()
    }

    /// True if no pixel is covered.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// True if the pixel at `(x, y)` lies inside.
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// True if `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &RectI) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    /// Clip this rectangle against `bounds`.
    ///
    /// The result always lies inside `bounds` (it degenerates to an empty
    /// rectangle on the nearest edge when there is no overlap), and clipping
    /// it again against the same bounds leaves it unchanged.
    pub fn clip(&self, bounds: &RectI) -> RectI {
        let x1 = self.x1.clamp(bounds.x1, bounds.x2.max(bounds.x1));
        let x2 = self.x2.clamp(bounds.x1, bounds.x2.max(bounds.x1)).max(x1);
        let y1 = self.y1.clamp(bounds.y1, bounds.y2.max(bounds.y1));
        let y2 = self.y2.clamp(bounds.y1, bounds.y2.max(bounds.y1)).max(y1);
        RectI::new(x1, y1, x2, y2)
    }

    /// The overlap of two rectangles, or `None` when they are disjoint.
    pub fn intersection(&self, other: &RectI) -> Option<RectI> {
        let r = RectI::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        (!r.is_empty()).then_some(r)
    }

    /// The smallest rectangle containing both; empty inputs are ignored.
    pub fn union(&self, other: &RectI) -> RectI {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        RectI::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }
}

impl fmt::Display for RectI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// A double precision rectangle in canonical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectD {
    /// Left edge.
    pub x1: f64,
    /// Bottom edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Top edge.
    pub y2: f64,
}

impl RectD {
    /// Create a rectangle from its corners.
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a rectangle from a `[x1, y1, x2, y2]` array.
    pub fn from_array(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    /// The rectangle as a `[x1, y1, x2, y2]` array.
    pub fn to_array(self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// A rectangle covering the whole plane, using the infinite flags.
    pub fn infinite() -> Self {
        Self::new(
            INFINITE_MIN as f64,
            INFINITE_MIN as f64,
            INFINITE_MAX as f64,
            INFINITE_MAX as f64,
        )
    }

    /// Width, zero when empty.
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Height, zero when empty.
    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    /// True if the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// True if either horizontal edge carries an infinite flag.
    pub fn is_infinite_x(&self) -> bool {
        self.x1 <= INFINITE_MIN as f64 || self.x2 >= INFINITE_MAX as f64
    }

    /// True if either vertical edge carries an infinite flag.
    pub fn is_infinite_y(&self) -> bool {
        self.y1 <= INFINITE_MIN as f64 || self.y2 >= INFINITE_MAX as f64
    }

    /// True if `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &RectD) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    /// Clip this rectangle against `bounds`; see [`RectI::clip`].
    pub fn clip(&self, bounds: &RectD) -> RectD {
        let bx2 = bounds.x2.max(bounds.x1);
        let by2 = bounds.y2.max(bounds.y1);
        let x1 = self.x1.clamp(bounds.x1, bx2);
        let x2 = self.x2.clamp(bounds.x1, bx2).max(x1);
        let y1 = self.y1.clamp(bounds.y1, by2);
        let y2 = self.y2.clamp(bounds.y1, by2).max(y1);
        RectD::new(x1, y1, x2, y2)
    }

    /// The smallest rectangle containing both; empty inputs are ignored.
    pub fn union(&self, other: &RectD) -> RectD {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        RectD::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Union where an infinite axis on `other` makes that axis infinite.
    pub fn union_extending_infinite(&self, other: &RectD) -> RectD {
        let mut rod = self.union(other);
        if other.is_infinite_x() {
            rod.x1 = INFINITE_MIN as f64;
            rod.x2 = INFINITE_MAX as f64;
        }
        if other.is_infinite_y() {
            rod.y1 = INFINITE_MIN as f64;
            rod.y2 = INFINITE_MAX as f64;
        }
        rod
    }

    /// Grow by `radius` on every side, leaving infinite edges untouched.
    pub fn grow(&self, radius: f64) -> RectD {
        let grow_min = |v: f64| if v <= INFINITE_MIN as f64 { v } else { v - radius };
        let grow_max = |v: f64| if v >= INFINITE_MAX as f64 { v } else { v + radius };
        RectD::new(grow_min(self.x1), grow_min(self.y1), grow_max(self.x2), grow_max(self.y2))
    }
}

impl fmt::Display for RectD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Parameters for converting between canonical and pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMapping {
    /// Proxy scale applied to both axes.
    pub render_scale: PointD,
    /// Width of a pixel relative to its height.
    pub pixel_aspect_ratio: f64,
    /// Field being rendered; single fields halve the vertical scale.
    pub field: Field,
}

impl Default for PixelMapping {
    fn default() -> Self {
        Self {
            render_scale: PointD::unit(),
            pixel_aspect_ratio: 1.0,
            field: Field::None,
        }
    }
}

impl PixelMapping {
    /// Create a mapping.
    pub fn new(render_scale: PointD, pixel_aspect_ratio: f64, field: Field) -> Self {
        Self {
            render_scale,
            pixel_aspect_ratio,
            field,
        }
    }

    fn x_factor(&self) -> f64 {
        self.render_scale.x / self.pixel_aspect_ratio
    }

    fn y_factor(&self) -> f64 {
        self.render_scale.y * self.field.y_scale()
    }

    /// Convert a canonical rectangle to pixels by scaling and truncating.
    pub fn to_pixels(&self, r: &RectD) -> RectI {
        let (fx, fy) = (self.x_factor(), self.y_factor());
        RectI::new(
            scale_min(r.x1, fx),
            scale_min(r.y1, fy),
            scale_max(r.x2, fx),
            scale_max(r.y2, fy),
        )
    }

    /// Convert a pixel rectangle back to canonical coordinates.
    pub fn to_canonical(&self, r: &RectI) -> RectD {
        let (fx, fy) = (self.x_factor(), self.y_factor());
        let unscale_min = |v: i32, f: f64| {
            if v == INFINITE_MIN {
                INFINITE_MIN as f64
            } else {
                v as f64 / f
            }
        };
        let unscale_max = |v: i32, f: f64| {
            if v == INFINITE_MAX {
                INFINITE_MAX as f64
            } else {
                v as f64 / f
            }
        };
        RectD::new(
            unscale_min(r.x1, fx),
            unscale_min(r.y1, fy),
            unscale_max(r.x2, fx),
            unscale_max(r.y2, fy),
        )
    }
}

fn scale_min(v: f64, factor: f64) -> i32 {
    if v <= INFINITE_MIN as f64 {
        INFINITE_MIN
    } else {
        (v * factor) as i32
    }
}

fn scale_max(v: f64, factor: f64) -> i32 {
    if v >= INFINITE_MAX as f64 {
        INFINITE_MAX
    } else {
        (v * factor) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rect_i() -> impl Strategy<Value = RectI> {
        (-500i32..500, -500i32..500, 0i32..400, 0i32..400)
            .prop_map(|(x, y, w, h)| RectI::new(x, y, x + w, y + h))
    }

    fn rect_d() -> impl Strategy<Value = RectD> {
        (-500.0f64..500.0, -500.0f64..500.0, 0.0f64..400.0, 0.0f64..400.0)
            .prop_map(|(x, y, w, h)| RectD::new(x, y, x + w, y + h))
    }

    proptest! {
        #[test]
        fn test_clip_is_idempotent(r in rect_i(), b in rect_i()) {
            let once = r.clip(&b);
            prop_assert_eq!(once.clip(&b), once);
            prop_assert!(b.contains(&once));
        }

        #[test]
        fn test_clip_d_is_idempotent(r in rect_d(), b in rect_d()) {
            let once = r.clip(&b);
            prop_assert_eq!(once.clip(&b), once);
            prop_assert!(b.contains(&once));
        }

        #[test]
        fn test_clip_matches_intersection(r in rect_i(), b in rect_i()) {
            let clipped = r.clip(&b);
            match r.intersection(&b) {
                Some(i) => prop_assert_eq!(clipped, i),
                None => prop_assert!(clipped.is_empty()),
            }
        }
    }

    #[test]
    fn test_clip_disjoint_is_empty_inside_bounds() {
        let r = RectI::new(100, 100, 200, 200);
        let b = RectI::new(0, 0, 50, 50);
        let c = r.clip(&b);
        assert!(c.is_empty());
        assert!(b.contains(&c));
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = RectI::new(0, 0, 10, 10);
        assert_eq!(a.union(&RectI::default()), a);
        assert_eq!(RectI::default().union(&a), a);
        assert_eq!(a.union(&RectI::new(5, -5, 20, 5)), RectI::new(0, -5, 20, 10));
    }

    #[test]
    fn test_infinite_width_does_not_overflow() {
        let r = RectI::infinite();
        assert_eq!(r.width(), u32::MAX as u64);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_union_extending_infinite() {
        let geometry = RectD::new(10.0, 10.0, 20.0, 20.0);
        let source = RectD::new(
            INFINITE_MIN as f64,
            0.0,
            INFINITE_MAX as f64,
            100.0,
        );
        let rod = geometry.union_extending_infinite(&source);
        assert!(rod.is_infinite_x());
        assert!(!rod.is_infinite_y());
        assert_eq!((rod.y1, rod.y2), (0.0, 100.0));
    }

    #[test]
    fn test_grow_keeps_infinite_edges() {
        let r = RectD::infinite().grow(5.0);
        assert_eq!(r, RectD::infinite());
        let g = RectD::new(0.0, 0.0, 10.0, 10.0).grow(2.0);
        assert_eq!(g, RectD::new(-2.0, -2.0, 12.0, 12.0));
    }

    #[test]
    fn test_pixel_mapping_truncates() {
        let mapping = PixelMapping::new(PointD::new(0.5, 0.5), 2.0, Field::None);
        let px = mapping.to_pixels(&RectD::new(10.0, 10.0, 101.0, 101.0));
        assert_eq!(px, RectI::new(2, 5, 25, 50));
    }

    #[test]
    fn test_pixel_mapping_field_halves_y() {
        let mapping = PixelMapping::new(PointD::unit(), 1.0, Field::Lower);
        let px = mapping.to_pixels(&RectD::new(0.0, 0.0, 64.0, 64.0));
        assert_eq!(px, RectI::new(0, 0, 64, 32));
        assert_eq!(mapping.to_canonical(&px), RectD::new(0.0, 0.0, 64.0, 64.0));
    }

    #[test]
    fn test_pixel_mapping_preserves_infinite() {
        let mapping = PixelMapping::new(PointD::new(0.25, 0.25), 1.0, Field::None);
        assert_eq!(mapping.to_pixels(&RectD::infinite()), RectI::infinite());
        assert_eq!(mapping.to_canonical(&RectI::infinite()), RectD::infinite());
    }
}
