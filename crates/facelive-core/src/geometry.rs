//! Planar geometry helpers shared by the liveliness checks.
//!
//! Everything here is pure and operates on integer pixel coordinates, the
//! same space the landmark denormalisation produces.

use serde::Serialize;

/// Integer pixel coordinate obtained by denormalising a landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned pixel rectangle, serialised as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "[i32; 4]")]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> i32 {
        (self.max_x - self.min_x).abs()
    }

    pub fn height(&self) -> i32 {
        (self.max_y - self.min_y).abs()
    }

    /// See [`expand_box`].
    pub fn expand(self, margin: f64) -> Self {
        expand_box(self, margin)
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

/// Euclidean distance between two pixel points.
pub fn distance(a: PixelPoint, b: PixelPoint) -> f64 {
    let dx = f64::from(b.x - a.x);
    let dy = f64::from(b.y - a.y);
    (dx * dx + dy * dy).sqrt()
}

/// Grow every edge of `bbox` outward by `margin` times the box's own extent
/// on that axis.
///
/// Both edges of an axis are moved by the same amount, computed from the
/// extent before expansion. Results are truncated toward zero.
pub fn expand_box(bbox: BoundingBox, margin: f64) -> BoundingBox {
    let dx = f64::from(bbox.width()) * margin;
    let dy = f64::from(bbox.height()) * margin;

    BoundingBox {
        min_x: (f64::from(bbox.min_x) - dx) as i32,
        min_y: (f64::from(bbox.min_y) - dy) as i32,
        max_x: (f64::from(bbox.max_x) + dx) as i32,
        max_y: (f64::from(bbox.max_y) + dy) as i32,
    }
}

/// `numerator / denominator`, or `None` when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = PixelPoint::new(17, -4);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = PixelPoint::new(3, 9);
        let b = PixelPoint::new(-12, 40);
        assert_eq!(distance(a, b), distance(b, a));
    }

    #[test]
    fn test_distance_known_triangle() {
        let a = PixelPoint::new(0, 0);
        let b = PixelPoint::new(3, 4);
        assert!((distance(a, b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_expand_uses_unpadded_extent() {
        // 200 x 100 box, 10% => 20 px horizontally, 10 px vertically
        let b = BoundingBox::new(100, 50, 300, 150);
        assert_eq!(expand_box(b, 0.10), BoundingBox::new(80, 40, 320, 160));
    }

    #[test]
    fn test_expand_truncates_toward_zero() {
        // 15 px wide => 1.5 px margin
        let b = BoundingBox::new(10, 10, 25, 25);
        assert_eq!(expand_box(b, 0.10), BoundingBox::new(8, 8, 26, 26));
    }

    #[test]
    fn test_expand_zero_margin_is_idempotent() {
        let b = BoundingBox::new(12, 34, 560, 478);
        assert_eq!(expand_box(b, 0.0), b);
        assert_eq!(expand_box(expand_box(b, 0.0), 0.0), b);
    }

    #[test]
    fn test_repeated_expansion_grows_monotonically() {
        let mut b = BoundingBox::new(200, 150, 400, 330);
        for _ in 0..5 {
            let next = b.expand(0.10);
            assert!(next.min_x < b.min_x && next.max_x > b.max_x);
            assert!(next.min_y < b.min_y && next.max_y > b.max_y);
            assert!(next.width() > b.width() && next.height() > b.height());
            b = next;
        }
    }

    #[test]
    fn test_box_serialises_as_array() {
        let json = serde_json::to_string(&BoundingBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
    }

    #[test]
    fn test_ratio_rejects_zero_denominator() {
        assert_eq!(ratio(1.0, 0.0), None);
        assert_eq!(ratio(1.0, 4.0), Some(0.25));
    }
}
