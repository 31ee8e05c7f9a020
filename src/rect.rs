//! Frames.

use cgmath::{Point2, Vector2, Zero};

/// A node's frame in the hosting surface's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Point2<f64>,
    pub size: Vector2<f64>,
}

impl Rect {
    pub fn new(origin: Point2<f64>, size: Vector2<f64>) -> Rect {
        Rect { origin, size }
    }

    /// A rectangle of the given size at the origin.
    pub fn from_size(size: Vector2<f64>) -> Rect {
        Rect {
            origin: Point2::new(0., 0.),
            size,
        }
    }

    pub fn zero() -> Rect {
        Rect::from_size(Vector2::zero())
    }

    /// The corner opposite the origin.
    pub fn max(&self) -> Point2<f64> {
        self.origin + self.size
    }

    /// Grows the rectangle by `padding` on every side.
    pub fn outset(&self, padding: Vector2<f64>) -> Rect {
        Rect {
            origin: self.origin - padding,
            size: self.size + padding * 2.,
        }
    }

    /// Returns true if the rectangle covers no area.
    pub fn is_empty(&self) -> bool {
        self.size.x <= 0. || self.size.y <= 0.
    }
}

impl Default for Rect {
    fn default() -> Rect {
        Rect::zero()
    }
}

#[test]
fn test_rect_outset() {
    let rect = Rect::from_size(Vector2::new(10., 4.)).outset(Vector2::new(2., 1.));
    assert_eq!(rect.origin, Point2::new(-2., -1.));
    assert_eq!(rect.size, Vector2::new(14., 6.));
    assert_eq!(rect.max(), Point2::new(12., 5.));
    assert!(!rect.is_empty());
    assert!(Rect::zero().is_empty());
}
