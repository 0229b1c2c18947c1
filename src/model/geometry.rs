//! Page geometry.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in PDF user space (points, origin bottom-left).
///
/// `y0` is the bottom edge and `y1` the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Create a box from two corners in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of every box in the iterator, `None` when it is empty.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BBox>, b| match acc {
                Some(u) => Some(u.union(b)),
                None => Some(*b),
            })
    }

    /// Whether `other` lies inside this box, allowing `tolerance` points of slack.
    pub fn contains(&self, other: &BBox, tolerance: f32) -> bool {
        other.x0 >= self.x0 - tolerance
            && other.y0 >= self.y0 - tolerance
            && other.x1 <= self.x1 + tolerance
            && other.y1 <= self.y1 + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let b = BBox::new(10.0, 20.0, 5.0, 2.0);
        assert_eq!(b, BBox::new(5.0, 2.0, 10.0, 20.0));
        assert_eq!(b.width(), 5.0);
        assert_eq!(b.height(), 18.0);
    }

    #[test]
    fn test_union_all() {
        let boxes = [BBox::new(0.0, 0.0, 1.0, 1.0), BBox::new(5.0, -2.0, 6.0, 0.5)];
        let u = BBox::union_all(&boxes).unwrap();
        assert_eq!(u, BBox::new(0.0, -2.0, 6.0, 1.0));
        assert!(BBox::union_all(&[]).is_none());
    }

    #[test]
    fn test_contains() {
        let outer = BBox::new(0.0, 0.0, 100.0, 20.0);
        assert!(outer.contains(&BBox::new(10.0, 2.0, 50.0, 18.0), 0.0));
        assert!(!outer.contains(&BBox::new(10.0, 2.0, 101.0, 18.0), 0.0));
        assert!(outer.contains(&BBox::new(10.0, 2.0, 101.0, 18.0), 1.5));
    }
}
