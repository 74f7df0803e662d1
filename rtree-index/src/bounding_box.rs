use std::hash::Hash;

use thiserror::Error;

use crate::rtree::rtree_types::{SpatialError, SpatialResult};

/// An axis-aligned 2D bounding box represented by its minimum and maximum corners.
///
/// `BoundingBox` is the spatial key of every stored item and of every node in the
/// tree. Boxes are plain values: new boxes are produced by [`union`](Self::union)
/// and friends, never by widening an existing one in place.
///
/// # Examples
///
/// ```rust
/// use rtree_index::BoundingBox;
///
/// let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
///
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 15.0, 15.0));
/// ```
#[derive(Clone, Copy, PartialEq, Default, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundingBox({}, {}, {}, {})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Raised when two boxes have no common point at all.
///
/// Only the scoring code of the insertion engine sees this; it always turns it
/// into a zero contribution.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("{0} and {1} do not overlap")]
pub(crate) struct NoOverlap(pub BoundingBox, pub BoundingBox);

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    ///
    /// No validation happens here; use [`try_new`](Self::try_new) for caller
    /// supplied data.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a bounding box, rejecting NaN coordinates and inverted corners.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SpatialResult<BoundingBox> {
        let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
        bbox.ensure_valid()?;
        Ok(bbox)
    }

    pub(crate) fn ensure_valid(&self) -> SpatialResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SpatialError::InvalidBoundingBox(format!(
                "{} must satisfy min <= max on both axes",
                self
            )))
        }
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the semi-perimeter (`width + height`).
    ///
    /// Every heuristic in the tree compares perimeters relative to each other,
    /// so the factor of two is left out throughout.
    pub fn perimeter(&self) -> f64 {
        self.width() + self.height()
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        (
            self.min_x + (self.max_x - self.min_x) / 2.0,
            self.min_y + (self.max_y - self.min_y) / 2.0,
        )
    }

    /// Checks if this bounding box contains another bounding box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if this bounding box shares a strictly positive area with another.
    ///
    /// Boxes that only touch along an edge or at a corner do NOT intersect, and a
    /// degenerate (zero-width or zero-height) box never intersects anything.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x.max(other.min_x) < self.max_x.min(other.max_x)
            && self.min_y.max(other.min_y) < self.max_y.min(other.max_y)
    }

    /// Returns the union of this bounding box with another.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Returns the minimum bounding box of all given boxes, or `None` when empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, b| acc.union(b)))
    }

    /// Area by which this box must grow to also cover `to_include`.
    pub fn enlargement(&self, to_include: &BoundingBox) -> f64 {
        self.union(to_include).area() - self.area()
    }

    /// Returns the common part of two boxes.
    ///
    /// Unlike [`intersects`](Self::intersects) this is inclusive: touching boxes
    /// produce a degenerate box. Only boxes with no common point fail.
    pub(crate) fn intersection_box(&self, other: &BoundingBox) -> Result<BoundingBox, NoOverlap> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x);
        let max_y = self.max_y.min(other.max_y);

        if min_x > max_x || min_y > max_y {
            return Err(NoOverlap(*self, *other));
        }
        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }

    /// Checks if this bounding box is a point (zero area).
    pub fn is_point(&self) -> bool {
        self.min_x == self.max_x && self.min_y == self.max_y
    }

    /// Checks if this bounding box is valid (min <= max, no NaN).
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }
}
