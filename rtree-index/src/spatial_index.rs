//! SpatialIndex trait definition.

use crate::bounding_box::BoundingBox;
use crate::rtree::{RTree, SpatialResult};

/// Common interface of the spatial indexes in this crate.
///
/// Implemented by [`RTree`] for single-owner use and by
/// [`SharedRTree`](crate::SharedRTree) for indexes shared between threads.
pub trait SpatialIndex<V> {
    /// Adds one entry.
    fn insert(&mut self, bbox: BoundingBox, value: V) -> SpatialResult<bool>;

    /// Replaces the content of the index with `items`.
    fn insert_bulk(&mut self, items: Vec<(BoundingBox, V)>) -> SpatialResult<()>;

    /// Removes one entry equal to `value`.
    fn remove(&mut self, value: &V) -> SpatialResult<bool>;

    /// Values of all entries whose box intersects `window`.
    fn query(&self, window: &BoundingBox) -> Vec<V>;

    /// Removes every entry.
    fn clear(&mut self);

    /// Number of entries in the index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + PartialEq> SpatialIndex<V> for RTree<V> {
    fn insert(&mut self, bbox: BoundingBox, value: V) -> SpatialResult<bool> {
        RTree::insert(self, bbox, value)
    }

    fn insert_bulk(&mut self, items: Vec<(BoundingBox, V)>) -> SpatialResult<()> {
        RTree::bulk_load(self, items)
    }

    fn remove(&mut self, value: &V) -> SpatialResult<bool> {
        RTree::remove(self, value)
    }

    fn query(&self, window: &BoundingBox) -> Vec<V> {
        RTree::query(self, window)
    }

    fn clear(&mut self) {
        RTree::clear(self)
    }

    fn len(&self) -> usize {
        RTree::len(self)
    }
}
