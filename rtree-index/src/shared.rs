//! Thread-shareable handle around an [`RTree`].

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bounding_box::BoundingBox;
use crate::rtree::{RTree, SpatialResult};
use crate::spatial_index::SpatialIndex;

/// Cloneable handle to one [`RTree`] guarded by a readers-writer lock.
///
/// Queries run under the read lock and may proceed in parallel. Inserts,
/// removals and reloads take the write lock. Use [`read`](Self::read) or
/// [`write`](Self::write) to hold a lock across several calls.
///
/// # Example
///
/// ```rust
/// use rtree_index::{BoundingBox, RTree, SharedRTree};
///
/// let shared = SharedRTree::new(RTree::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 8)?);
/// let writer = shared.clone();
/// std::thread::spawn(move || writer.insert(BoundingBox::new(1.0, 1.0, 2.0, 2.0), 42))
///     .join()
///     .unwrap()?;
/// assert_eq!(shared.query(&BoundingBox::new(0.0, 0.0, 5.0, 5.0)), vec![42]);
/// # Ok::<(), rtree_index::SpatialError>(())
/// ```
pub struct SharedRTree<V> {
    inner: Arc<RwLock<RTree<V>>>,
}

impl<V> Clone for SharedRTree<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> From<RTree<V>> for SharedRTree<V> {
    fn from(tree: RTree<V>) -> Self {
        Self::new(tree)
    }
}

impl<V> SharedRTree<V> {
    pub fn new(tree: RTree<V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Shared access for a sequence of read-only calls.
    pub fn read(&self) -> RwLockReadGuard<'_, RTree<V>> {
        self.inner.read()
    }

    /// Exclusive access for a sequence of mutating calls.
    pub fn write(&self) -> RwLockWriteGuard<'_, RTree<V>> {
        self.inner.write()
    }

    /// Returns the tree if this is the last handle to it.
    pub fn try_into_inner(self) -> Result<RTree<V>, Self> {
        Arc::try_unwrap(self.inner)
            .map(RwLock::into_inner)
            .map_err(|inner| Self { inner })
    }

    pub fn insert(&self, bbox: BoundingBox, value: V) -> SpatialResult<bool> {
        self.inner.write().insert(bbox, value)
    }

    pub fn bulk_load<I>(&self, items: I) -> SpatialResult<()>
    where
        I: IntoIterator<Item = (BoundingBox, V)>,
    {
        self.inner.write().bulk_load(items)
    }

    pub fn clear(&self) {
        self.inner.write().clear()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn query_visit<F>(&self, window: &BoundingBox, visit: F) -> usize
    where
        F: FnMut(&BoundingBox, &V),
    {
        self.inner.read().query_visit(window, visit)
    }
}

impl<V: Clone> SharedRTree<V> {
    pub fn query(&self, window: &BoundingBox) -> Vec<V> {
        self.inner.read().query(window)
    }
}

impl<V: PartialEq> SharedRTree<V> {
    pub fn remove(&self, value: &V) -> SpatialResult<bool> {
        self.inner.write().remove(value)
    }
}

impl<V: Clone + PartialEq> SpatialIndex<V> for SharedRTree<V> {
    fn insert(&mut self, bbox: BoundingBox, value: V) -> SpatialResult<bool> {
        SharedRTree::insert(self, bbox, value)
    }

    fn insert_bulk(&mut self, items: Vec<(BoundingBox, V)>) -> SpatialResult<()> {
        SharedRTree::bulk_load(self, items)
    }

    fn remove(&mut self, value: &V) -> SpatialResult<bool> {
        SharedRTree::remove(self, value)
    }

    fn query(&self, window: &BoundingBox) -> Vec<V> {
        SharedRTree::query(self, window)
    }

    fn clear(&mut self) {
        SharedRTree::clear(self)
    }

    fn len(&self) -> usize {
        SharedRTree::len(self)
    }
}
