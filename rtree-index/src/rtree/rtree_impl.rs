//! RTree implementation.

use std::mem;

use crate::bounding_box::BoundingBox;

use super::bulk_load::pack;
use super::insert::insert_entry;
use super::node::{Entry, NodeSlots};
use super::query::{visit_intersecting, LargeResultMonitor};
use super::remove::remove_value;
use super::rtree_types::{RTreeConfig, RTreeStats, SpatialError, SpatialResult};

/// In-memory R-Tree over axis-aligned bounding boxes.
///
/// Values are opaque to the tree; it only ever compares them for equality
/// when asked to [`remove`](RTree::remove) one. Mutation requires `&mut self`,
/// so a tree has exactly one writer at a time. Wrap it in a
/// [`SharedRTree`](crate::SharedRTree) to share it between threads.
///
/// # Example
///
/// ```rust
/// use rtree_index::{BoundingBox, RTree};
///
/// let mut tree = RTree::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 4)?;
/// tree.insert(BoundingBox::new(1.0, 1.0, 2.0, 2.0), "a")?;
/// tree.insert(BoundingBox::new(10.0, 10.0, 12.0, 12.0), "b")?;
///
/// assert_eq!(tree.query(&BoundingBox::new(0.0, 0.0, 5.0, 5.0)), vec!["a"]);
/// assert!(tree.remove(&"a")?);
/// assert_eq!(tree.len(), 1);
/// # Ok::<(), rtree_index::SpatialError>(())
/// ```
#[derive(Debug)]
pub struct RTree<V> {
    config: RTreeConfig,
    root: NodeSlots<V>,
    len: usize,
    /// Caller-reserved flag stored alongside the tree
    extra_flag: bool,
    monitor: LargeResultMonitor,
}

impl<V> RTree<V> {
    /// Creates an empty tree covering `root_envelope` with fanout `max_fanout`.
    pub fn new(root_envelope: BoundingBox, max_fanout: usize) -> SpatialResult<Self> {
        Self::with_config(RTreeConfig::new(root_envelope).with_max_fanout(max_fanout))
    }

    /// Creates an empty tree from a full configuration.
    pub fn with_config(config: RTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        let root = NodeSlots::with_capacity(config.max_fanout);
        Ok(Self {
            config,
            root,
            len: 0,
            extra_flag: false,
            monitor: LargeResultMonitor::default(),
        })
    }

    /// Assembles a tree from decoded parts, verifying every structural invariant.
    pub(super) fn from_parts(
        config: RTreeConfig,
        root: NodeSlots<V>,
        extra_flag: bool,
    ) -> SpatialResult<Self> {
        config.validate()?;
        let len = root.check_structure(config.max_fanout, config.min_fill(), 0, &mut None)?;
        Ok(Self {
            config,
            root,
            len,
            extra_flag,
            monitor: LargeResultMonitor::default(),
        })
    }

    pub(super) fn root(&self) -> &NodeSlots<V> {
        &self.root
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn root_envelope(&self) -> &BoundingBox {
        &self.config.root_envelope
    }

    pub fn max_fanout(&self) -> usize {
        self.config.max_fanout
    }

    pub fn min_fill(&self) -> usize {
        self.config.min_fill()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of node levels: 0 for an empty tree, 1 for a single leaf root.
    pub fn height(&self) -> u32 {
        self.root.height()
    }

    pub fn extra_flag(&self) -> bool {
        self.extra_flag
    }

    pub fn set_extra_flag(&mut self, extra_flag: bool) {
        self.extra_flag = extra_flag;
    }

    /// Inserts one entry. Boxes may lie outside the root envelope, but such
    /// entries are only found by windows that also touch the envelope.
    ///
    /// # Errors
    /// [`SpatialError::InvalidBoundingBox`] for NaN coordinates or inverted
    /// bounds; the tree is left unchanged.
    pub fn insert(&mut self, bbox: BoundingBox, value: V) -> SpatialResult<bool> {
        bbox.ensure_valid()?;
        insert_entry(&mut self.root, bbox, value, &self.config)?;
        self.len += 1;
        Ok(true)
    }

    /// Replaces the whole content of the tree by `items`, packed with
    /// Sort-Tile-Recursive bulk loading.
    ///
    /// Every box is validated before the old content is dropped, so a rejected
    /// batch leaves the tree as it was.
    pub fn bulk_load<I>(&mut self, items: I) -> SpatialResult<()>
    where
        I: IntoIterator<Item = (BoundingBox, V)>,
    {
        let items: Vec<(BoundingBox, V)> = items.into_iter().collect();
        for (bbox, _) in &items {
            bbox.ensure_valid()?;
        }
        let len = items.len();
        self.root = pack(items, &self.config);
        self.len = len;
        Ok(())
    }

    /// Repacks every stored entry with bulk loading. Useful after many
    /// incremental inserts and removals.
    pub fn rebuild(&mut self) -> SpatialResult<()> {
        let before = self.height();
        let root = mem::take(&mut self.root);
        let mut items = Vec::with_capacity(self.len);
        root.collect_into(&mut items);

        // packing cannot fail, so the tree is never left empty here
        self.root = pack(items, &self.config);
        log::debug!(
            "Rebuilt tree of {} entries, height {} -> {}",
            self.len,
            before,
            self.height()
        );
        Ok(())
    }

    /// Drops every entry. The configuration and the extra flag are kept.
    pub fn clear(&mut self) {
        self.root = NodeSlots::with_capacity(self.config.max_fanout);
        self.len = 0;
    }

    /// Calls `visit` for every entry whose box strictly intersects `window`
    /// and returns the number of hits. Windows that do not intersect the
    /// root envelope find nothing.
    pub fn query_visit<F>(&self, window: &BoundingBox, mut visit: F) -> usize
    where
        F: FnMut(&BoundingBox, &V),
    {
        if self.root.is_empty() || !window.intersects(&self.config.root_envelope) {
            return 0;
        }
        let hits = visit_intersecting(&self.root, window, &mut visit);
        self.monitor.observe(hits, self.config.max_fanout, window);
        hits
    }

    /// Iterates over every stored `(bbox, value)` pair in depth-first order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            stack: vec![self.root.entries().iter()],
        }
    }

    pub fn stats(&self) -> RTreeStats {
        let mut stats = RTreeStats::default();
        if !self.root.is_empty() {
            self.root.tally(&mut stats, self.config.max_fanout);
            stats.average_fill /= stats.node_count as f64;
        }
        stats.tree_height = self.height();
        stats
    }

    /// Verifies exact box containment, fill bounds of non-root nodes, uniform
    /// node kinds, equal leaf depth and the entry count.
    pub fn check_invariants(&self) -> SpatialResult<()> {
        let stored = self.root.check_structure(
            self.config.max_fanout,
            self.config.min_fill(),
            0,
            &mut None,
        )?;
        if stored != self.len {
            return Err(SpatialError::CorruptIndex(format!(
                "tree holds {} entries but counts {}",
                stored, self.len
            )));
        }
        Ok(())
    }
}

impl<V: Clone> RTree<V> {
    /// Values of every entry whose box strictly intersects `window`, in no
    /// particular order.
    pub fn query(&self, window: &BoundingBox) -> Vec<V> {
        let mut found = Vec::new();
        self.query_visit(window, |_, value| found.push(value.clone()));
        found
    }
}

impl<V: PartialEq> RTree<V> {
    /// Removes one entry equal to `value`. Returns `Ok(false)` when the tree
    /// holds no such value.
    ///
    /// # Errors
    /// [`SpatialError::CorruptIndex`] when the tree structure is broken. Entries
    /// detached before the failure may be lost; [`len`](Self::len) is recounted
    /// so it still matches what the tree holds.
    pub fn remove(&mut self, value: &V) -> SpatialResult<bool> {
        if self.root.is_empty() {
            log::debug!("Remove called on an empty tree");
            return Ok(false);
        }
        match remove_value(&mut self.root, value, &self.config) {
            Ok(removed) => {
                if removed {
                    self.len -= 1;
                }
                Ok(removed)
            }
            Err(e) => {
                self.len = self.root.count_values();
                log::warn!("Remove failed, {} entries remain: {}", self.len, e);
                Err(e)
            }
        }
    }
}

impl<'a, V> IntoIterator for &'a RTree<V> {
    type Item = (&'a BoundingBox, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Depth-first iterator over the entries of an [`RTree`].
pub struct Iter<'a, V> {
    stack: Vec<std::slice::Iter<'a, Entry<V>>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a BoundingBox, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(level) = self.stack.last_mut() {
            match level.next() {
                Some(Entry::Leaf { bbox, value }) => return Some((bbox, value)),
                Some(Entry::Internal { children, .. }) => {
                    self.stack.push(children.entries().iter());
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}
