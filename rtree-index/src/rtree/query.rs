//! Range query traversal.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::bounding_box::BoundingBox;

use super::node::{Entry, NodeSlots};
use super::rtree_constants::LARGE_RESULT_FACTOR;

/// Calls `visit` for every stored entry whose box strictly intersects
/// `window`, returning the number of hits.
pub(crate) fn visit_intersecting<V, F>(node: &NodeSlots<V>, window: &BoundingBox, visit: &mut F) -> usize
where
    F: FnMut(&BoundingBox, &V),
{
    let mut hits = 0;
    for entry in node.entries() {
        if !entry.bbox().intersects(window) {
            continue;
        }
        match entry {
            Entry::Leaf { bbox, value } => {
                visit(bbox, value);
                hits += 1;
            }
            Entry::Internal { children, .. } => {
                hits += visit_intersecting(children, window, visit);
            }
        }
    }
    hits
}

/// Flags abnormally large result sets. Purely informational: it logs one
/// warning per tree and never alters results.
#[derive(Debug, Default)]
pub(crate) struct LargeResultMonitor {
    warned: AtomicBool,
}

impl LargeResultMonitor {
    pub(crate) fn threshold(max_fanout: usize) -> usize {
        max_fanout.saturating_mul(LARGE_RESULT_FACTOR)
    }

    pub(crate) fn observe(&self, hits: usize, max_fanout: usize, window: &BoundingBox) {
        if hits < Self::threshold(max_fanout) {
            return;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Query {} returned {} entries, more than {} times the fanout of {}",
                window,
                hits,
                LARGE_RESULT_FACTOR,
                max_fanout
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}
