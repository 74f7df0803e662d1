//! Deletion with underflow condensation.
//!
//! After the matching leaf entry is removed, the trace is walked bottom-up.
//! Every node that fell below the minimum fill is cut out of its parent and
//! its stored values become orphans, which are reinserted through the ordinary
//! insertion engine once all surviving ancestors have tight boxes again.

use crate::bounding_box::BoundingBox;

use super::insert::insert_entry;
use super::node::{Entry, NodeSlots};
use super::rtree_types::{RTreeConfig, SpatialError, SpatialResult};

/// Removes the first stored entry equal to `value`. Returns `false` when no
/// entry matches.
pub(crate) fn remove_value<V: PartialEq>(
    root: &mut NodeSlots<V>,
    value: &V,
    config: &RTreeConfig,
) -> SpatialResult<bool> {
    let mut trace = Vec::new();
    let Some(slot) = find_leaf_with_value(root, value, &mut trace) else {
        return Ok(false);
    };

    let leaf = root.descend_mut(&trace).ok_or_else(lost_path)?;
    leaf.remove(slot).ok_or_else(lost_path)?;

    let orphans = condense_tree(root, &trace, config)?;
    shrink_root(root);

    if !orphans.is_empty() {
        log::debug!("Reinserting {} orphaned entries", orphans.len());
    }
    for (bbox, value) in orphans {
        insert_entry(root, bbox, value, config)?;
    }
    Ok(true)
}

/// Depth-first search for a leaf entry holding `value`. On success `path`
/// holds the slot indices leading to the leaf node and the slot within that
/// node is returned.
fn find_leaf_with_value<V: PartialEq>(
    node: &NodeSlots<V>,
    value: &V,
    path: &mut Vec<usize>,
) -> Option<usize> {
    for (index, entry) in node.entries().iter().enumerate() {
        match entry {
            Entry::Leaf { value: stored, .. } => {
                if stored == value {
                    return Some(index);
                }
            }
            Entry::Internal { children, .. } => {
                path.push(index);
                if let Some(slot) = find_leaf_with_value(children, value, path) {
                    return Some(slot);
                }
                path.pop();
            }
        }
    }
    None
}

/// Cuts underflowing nodes along `trace` out of the tree and tightens the
/// boxes of the survivors. Returns the stored pairs of every cut subtree.
fn condense_tree<V>(
    root: &mut NodeSlots<V>,
    trace: &[usize],
    config: &RTreeConfig,
) -> SpatialResult<Vec<(BoundingBox, V)>> {
    let min_fill = config.min_fill();
    let mut orphans = Vec::new();

    for depth in (0..trace.len()).rev() {
        let parent = root.descend_mut(&trace[..depth]).ok_or_else(lost_path)?;
        let slot = trace[depth];
        let child_len = parent.child(slot).ok_or_else(lost_path)?.len();

        if child_len < min_fill {
            let dissolved = parent.remove(slot).ok_or_else(lost_path)?;
            log::debug!(
                "Dissolving underfull node with {} entries at depth {}",
                child_len,
                depth + 1
            );
            dissolved.collect_into(&mut orphans);
        } else {
            parent.refresh_bbox(slot);
        }
    }
    Ok(orphans)
}

/// Replaces an internal root holding a single entry by that entry's children.
fn shrink_root<V>(root: &mut NodeSlots<V>) {
    while root.len() == 1 && !root.is_leaf() {
        let mut entries = root.take_entries();
        if let Some(Entry::Internal { children, .. }) = entries.pop() {
            *root = children;
        }
    }
}

fn lost_path() -> SpatialError {
    SpatialError::CorruptIndex("deletion path no longer leads to a node".into())
}
