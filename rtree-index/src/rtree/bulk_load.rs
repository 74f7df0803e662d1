//! Sort-Tile-Recursive packing.
//!
//! The working set is sorted by x-midpoint and cut into vertical strips of
//! `M * M` entries. Each strip is sorted by y-midpoint and cut into nodes of at
//! most `M` entries. The resulting internal entries form the next working set,
//! until everything fits into a single root node.

use std::cmp::Ordering;

use crate::bounding_box::BoundingBox;

use super::node::{Entry, NodeSlots};
use super::rtree_types::RTreeConfig;

/// Builds a fresh root from `items`. Boxes must already be validated.
pub(crate) fn pack<V>(items: Vec<(BoundingBox, V)>, config: &RTreeConfig) -> NodeSlots<V> {
    let max_fanout = config.max_fanout;
    let min_fill = config.min_fill();
    let count = items.len();

    let mut level: Vec<Entry<V>> = items
        .into_iter()
        .map(|(bbox, value)| Entry::leaf(bbox, value))
        .collect();
    let mut height = 1;

    while level.len() > max_fanout {
        level = pack_level(level, max_fanout, min_fill);
        height += 1;
    }

    log::debug!(
        "Packed {} entries into a tree of height {} (fanout {})",
        count,
        if count == 0 { 0 } else { height },
        max_fanout
    );

    NodeSlots::from_entries(level)
}

/// Packs one level of entries into parent entries.
fn pack_level<V>(mut entries: Vec<Entry<V>>, max_fanout: usize, min_fill: usize) -> Vec<Entry<V>> {
    entries.sort_by(|a, b| compare_mid(a, b, midpoint_x));

    let strip_capacity = max_fanout.saturating_mul(max_fanout);
    let mut packed = Vec::with_capacity(entries.len().div_ceil(max_fanout));
    let mut remaining = entries.into_iter();

    for strip_size in group_sizes(remaining.len(), strip_capacity, min_fill) {
        let mut strip: Vec<Entry<V>> = remaining.by_ref().take(strip_size).collect();
        strip.sort_by(|a, b| compare_mid(a, b, midpoint_y));

        let mut members = strip.into_iter();
        for node_size in group_sizes(members.len(), max_fanout, min_fill) {
            let node = NodeSlots::from_entries(members.by_ref().take(node_size).collect());
            if let Some(bbox) = node.bbox() {
                packed.push(Entry::Internal {
                    bbox,
                    children: node,
                });
            }
        }
    }
    packed
}

/// Cuts `total` items into consecutive groups of `capacity`. When the last
/// group would fall below `min_fill`, it borrows the shortfall from the group
/// before it.
fn group_sizes(total: usize, capacity: usize, min_fill: usize) -> Vec<usize> {
    let mut sizes = vec![capacity; total / capacity];
    let rest = total % capacity;
    if rest > 0 {
        sizes.push(rest);
    }
    if let [.., previous, last] = sizes.as_mut_slice() {
        if *last < min_fill {
            let shortfall = min_fill - *last;
            *previous -= shortfall;
            *last += shortfall;
        }
    }
    sizes
}

fn midpoint_x(bbox: &BoundingBox) -> f64 {
    bbox.min_x + (bbox.max_x - bbox.min_x) / 2.0
}

fn midpoint_y(bbox: &BoundingBox) -> f64 {
    bbox.min_y + (bbox.max_y - bbox.min_y) / 2.0
}

fn compare_mid<V>(a: &Entry<V>, b: &Entry<V>, mid: fn(&BoundingBox) -> f64) -> Ordering {
    mid(a.bbox()).total_cmp(&mid(b.bbox()))
}
