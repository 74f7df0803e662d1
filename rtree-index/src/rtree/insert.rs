//! Single-entry insertion: subtree selection, overflow splitting and
//! bottom-up box adjustment.
//!
//! Ancestry is carried as a path of slot indices from the root to the leaf
//! node that receives the entry. Each level is re-entered from the root when
//! the path is walked back up, so no node ever refers to its parent.

use crate::bounding_box::BoundingBox;

use super::node::{Entry, NodeSlots};
use super::rtree_constants::OVERLAP_EPSILON;
use super::rtree_types::{RTreeConfig, SpatialError, SpatialResult};

/// Inserts one leaf entry below `root`, splitting and growing as needed.
pub(crate) fn insert_entry<V>(
    root: &mut NodeSlots<V>,
    bbox: BoundingBox,
    value: V,
    config: &RTreeConfig,
) -> SpatialResult<()> {
    let trace = choose_leaf(root, &bbox)?;

    let leaf = root.descend_mut(&trace).ok_or_else(lost_path)?;
    leaf.push(Entry::leaf(bbox, value));
    let sibling = if leaf.len() > config.max_fanout {
        Some(split_node(leaf, config)?)
    } else {
        None
    };

    adjust_tree(root, &trace, sibling, config)
}

/// Descends from the root to the leaf-level node best suited for `bbox`.
fn choose_leaf<V>(root: &NodeSlots<V>, bbox: &BoundingBox) -> SpatialResult<Vec<usize>> {
    let mut trace = Vec::new();
    let mut node = root;
    while !node.is_leaf() {
        let index = choose_subtree(node.entries(), bbox);
        trace.push(index);
        node = node.child(index).ok_or_else(lost_path)?;
    }
    Ok(trace)
}

/// Walks the trace bottom-up, tightening every ancestor box and placing split
/// siblings into their parents. A split of the root grows the tree by one level.
fn adjust_tree<V>(
    root: &mut NodeSlots<V>,
    trace: &[usize],
    mut sibling: Option<Entry<V>>,
    config: &RTreeConfig,
) -> SpatialResult<()> {
    for depth in (0..trace.len()).rev() {
        let node = root.descend_mut(&trace[..depth]).ok_or_else(lost_path)?;
        node.refresh_bbox(trace[depth]);

        if let Some(entry) = sibling.take() {
            node.push(entry);
            if node.len() > config.max_fanout {
                sibling = Some(split_node(node, config)?);
            }
        }
    }

    if let Some(entry) = sibling {
        let old_root = std::mem::replace(root, NodeSlots::with_capacity(config.max_fanout));
        root.push(Entry::internal(old_root)?);
        root.push(entry);
        log::debug!("Root split, tree height is now {}", root.height());
    }
    Ok(())
}

// ============================================================================
// ChooseSubtree
// ============================================================================

/// Picks the child entry of an internal node that should receive `bbox`.
pub(crate) fn choose_subtree<V>(entries: &[Entry<V>], bbox: &BoundingBox) -> usize {
    // Children that already cover the box: smallest area wins.
    let mut covering: Option<(usize, f64)> = None;
    for (index, entry) in entries.iter().enumerate() {
        if entry.bbox().enlargement(bbox) < OVERLAP_EPSILON {
            let area = entry.bbox().area();
            if covering.map_or(true, |(_, best)| area < best) {
                covering = Some((index, area));
            }
        }
    }
    if let Some((index, _)) = covering {
        return index;
    }

    // Rank children by perimeter growth.
    let mut ranked: Vec<(usize, f64)> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let current = entry.bbox();
            (index, current.union(bbox).perimeter() - current.perimeter())
        })
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let boxes: Vec<BoundingBox> = ranked
        .iter()
        .map(|&(index, _)| *entries[index].bbox())
        .collect();
    let first = boxes[0];

    let total: f64 = boxes[1..]
        .iter()
        .map(|other| perimeter_overlap(&first, other, bbox))
        .sum();
    if total < OVERLAP_EPSILON {
        return ranked[0].0;
    }

    // Only candidates up to the one hurt most by growing the first are considered.
    let mut last = 0;
    let mut max_overlap = 0.0;
    for (rank, other) in boxes.iter().enumerate().skip(1) {
        let overlap = perimeter_overlap(&first, other, bbox);
        if overlap > max_overlap {
            max_overlap = overlap;
            last = rank;
        }
    }

    let candidates = &boxes[..=last];
    let mut overlap = vec![0.0; candidates.len()];
    let mut visited = vec![false; candidates.len()];
    if let Some(rank) = find_overlap_free(0, candidates, bbox, &mut overlap, &mut visited) {
        return ranked[rank].0;
    }

    let rank = (0..candidates.len())
        .filter(|&rank| visited[rank])
        .min_by(|&a, &b| overlap[a].total_cmp(&overlap[b]))
        .unwrap_or(0);
    ranked[rank].0
}

/// Depth-first search through candidates whose growth would overlap another
/// candidate, looking for one whose accumulated overlap stays below epsilon.
fn find_overlap_free(
    rank: usize,
    candidates: &[BoundingBox],
    bbox: &BoundingBox,
    overlap: &mut [f64],
    visited: &mut [bool],
) -> Option<usize> {
    visited[rank] = true;
    for other in 0..candidates.len() {
        if other == rank {
            continue;
        }
        let growth = area_overlap(&candidates[rank], &candidates[other], bbox);
        overlap[rank] += growth;
        if growth > 0.0 && !visited[other] {
            if let Some(found) = find_overlap_free(other, candidates, bbox, overlap, visited) {
                return Some(found);
            }
        }
    }
    (overlap[rank] < OVERLAP_EPSILON).then_some(rank)
}

/// Growth of the overlap perimeter between `grown` and `other` when `bbox` is
/// added to `grown`.
fn perimeter_overlap(grown: &BoundingBox, other: &BoundingBox, bbox: &BoundingBox) -> f64 {
    let after = grown
        .union(bbox)
        .intersection_box(other)
        .map_or(0.0, |common| common.perimeter());
    let before = grown
        .intersection_box(other)
        .map_or(0.0, |common| common.perimeter());
    after - before
}

/// Growth of the overlap area between `grown` and `other` when `bbox` is
/// added to `grown`.
fn area_overlap(grown: &BoundingBox, other: &BoundingBox, bbox: &BoundingBox) -> f64 {
    let after = grown
        .union(bbox)
        .intersection_box(other)
        .map_or(0.0, |common| common.area());
    let before = grown
        .intersection_box(other)
        .map_or(0.0, |common| common.area());
    after - before
}

// ============================================================================
// Split
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn bounds(self, bbox: &BoundingBox) -> (f64, f64) {
        match self {
            Axis::X => (bbox.min_x, bbox.max_x),
            Axis::Y => (bbox.min_y, bbox.max_y),
        }
    }
}

/// Splits an overflowing node in place and returns the new sibling entry
/// holding the tail of the reordered slots.
pub(crate) fn split_node<V>(node: &mut NodeSlots<V>, config: &RTreeConfig) -> SpatialResult<Entry<V>> {
    if node.is_leaf() {
        let boxes: Vec<BoundingBox> = node.entries().iter().map(|e| *e.bbox()).collect();
        let axis = choose_split_axis(&boxes, config.min_fill());
        sort_along(node.entries_mut(), axis, Entry::bbox);
    }

    let boxes: Vec<BoundingBox> = node.entries().iter().map(|e| *e.bbox()).collect();
    let index = choose_split_index(&boxes, config).ok_or_else(|| {
        SpatialError::CorruptIndex(format!("cannot split a node of {} entries", boxes.len()))
    })?;
    log::trace!("Splitting node of {} entries after slot {}", boxes.len(), index);

    let tail = node.split_off(index + 1);
    Entry::internal(tail)
}

/// Stable sort by the axis minimum, then by the axis maximum.
fn sort_along<T>(items: &mut [T], axis: Axis, bbox_of: impl Fn(&T) -> &BoundingBox) {
    items.sort_by(|a, b| axis.bounds(bbox_of(a)).0.total_cmp(&axis.bounds(bbox_of(b)).0));
    items.sort_by(|a, b| axis.bounds(bbox_of(a)).1.total_cmp(&axis.bounds(bbox_of(b)).1));
}

/// Axis whose sorted order yields the smaller total perimeter over all split
/// positions. Y wins ties.
fn choose_split_axis(boxes: &[BoundingBox], min_fill: usize) -> Axis {
    let cost = |axis: Axis| {
        let mut sorted = boxes.to_vec();
        sort_along(&mut sorted, axis, |b| b);
        let (prefix, suffix) = running_unions(&sorted);
        split_positions(sorted.len(), min_fill)
            .map(|i| prefix[i].perimeter() + suffix[i + 1].perimeter())
            .sum::<f64>()
    };
    if cost(Axis::X) < cost(Axis::Y) {
        Axis::X
    } else {
        Axis::Y
    }
}

/// Position after which the node is cut, minimizing the weighted goal value.
fn choose_split_index(boxes: &[BoundingBox], config: &RTreeConfig) -> Option<usize> {
    let (prefix, suffix) = running_unions(boxes);
    let mut best: Option<(usize, f64)> = None;

    for i in split_positions(boxes.len(), config.min_fill()) {
        let left = prefix[i];
        let right = suffix[i + 1];
        let goal = split_goal(&left, &right);
        let weight = split_weight(i, config);
        let score = if left.intersects(&right) {
            goal / weight
        } else {
            goal * weight
        };
        if best.map_or(true, |(_, lowest)| score < lowest) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Cut positions leaving at least `min_fill` entries on each side.
fn split_positions(len: usize, min_fill: usize) -> std::ops::Range<usize> {
    let start = min_fill.saturating_sub(1);
    start..len.saturating_sub(min_fill).max(start)
}

/// `prefix[i]` covers `boxes[..=i]`, `suffix[i]` covers `boxes[i..]`.
fn running_unions(boxes: &[BoundingBox]) -> (Vec<BoundingBox>, Vec<BoundingBox>) {
    let mut prefix: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for bbox in boxes {
        let next = prefix.last().map_or(*bbox, |acc| acc.union(bbox));
        prefix.push(next);
    }
    let mut suffix: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for bbox in boxes.iter().rev() {
        let next = suffix.last().map_or(*bbox, |acc| acc.union(bbox));
        suffix.push(next);
    }
    suffix.reverse();
    (prefix, suffix)
}

/// Overlapping halves cost the perimeter of their common box. Disjoint halves
/// cost their combined perimeter measured against the largest perimeter the
/// node could produce, so the value is negative and rewards wide gaps.
fn split_goal(left: &BoundingBox, right: &BoundingBox) -> f64 {
    match left.intersection_box(right) {
        Ok(common) => common.perimeter(),
        Err(_) => {
            let all = left.union(right);
            let max_perimeter = 2.0 * all.perimeter() - (2.0 * all.width()).min(2.0 * all.height());
            left.perimeter() + right.perimeter() - max_perimeter
        }
    }
}

/// Gaussian-shaped weight over the normalized cut position, peaking near a
/// balanced split shifted by the asymmetry bias.
fn split_weight(i: usize, config: &RTreeConfig) -> f64 {
    let slots = (config.max_fanout + 1) as f64;
    let min_fill = config.min_fill() as f64;
    let spread = config.spread;

    let mu = (1.0 - 2.0 * min_fill / slots) * config.asymmetry;
    let x = 2.0 * i as f64 / slots - 1.0;
    let sigma = spread * (1.0 + mu.abs());
    let y1 = (-1.0 / (spread * spread)).exp();
    let ys = 1.0 / (1.0 - y1);
    ys * (-((x - mu) / sigma).powi(2)).exp() - y1
}

fn lost_path() -> SpatialError {
    SpatialError::CorruptIndex("insertion path no longer leads to a node".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_fanout: usize) -> RTreeConfig {
        RTreeConfig::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0)).with_max_fanout(max_fanout)
    }

    fn unit(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x, y, x + 1.0, y + 1.0)
    }

    fn subtree(boxes: &[BoundingBox]) -> Entry<u32> {
        let node = NodeSlots::from_entries(boxes.iter().map(|b| Entry::leaf(*b, 0)).collect());
        Entry::internal(node).unwrap()
    }

    #[test]
    fn test_choose_subtree_prefers_covering_child_with_smallest_area() {
        let entries = vec![
            subtree(&[BoundingBox::new(0.0, 0.0, 10.0, 10.0)]),
            subtree(&[BoundingBox::new(2.0, 2.0, 6.0, 6.0)]),
            subtree(&[BoundingBox::new(20.0, 20.0, 30.0, 30.0)]),
        ];
        assert_eq!(choose_subtree(&entries, &unit(3.0, 3.0)), 1);
    }

    #[test]
    fn test_choose_subtree_takes_least_perimeter_growth_without_overlap() {
        let entries = vec![
            subtree(&[BoundingBox::new(0.0, 0.0, 2.0, 2.0)]),
            subtree(&[BoundingBox::new(50.0, 50.0, 52.0, 52.0)]),
        ];
        assert_eq!(choose_subtree(&entries, &unit(53.0, 53.0)), 1);
        assert_eq!(choose_subtree(&entries, &unit(3.0, 0.0)), 0);
    }

    #[test]
    fn test_choose_subtree_falls_back_to_least_overlap() {
        // The box straddles the gap, so growing either child overlaps the other.
        let entries = vec![
            subtree(&[BoundingBox::new(3.0, 0.0, 5.0, 2.0)]),
            subtree(&[BoundingBox::new(0.0, 0.0, 2.0, 2.0)]),
        ];
        let picked = choose_subtree(&entries, &BoundingBox::new(1.5, 0.5, 3.2, 1.0));
        assert_eq!(picked, 1);
    }

    #[test]
    fn test_overlap_growth() {
        let grown = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let other = BoundingBox::new(3.0, 0.0, 5.0, 2.0);
        let bbox = BoundingBox::new(3.5, 0.5, 4.0, 1.0);
        // after growth the common box is [3,0,4,2]
        assert_eq!(area_overlap(&grown, &other, &bbox), 2.0);
        assert_eq!(perimeter_overlap(&grown, &other, &bbox), 3.0);
        assert_eq!(area_overlap(&grown, &other, &unit(-3.0, 0.0)), 0.0);
    }

    #[test]
    fn test_split_positions() {
        // M = 4, m = 1, five entries: cut after slot 0..=3
        assert_eq!(split_positions(5, 1), 0..4);
        // M = 10, m = 2, eleven entries: cut after slot 1..=8
        assert_eq!(split_positions(11, 2), 1..9);
    }

    #[test]
    fn test_split_weight_is_positive_and_peaks_inside() {
        let centered = config(10).with_asymmetry(0.0);
        let weights: Vec<f64> = split_positions(11, 2)
            .map(|i| split_weight(i, &centered))
            .collect();
        assert!(weights.iter().all(|w| *w > 0.0));
        let peak = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(peak > 0 && peak < weights.len() - 1);

        // the default bias favours cutting late
        let biased = config(10);
        assert!(split_weight(8, &biased) > split_weight(1, &biased));
        assert!(split_weight(1, &biased) > 0.0);
    }

    #[test]
    fn test_split_goal_rewards_disjoint_halves() {
        let left = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let far = BoundingBox::new(10.0, 0.0, 11.0, 1.0);
        let overlapping = BoundingBox::new(0.5, 0.0, 1.5, 1.0);
        assert!(split_goal(&left, &far) < 0.0);
        assert_eq!(split_goal(&left, &overlapping), 1.5);
    }

    #[test]
    fn test_split_axis_follows_the_spread_of_the_entries() {
        let offsets = [6.0, 0.0, 12.0, 3.0, 9.0];
        let along_x: Vec<BoundingBox> = offsets.iter().map(|&o| unit(o, 0.0)).collect();
        assert_eq!(choose_split_axis(&along_x, 1), Axis::X);
        let along_y: Vec<BoundingBox> = offsets.iter().map(|&o| unit(0.0, o)).collect();
        assert_eq!(choose_split_axis(&along_y, 1), Axis::Y);
    }

    #[test]
    fn test_split_node_keeps_fill_bounds() {
        let config = config(10);
        let mut node: NodeSlots<u32> = NodeSlots::with_capacity(10);
        for i in 0..11 {
            node.push(Entry::leaf(unit(i as f64 * 2.0, (i % 3) as f64), i));
        }
        let sibling = split_node(&mut node, &config).unwrap();
        let tail = sibling.children().unwrap();
        assert!(node.len() >= config.min_fill() && node.len() <= 10);
        assert!(tail.len() >= config.min_fill() && tail.len() <= 10);
        assert_eq!(node.len() + tail.len(), 11);
        // entries were sorted along x, so the halves do not interleave
        let left = node.bbox().unwrap();
        assert!(left.max_x <= sibling.bbox().min_x);
    }

    #[test]
    fn test_insert_grows_root_on_overflow() {
        let config = config(4);
        let mut root = NodeSlots::with_capacity(4);
        for (i, x) in [0.0, 2.0, 4.0, 6.0, 8.0].iter().enumerate() {
            insert_entry(&mut root, BoundingBox::new(*x, *x, x + 1.0, x + 1.0), i, &config).unwrap();
        }
        assert_eq!(root.len(), 2);
        assert!(!root.is_leaf());
        assert_eq!(root.height(), 2);
        assert_eq!(root.check_structure(4, 1, 0, &mut None).unwrap(), 5);
    }

    #[test]
    fn test_many_inserts_keep_structure() {
        let config = config(6);
        let mut root = NodeSlots::with_capacity(6);
        for i in 0..300u32 {
            let x = ((i * 37) % 97) as f64;
            let y = ((i * 53) % 89) as f64;
            insert_entry(&mut root, BoundingBox::new(x, y, x + 0.5, y + 0.5), i, &config).unwrap();
        }
        let stored = root
            .check_structure(config.max_fanout, config.min_fill(), 0, &mut None)
            .unwrap();
        assert_eq!(stored, 300);
    }
}
