//! Node and entry model of the R-Tree.
//!
//! A node is a slot array of entries that are either all leaves (bbox + stored
//! value) or all internal (bbox + owned child node). A node may briefly hold
//! `M + 1` entries while an insertion is in flight; the insertion engine splits
//! it before returning.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, DeserializeSeed, EnumAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::bounding_box::BoundingBox;

use super::rtree_constants::{MAX_PREALLOCATED_DECODE, MAX_PREALLOCATED_SLOTS, MAX_TREE_HEIGHT};
use super::rtree_types::{RTreeStats, SpatialError, SpatialResult};

/// A single slot of a node.
#[derive(Debug, Clone, Serialize)]
pub(crate) enum Entry<V> {
    /// Stored item with the box supplied by the caller
    Leaf { bbox: BoundingBox, value: V },
    /// Subtree with the exact union of its children's boxes
    Internal {
        bbox: BoundingBox,
        children: NodeSlots<V>,
    },
}

impl<V> Entry<V> {
    pub(crate) fn leaf(bbox: BoundingBox, value: V) -> Self {
        Entry::Leaf { bbox, value }
    }

    /// Wraps a non-empty node into an internal entry covering it.
    pub(crate) fn internal(children: NodeSlots<V>) -> SpatialResult<Self> {
        let bbox = children.bbox().ok_or_else(|| {
            SpatialError::CorruptIndex("cannot wrap an empty node into an entry".into())
        })?;
        Ok(Entry::Internal { bbox, children })
    }

    pub(crate) fn bbox(&self) -> &BoundingBox {
        match self {
            Entry::Leaf { bbox, .. } | Entry::Internal { bbox, .. } => bbox,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Entry::Leaf { .. })
    }

    pub(crate) fn children(&self) -> Option<&NodeSlots<V>> {
        match self {
            Entry::Internal { children, .. } => Some(children),
            Entry::Leaf { .. } => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut NodeSlots<V>> {
        match self {
            Entry::Internal { children, .. } => Some(children),
            Entry::Leaf { .. } => None,
        }
    }

    /// Moves every stored pair reachable from this entry into `out`.
    pub(crate) fn collect_into(self, out: &mut Vec<(BoundingBox, V)>) {
        match self {
            Entry::Leaf { bbox, value } => out.push((bbox, value)),
            Entry::Internal { children, .. } => children.collect_into(out),
        }
    }
}

/// Ordered slot array of one node. Slots are always packed from index 0.
///
/// Decoding is hand-written so that the nesting depth of an untrusted image is
/// bounded by [`MAX_TREE_HEIGHT`] before the stack is.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub(crate) struct NodeSlots<V> {
    entries: Vec<Entry<V>>,
}

impl<V> Default for NodeSlots<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> NodeSlots<V> {
    /// Creates an empty node with room for the overflow slot. Very wide nodes
    /// grow on demand instead.
    pub(crate) fn with_capacity(max_fanout: usize) -> Self {
        let slots = max_fanout.saturating_add(1).min(MAX_PREALLOCATED_SLOTS);
        Self {
            entries: Vec::with_capacity(slots),
        }
    }

    pub(crate) fn from_entries(entries: Vec<Entry<V>>) -> Self {
        Self { entries }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// An empty node only ever exists as the root of an empty tree, which
    /// accepts leaf entries.
    pub(crate) fn is_leaf(&self) -> bool {
        self.entries.first().map_or(true, Entry::is_leaf)
    }

    pub(crate) fn entries(&self) -> &[Entry<V>] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Entry<V>] {
        &mut self.entries
    }

    pub(crate) fn push(&mut self, entry: Entry<V>) {
        self.entries.push(entry);
    }

    /// Removes the entry at `index`, shifting later entries left.
    pub(crate) fn remove(&mut self, index: usize) -> Option<Entry<V>> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Moves the entries from `at` onwards into a new node.
    pub(crate) fn split_off(&mut self, at: usize) -> NodeSlots<V> {
        NodeSlots {
            entries: self.entries.split_off(at),
        }
    }

    pub(crate) fn take_entries(&mut self) -> Vec<Entry<V>> {
        std::mem::take(&mut self.entries)
    }

    /// Minimum bounding box of all occupied slots.
    pub(crate) fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.entries.iter().map(Entry::bbox))
    }

    pub(crate) fn child(&self, index: usize) -> Option<&NodeSlots<V>> {
        self.entries.get(index)?.children()
    }

    /// Follows a path of slot indices from this node down to a descendant.
    pub(crate) fn descend_mut(&mut self, path: &[usize]) -> Option<&mut NodeSlots<V>> {
        let mut node = self;
        for &index in path {
            node = node.entries.get_mut(index)?.children_mut()?;
        }
        Some(node)
    }

    /// Recomputes the bbox of the internal entry at `index` from its children.
    pub(crate) fn refresh_bbox(&mut self, index: usize) {
        if let Some(Entry::Internal { bbox, children }) = self.entries.get_mut(index) {
            if let Some(tight) = children.bbox() {
                *bbox = tight;
            }
        }
    }

    /// Moves every stored pair below this node into `out`.
    pub(crate) fn collect_into(self, out: &mut Vec<(BoundingBox, V)>) {
        for entry in self.entries {
            entry.collect_into(out);
        }
    }

    /// Number of stored values below this node.
    pub(crate) fn count_values(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Leaf { .. } => 1,
                Entry::Internal { children, .. } => children.count_values(),
            })
            .sum()
    }

    /// Number of levels below and including this node (0 when empty).
    pub(crate) fn height(&self) -> u32 {
        let mut height = 0;
        let mut node = self;
        while let Some(first) = node.entries.first() {
            height += 1;
            match first.children() {
                Some(children) => node = children,
                None => break,
            }
        }
        height
    }

    pub(crate) fn tally(&self, stats: &mut RTreeStats, max_fanout: usize) {
        stats.node_count += 1;
        stats.average_fill += self.entries.len() as f64 / max_fanout as f64;
        if self.is_leaf() {
            stats.leaf_node_count += 1;
            stats.total_entries += self.entries.len() as u64;
            return;
        }
        for entry in &self.entries {
            if let Some(children) = entry.children() {
                children.tally(stats, max_fanout);
            }
        }
    }

    /// Verifies the structural invariants of the subtree rooted here and
    /// returns the number of stored values in it.
    ///
    /// `leaf_depth` is shared across the whole walk so that every leaf node is
    /// found at the same depth.
    pub(crate) fn check_structure(
        &self,
        max_fanout: usize,
        min_fill: usize,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> SpatialResult<usize> {
        let is_root = depth == 0;
        let n = self.entries.len();

        if n > max_fanout {
            return Err(corrupt(depth, format!("{} entries exceed the fanout {}", n, max_fanout)));
        }
        if !is_root && n < min_fill {
            return Err(corrupt(
                depth,
                format!("{} entries are below the minimum fill {}", n, min_fill),
            ));
        }

        let leaf_level = self.is_leaf();
        if self.entries.iter().any(|e| e.is_leaf() != leaf_level) {
            return Err(corrupt(depth, "node mixes leaf and internal entries".into()));
        }

        if leaf_level {
            if n > 0 {
                match *leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(corrupt(
                            depth,
                            format!("leaf found at depth {}, expected {}", depth, expected),
                        ));
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }
            }
            if let Some(bad) = self.entries.iter().find(|e| !e.bbox().is_valid()) {
                return Err(corrupt(depth, format!("leaf holds malformed box {}", bad.bbox())));
            }
            return Ok(n);
        }

        let mut values = 0;
        for entry in &self.entries {
            if let Entry::Internal { bbox, children } = entry {
                let tight = children.bbox();
                if tight != Some(*bbox) {
                    return Err(corrupt(
                        depth,
                        format!("entry box {} is not the union of its children", bbox),
                    ));
                }
                values += children.check_structure(max_fanout, min_fill, depth + 1, leaf_depth)?;
            }
        }
        Ok(values)
    }
}

// ============================================================================
// Decoding
// ============================================================================

const ENTRY_VARIANTS: &[&str] = &["Leaf", "Internal"];

#[derive(Clone, Copy, Deserialize)]
#[serde(variant_identifier)]
enum EntryKind {
    Leaf,
    Internal,
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for NodeSlots<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NodeSeed::at(0).deserialize(deserializer)
    }
}

/// Decodes the node found `depth` levels below the root.
struct NodeSeed<V> {
    depth: usize,
    marker: PhantomData<V>,
}

impl<V> NodeSeed<V> {
    fn at(depth: usize) -> Self {
        Self {
            depth,
            marker: PhantomData,
        }
    }
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for NodeSeed<V> {
    type Value = NodeSlots<V>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        if self.depth >= MAX_TREE_HEIGHT {
            return Err(de::Error::custom(format!(
                "nodes nested deeper than {} levels",
                MAX_TREE_HEIGHT
            )));
        }
        deserializer.deserialize_seq(self)
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for NodeSeed<V> {
    type Value = NodeSlots<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a sequence of R-Tree entries")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let hint = seq.size_hint().unwrap_or(0).min(MAX_PREALLOCATED_DECODE);
        let mut entries = Vec::with_capacity(hint);
        while let Some(entry) = seq.next_element_seed(EntrySeed::<V>::at(self.depth))? {
            entries.push(entry);
        }
        Ok(NodeSlots { entries })
    }
}

/// Decodes one entry of a node at `depth`.
struct EntrySeed<V> {
    depth: usize,
    marker: PhantomData<V>,
}

impl<V> EntrySeed<V> {
    fn at(depth: usize) -> Self {
        Self {
            depth,
            marker: PhantomData,
        }
    }
}

impl<'de, V: Deserialize<'de>> DeserializeSeed<'de> for EntrySeed<V> {
    type Value = Entry<V>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_enum("Entry", ENTRY_VARIANTS, self)
    }
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for EntrySeed<V> {
    type Value = Entry<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a leaf or internal R-Tree entry")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Self::Value, A::Error> {
        let (kind, variant) = data.variant::<EntryKind>()?;
        let fields: &'static [&'static str] = match kind {
            EntryKind::Leaf => &["bbox", "value"],
            EntryKind::Internal => &["bbox", "children"],
        };
        variant.struct_variant(
            fields,
            EntryFields {
                kind,
                depth: self.depth,
                marker: PhantomData,
            },
        )
    }
}

/// Field sequence of one entry variant.
struct EntryFields<V> {
    kind: EntryKind,
    depth: usize,
    marker: PhantomData<V>,
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for EntryFields<V> {
    type Value = Entry<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the fields of an R-Tree entry")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let bbox: BoundingBox = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        match self.kind {
            EntryKind::Leaf => {
                let value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Entry::Leaf { bbox, value })
            }
            EntryKind::Internal => {
                let children = seq
                    .next_element_seed(NodeSeed::at(self.depth + 1))?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Entry::Internal { bbox, children })
            }
        }
    }
}

fn corrupt(depth: usize, message: String) -> SpatialError {
    SpatialError::CorruptIndex(format!("node at depth {}: {}", depth, message))
}
