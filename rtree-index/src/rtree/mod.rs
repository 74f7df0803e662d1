//! In-memory R-Tree over axis-aligned 2D bounding boxes.
//!
//! The tree is an owned graph of slot arrays: every internal entry owns the
//! node below it and there are no parent pointers. Operations that need to walk
//! back up (insertion, deletion) record the slot indices they descended through
//! and re-navigate from the root, so ownership stays strictly tree shaped.
//!
//! - `bulk_load`: Sort-Tile-Recursive packing for static datasets
//! - `insert`: R*-style subtree selection and goal-function splits
//! - `remove`: underflow condensation with orphan reinsertion
//! - `query`: range traversal
//! - `persistence`: whole-tree byte image

pub mod rtree_types;
pub mod rtree_constants;
pub(crate) mod node;
pub(crate) mod bulk_load;
pub(crate) mod insert;
pub(crate) mod remove;
pub(crate) mod query;
mod persistence;
mod rtree_impl;

pub use rtree_types::{RTreeConfig, RTreeStats, SpatialError, SpatialResult};
pub use rtree_constants::DEFAULT_MAX_FANOUT;
pub use rtree_impl::{Iter, RTree};
