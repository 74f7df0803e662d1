//! # rtree_index - In-Memory R-Tree Spatial Index
//!
//! An R-Tree over axis-aligned 2D bounding boxes that answers "which stored
//! objects overlap this window" without scanning every object.
//!
//! ## Features
//!
//! - **Bulk Loading**: Sort-Tile-Recursive packing builds near-full, balanced trees
//! - **Incremental Updates**: R*-style subtree selection and goal-function splits
//! - **Deletion**: underflowing nodes are dissolved and their entries reinserted
//! - **Persistence**: the whole tree round-trips through a compact byte image
//! - **Sharing**: [`SharedRTree`] wraps a tree in a readers-writer lock
//!
//! Intersection is strict: boxes that only touch along an edge or at a corner
//! do not intersect, and degenerate (point or line) boxes never intersect
//! anything.
//!
//! ## Quick Start
//!
//! ```rust
//! use rtree_index::{BoundingBox, RTree};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = RTree::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 16)?;
//! tree.bulk_load((0..100).map(|i| {
//!     let x = (i % 10) as f64 * 10.0;
//!     let y = (i / 10) as f64 * 10.0;
//!     (BoundingBox::new(x, y, x + 1.0, y + 1.0), i)
//! }))?;
//!
//! let hits = tree.query(&BoundingBox::new(0.0, 0.0, 15.0, 15.0));
//! assert_eq!(hits.len(), 4);
//!
//! let bytes = tree.serialize()?;
//! let restored: RTree<i32> = RTree::deserialize(&bytes)?;
//! assert_eq!(restored.len(), 100);
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod rtree;
pub mod shared;
pub mod spatial_index;

pub use bounding_box::BoundingBox;
pub use rtree::{
    Iter, RTree, RTreeConfig, RTreeStats, SpatialError, SpatialResult, DEFAULT_MAX_FANOUT,
};
pub use shared::SharedRTree;
pub use spatial_index::SpatialIndex;
