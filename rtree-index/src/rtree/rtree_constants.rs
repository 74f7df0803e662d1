//! Constants for the R-Tree implementation.

/// Default maximum number of entries per node (M)
pub const DEFAULT_MAX_FANOUT: usize = 128;

/// Smallest fanout that still lets STR packing shrink the working set
pub const MIN_MAX_FANOUT: usize = 2;

/// Largest accepted fanout; also bounds the fanout read back from an image
pub const MAX_MAX_FANOUT: usize = 1 << 16;

/// Slots reserved up front for a new node, whatever its fanout
pub const MAX_PREALLOCATED_SLOTS: usize = DEFAULT_MAX_FANOUT + 1;

/// Deepest node nesting accepted when decoding an image. Growing a tree by one
/// level at least doubles its entry count, so no real tree comes close.
pub const MAX_TREE_HEIGHT: usize = 64;

/// Entries reserved up front per decoded node, whatever count the image claims
pub const MAX_PREALLOCATED_DECODE: usize = 256;

/// Divisor applied to M to derive the minimum fill (m = max(1, M / 5))
pub const MIN_FILL_DIVISOR: usize = 5;

/// Near-zero threshold used by the subtree selection heuristics
pub const OVERLAP_EPSILON: f64 = 1e-5;

/// Default asymmetry bias of the split weighting function
pub const DEFAULT_ASYMMETRY: f64 = 1.0;

/// Default spread of the split weighting function
pub const DEFAULT_SPREAD: f64 = 0.5;

/// A query returning this many times M values is logged as unusually large
pub const LARGE_RESULT_FACTOR: usize = 10;
