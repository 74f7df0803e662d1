//! Core types for the R-Tree implementation.
//!
//! This module defines:
//! - Error types and result types
//! - Tree configuration
//! - Statistics structures

use std::io;

use thiserror::Error;

use crate::bounding_box::BoundingBox;

use super::rtree_constants::{
    DEFAULT_ASYMMETRY, DEFAULT_MAX_FANOUT, DEFAULT_SPREAD, MAX_MAX_FANOUT, MIN_FILL_DIVISOR,
    MIN_MAX_FANOUT,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Unexpected end of stream while reading index")]
    UnexpectedEndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

// ============================================================================
// Configuration
// ============================================================================

/// Construction parameters of an [`RTree`](super::RTree).
///
/// The root envelope and the fanout are fixed for the lifetime of a tree. The
/// asymmetry and spread constants shape the weighting function used when an
/// overflowing node is split; the defaults suit most datasets.
///
/// # Example
///
/// ```rust
/// use rtree_index::{BoundingBox, RTreeConfig};
///
/// let config = RTreeConfig::new(BoundingBox::new(-180.0, -90.0, 180.0, 90.0))
///     .with_max_fanout(32);
/// assert_eq!(config.min_fill(), 6);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RTreeConfig {
    /// Envelope of the whole tree; queries outside of it return nothing
    pub root_envelope: BoundingBox,
    /// Maximum number of entries per node (M)
    pub max_fanout: usize,
    /// Pulls the preferred split position away from the exact center
    pub asymmetry: f64,
    /// Width of the preferred split region
    pub spread: f64,
}

impl RTreeConfig {
    /// Creates a configuration with the default fanout and split constants.
    pub fn new(root_envelope: BoundingBox) -> Self {
        Self {
            root_envelope,
            max_fanout: DEFAULT_MAX_FANOUT,
            asymmetry: DEFAULT_ASYMMETRY,
            spread: DEFAULT_SPREAD,
        }
    }

    /// Sets the maximum number of entries per node.
    pub fn with_max_fanout(mut self, max_fanout: usize) -> Self {
        self.max_fanout = max_fanout;
        self
    }

    /// Sets the asymmetry bias of the split weighting function.
    pub fn with_asymmetry(mut self, asymmetry: f64) -> Self {
        self.asymmetry = asymmetry;
        self
    }

    /// Sets the spread of the split weighting function.
    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Minimum number of entries a non-root node must hold: `max(1, M / 5)`.
    pub fn min_fill(&self) -> usize {
        (self.max_fanout / MIN_FILL_DIVISOR).max(1)
    }

    /// Checks that a tree can be built from this configuration.
    pub fn validate(&self) -> SpatialResult<()> {
        if !self.root_envelope.is_valid() {
            return Err(SpatialError::InvalidConfiguration(format!(
                "root envelope {} is malformed",
                self.root_envelope
            )));
        }
        if self.max_fanout < MIN_MAX_FANOUT {
            return Err(SpatialError::InvalidConfiguration(format!(
                "max fanout must be at least {}, got {}",
                MIN_MAX_FANOUT, self.max_fanout
            )));
        }
        if self.max_fanout > MAX_MAX_FANOUT {
            return Err(SpatialError::InvalidConfiguration(format!(
                "max fanout must be at most {}, got {}",
                MAX_MAX_FANOUT, self.max_fanout
            )));
        }
        if !self.asymmetry.is_finite() {
            return Err(SpatialError::InvalidConfiguration(
                "asymmetry must be a finite number".into(),
            ));
        }
        if !(self.spread.is_finite() && self.spread > 0.0) {
            return Err(SpatialError::InvalidConfiguration(
                "spread must be a positive finite number".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics about the shape of an R-Tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub tree_height: u32,
    pub node_count: u64,
    pub leaf_node_count: u64,
    /// Mean occupancy of all nodes relative to M (0.0 - 1.0)
    pub average_fill: f64,
}
