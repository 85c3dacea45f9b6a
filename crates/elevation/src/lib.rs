//! Elevation: per-tile grids of normalized heights and point height queries.
//!
//! # Invariants
//! - Every sample of a generated grid lies inside the configured clamp bounds.
//! - A generated grid spans at least `min_variation` (max - min), unless
//!   `min_variation` is zero.
//! - Point queries are continuous everywhere and never depend on which tiles
//!   happen to be resident.

mod grid;
mod sampler;
mod source;

pub use grid::ElevationGrid;
pub use sampler::{ElevationSampler, RegionArchetype};
pub use source::ElevationSource;

use terrastream_common::TileCoord;

/// Errors from grid construction and tile generation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ElevationError {
    #[error("grid resolution must be at least 2, got {0}")]
    InvalidResolution(usize),
    #[error("tile size must be positive and finite, got {0}")]
    InvalidTileSize(f32),
    #[error("expected {expected} samples, got {actual}")]
    SampleCount { expected: usize, actual: usize },
    #[error("elevation source failed for tile {coord}: {reason}")]
    Source { coord: TileCoord, reason: String },
}

pub fn crate_info() -> &'static str {
    "terrastream-elevation v0.1.0"
}
