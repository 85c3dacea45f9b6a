//! Tile meshing: elevation grid in, vertex/index/normal/uv payload out.
//!
//! # Invariants
//! - A mesh built at LOD `L` from a grid of resolution `R` has
//!   `floor((R - 1) / 2^L) + 1` vertices per edge and `2 * (R' - 1)^2` triangles.
//! - Triangles wind counter-clockwise when viewed from +Y.
//! - Meshes are immutable once built; a LOD change builds a new one.

mod builder;
mod mesh;

pub use builder::{TileMeshBuilder, decimated_resolution, skip_factor};
pub use mesh::{TerrainVertex, TileMesh};

use terrastream_common::LodLevel;

/// Errors from mesh construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("grid resolution must be at least 2, got {0}")]
    GridTooSmall(usize),
    #[error("LOD {lod} leaves fewer than 2 vertices per edge for resolution {resolution}")]
    LodTooCoarse { lod: LodLevel, resolution: usize },
}

pub fn crate_info() -> &'static str {
    "terrastream-mesh v0.1.0"
}
