//! Streaming: resident tile set around a moving viewer, load scheduling,
//! eviction, LOD re-levelling and seam-free edge stitching.
//!
//! # Invariants
//! - A tile coordinate is resident at most once and is never resident and
//!   in progress at the same time.
//! - Tile generation runs off the coordinating thread; every insert and
//!   eviction happens inside `TileStreamingManager::update`.
//! - A failed tile returns to `Absent` and is retried on a later update.

mod grid;
mod lod;
mod manager;
mod queue;
mod stats;
mod stitch;
mod tile;
mod view;

pub use grid::{TileGrid, tiles_in_radius};
pub use lod::LodPolicy;
pub use manager::TileStreamingManager;
pub use queue::{LoadJob, LoadQueue};
pub use stats::{GenerationTimer, StreamStats};
pub use stitch::{RawNeighbors, stitch_edges};
pub use tile::{ResidentTile, TileEvent, TileState};
pub use view::ViewCone;

use terrastream_common::ConfigError;
use terrastream_elevation::ElevationError;
use terrastream_mesh::MeshError;

/// Errors surfaced by the streaming layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("elevation generation failed: {0}")]
    Elevation(#[from] ElevationError),
    #[error("mesh build failed: {0}")]
    Mesh(#[from] MeshError),
}

pub fn crate_info() -> &'static str {
    "terrastream-stream v0.1.0"
}
