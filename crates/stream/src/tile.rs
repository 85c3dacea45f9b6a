use std::sync::Arc;

use glam::Vec3;
use terrastream_common::{LodLevel, TileCoord};
use terrastream_elevation::ElevationGrid;
use terrastream_mesh::TileMesh;

use crate::StreamError;

/// A tile held in the resident set.
#[derive(Debug, Clone)]
pub struct ResidentTile {
    pub coord: TileCoord,
    pub lod: LodLevel,
    /// Unstitched grid; neighbours stitch against this.
    pub raw: Arc<ElevationGrid>,
    /// Stitched grid the mesh was built from.
    pub grid: Arc<ElevationGrid>,
    pub mesh: Arc<TileMesh>,
    pub visible: bool,
    pub loaded_tick: u64,
}

impl ResidentTile {
    pub fn origin(&self, tile_size: f32) -> Vec3 {
        self.coord.origin(tile_size)
    }
}

/// Lifecycle position of a tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Absent,
    InProgress,
    Resident(LodLevel),
}

/// Changes to the resident set, drained by the renderer after each update.
#[derive(Debug, Clone)]
pub enum TileEvent {
    Loaded {
        coord: TileCoord,
        lod: LodLevel,
        origin: Vec3,
        mesh: Arc<TileMesh>,
    },
    Relevelled {
        coord: TileCoord,
        from: LodLevel,
        to: LodLevel,
        mesh: Arc<TileMesh>,
    },
    Unloaded {
        coord: TileCoord,
    },
    Failed {
        coord: TileCoord,
        error: StreamError,
    },
}

impl TileEvent {
    pub fn coord(&self) -> TileCoord {
        match self {
            TileEvent::Loaded { coord, .. }
            | TileEvent::Relevelled { coord, .. }
            | TileEvent::Unloaded { coord }
            | TileEvent::Failed { coord, .. } => *coord,
        }
    }
}
