use terrastream_common::TileCoord;

use crate::{ElevationError, ElevationGrid, ElevationSampler};

/// Anything that can produce raw (unstitched) tile grids and point heights.
///
/// The streaming layer only talks to this trait, so generation can be
/// swapped or wrapped without touching tile bookkeeping.
pub trait ElevationSource: Send + Sync {
    /// Edge length of one tile in world units.
    fn tile_size(&self) -> f32;

    /// LOD 0 vertices per tile edge.
    fn resolution(&self) -> usize;

    /// Generate the raw grid for `coord` at the configured size and resolution.
    fn raw_grid(&self, coord: TileCoord) -> Result<ElevationGrid, ElevationError>;

    /// World-space height at `(x, z)`, valid whether or not a tile is resident.
    fn elevation_at_point(&self, x: f32, z: f32) -> f32;
}

impl ElevationSource for ElevationSampler {
    fn tile_size(&self) -> f32 {
        ElevationSampler::tile_size(self)
    }

    fn resolution(&self) -> usize {
        ElevationSampler::resolution(self)
    }

    fn raw_grid(&self, coord: TileCoord) -> Result<ElevationGrid, ElevationError> {
        self.generate(coord, ElevationSampler::tile_size(self), ElevationSampler::resolution(self))
    }

    fn elevation_at_point(&self, x: f32, z: f32) -> f32 {
        ElevationSampler::elevation_at_point(self, x, z)
    }
}
