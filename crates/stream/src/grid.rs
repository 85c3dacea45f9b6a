use glam::Vec3;
use terrastream_common::TileCoord;

/// Fixed-size square partition of the XZ plane into tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    tile_size: f32,
}

impl TileGrid {
    pub fn new(tile_size: f32) -> Self {
        debug_assert!(tile_size > 0.0, "tile_size must be positive");
        Self { tile_size }
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Tile containing a world position (Y is ignored).
    pub fn position_to_tile(&self, pos: Vec3) -> TileCoord {
        TileCoord::from_world(pos.x, pos.z, self.tile_size)
    }

    /// World transform of a tile: translation only.
    pub fn tile_origin(&self, coord: TileCoord) -> Vec3 {
        coord.origin(self.tile_size)
    }

    pub fn tile_center(&self, coord: TileCoord) -> Vec3 {
        self.tile_origin(coord) + Vec3::new(self.tile_size, 0.0, self.tile_size) * 0.5
    }
}

/// Every tile within Chebyshev `radius` of `center`, nearest first.
///
/// Ties are broken by coordinate so the order is stable across runs.
pub fn tiles_in_radius(center: TileCoord, radius: i32) -> Vec<TileCoord> {
    if radius < 0 {
        return Vec::new();
    }
    let side = (2 * radius + 1) as usize;
    let mut result = Vec::with_capacity(side * side);
    for dx in -radius..=radius {
        for dz in -radius..=radius {
            result.push(center.offset(dx, dz));
        }
    }
    result.sort_by_key(|c| (c.chebyshev(center), *c));
    // Offsets saturate at the i32 limits, which can repeat a coordinate.
    result.dedup();
    result
}
