use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Level of detail. 0 is full resolution; each step halves the vertex density.
pub type LodLevel = u8;

/// Integer index of a square ground tile on the XZ plane.
///
/// Tile `(x, z)` covers world `[x * tile_size, (x + 1) * tile_size]` on X and
/// likewise on Z.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileCoord {
    pub x: i32,
    pub z: i32,
}

impl TileCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Tile containing the world-space point `(x, z)`.
    pub fn from_world(x: f32, z: f32, tile_size: f32) -> Self {
        Self {
            x: (x / tile_size).floor() as i32,
            z: (z / tile_size).floor() as i32,
        }
    }

    /// World-space origin (minimum corner) of this tile, at height zero.
    pub fn origin(self, tile_size: f32) -> Vec3 {
        Vec3::new(self.x as f32 * tile_size, 0.0, self.z as f32 * tile_size)
    }

    /// Neighbouring coordinate; saturates at the edge of the `i32` range.
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.z.saturating_add(dz))
    }

    /// Chebyshev distance in tile units: `max(|dx|, |dz|)`.
    pub fn chebyshev(self, other: TileCoord) -> u32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).unsigned_abs();
        dx.max(dz) as u32
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_world_floors_negative_positions() {
        assert_eq!(TileCoord::from_world(10.0, 10.0, 100.0), TileCoord::new(0, 0));
        assert_eq!(TileCoord::from_world(150.0, -5.0, 100.0), TileCoord::new(1, -1));
        assert_eq!(TileCoord::from_world(-100.0, -100.1, 100.0), TileCoord::new(-1, -2));
    }

    #[test]
    fn origin_is_coordinate_times_tile_size() {
        let origin = TileCoord::new(-2, 3).origin(50.0);
        assert_eq!(origin, Vec3::new(-100.0, 0.0, 150.0));
    }

    #[test]
    fn chebyshev_takes_the_larger_axis() {
        let a = TileCoord::new(0, 0);
        assert_eq!(a.chebyshev(TileCoord::new(3, -1)), 3);
        assert_eq!(a.chebyshev(TileCoord::new(-2, 2)), 2);
        assert_eq!(a.chebyshev(a), 0);
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let far = TileCoord::from_world(f32::MAX, -f32::MAX, 1.0);
        assert_eq!(far, TileCoord::new(i32::MAX, i32::MIN));
        assert_eq!(far.offset(1, -1), far);
        assert_eq!(far.offset(-1, 1), TileCoord::new(i32::MAX - 1, i32::MIN + 1));
        assert_eq!(far.chebyshev(TileCoord::new(i32::MIN, 0)), u32::MAX);
        assert_eq!(far.chebyshev(far.offset(-2, 0)), 2);
    }

    #[test]
    fn ordering_is_x_then_z() {
        let mut coords = vec![TileCoord::new(1, 0), TileCoord::new(0, 5), TileCoord::new(0, -1)];
        coords.sort();
        assert_eq!(
            coords,
            vec![TileCoord::new(0, -1), TileCoord::new(0, 5), TileCoord::new(1, 0)]
        );
    }
}
