use terrastream_common::TileCoord;

use crate::ElevationError;

/// Square grid of normalized heights for one tile.
///
/// Samples are row-major: `j` walks +Z (rows), `i` walks +X (columns). Sample
/// `(i, j)` sits at world `origin + (i, j) * tile_size / (resolution - 1)`, so
/// the last column of a tile and the first column of its east neighbour share
/// world positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    coord: TileCoord,
    resolution: usize,
    tile_size: f32,
    seed: u64,
    samples: Vec<f32>,
}

impl ElevationGrid {
    /// Wrap an existing sample buffer. The buffer must hold `resolution^2` values.
    pub fn new(
        coord: TileCoord,
        resolution: usize,
        tile_size: f32,
        seed: u64,
        samples: Vec<f32>,
    ) -> Result<Self, ElevationError> {
        if resolution < 2 {
            return Err(ElevationError::InvalidResolution(resolution));
        }
        let expected = resolution * resolution;
        if samples.len() != expected {
            return Err(ElevationError::SampleCount {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            coord,
            resolution,
            tile_size,
            seed,
            samples,
        })
    }

    /// Grid with every sample set to `value`.
    pub fn filled(
        coord: TileCoord,
        resolution: usize,
        tile_size: f32,
        seed: u64,
        value: f32,
    ) -> Result<Self, ElevationError> {
        let count = resolution.saturating_mul(resolution);
        Self::new(coord, resolution, tile_size, seed, vec![value; count])
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Seed of the noise field the grid was generated from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Distance in world units between adjacent samples.
    pub fn spacing(&self) -> f32 {
        self.tile_size / (self.resolution - 1) as f32
    }

    fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.resolution && j < self.resolution);
        j * self.resolution + i
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.samples[self.index(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        let idx = self.index(i, j);
        self.samples[idx] = value;
    }

    /// Samples of column `i`, ordered by increasing Z.
    pub fn column(&self, i: usize) -> Vec<f32> {
        (0..self.resolution).map(|j| self.get(i, j)).collect()
    }

    /// Samples of row `j`, ordered by increasing X.
    pub fn row(&self, j: usize) -> Vec<f32> {
        let start = self.index(0, j);
        self.samples[start..start + self.resolution].to_vec()
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// `max - min` over all samples.
    pub fn range(&self) -> f32 {
        let (lo, hi) = self.min_max();
        hi - lo
    }

    /// Bilinear lookup at tile-local `(u, v)` in `[0, 1]`; inputs are clamped.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let last = (self.resolution - 1) as f32;
        let fx = u.clamp(0.0, 1.0) * last;
        let fz = v.clamp(0.0, 1.0) * last;
        let i0 = (fx.floor() as usize).min(self.resolution - 2);
        let j0 = (fz.floor() as usize).min(self.resolution - 2);
        let tx = fx - i0 as f32;
        let tz = fz - j0 as f32;

        let a = self.get(i0, j0) + (self.get(i0 + 1, j0) - self.get(i0, j0)) * tx;
        let b = self.get(i0, j0 + 1) + (self.get(i0 + 1, j0 + 1) - self.get(i0, j0 + 1)) * tx;
        a + (b - a) * tz
    }
}
