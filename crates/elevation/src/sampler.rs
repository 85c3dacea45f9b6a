use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use terrastream_common::{ElevationConfig, TerrainConfig, TileCoord};
use terrastream_noise::{NoiseField, hash, hash_unit};

use crate::{ElevationError, ElevationGrid};

/// (frequency multiplier, weight, lattice offset) for the three feature scales.
const LAYERS: [(f32, f32, f32); 3] = [(1.0, 0.6, 0.0), (3.0, 0.3, 101.7), (9.0, 0.1, -57.3)];

const SLOPE_SALT: u64 = 0x51f1_5eed_0000_0001;
const REGION_SALT: u64 = 0x7e61_0a5e_0000_0002;
const BOOST_SALT: u64 = 0xb005_7000_0000_0003;

const ARCHETYPE_COUNT: i64 = 5;

/// Large-scale terrain character shared by every tile of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionArchetype {
    Peaks,
    Valleys,
    Plateaus,
    Hills,
    Mixed,
}

impl RegionArchetype {
    /// Archetype for `(region_x + region_z) mod 5`.
    pub fn from_index(index: i64) -> Self {
        match index.rem_euclid(ARCHETYPE_COUNT) {
            0 => Self::Peaks,
            1 => Self::Valleys,
            2 => Self::Plateaus,
            3 => Self::Hills,
            _ => Self::Mixed,
        }
    }

    /// Reshape a raw value sampled at noise-space `(nx, nz)`.
    fn shape(self, value: f32, noise: &NoiseField, nx: f32, nz: f32) -> f32 {
        match self {
            Self::Peaks => {
                let ridge = noise.ridged_noise(nx * 2.0 + 11.1, nz * 2.0 - 5.3);
                0.6 * value + 0.5 * ridge * ridge
            }
            Self::Valleys => value.max(0.0).powf(1.6) + 0.05,
            Self::Plateaus => {
                let jitter = noise.fractal_noise(nx * 0.5 + 3.7, nz * 0.5 - 8.1) - 0.5;
                let threshold = 0.5 + 0.15 * jitter;
                if value > threshold {
                    threshold + (value - threshold) * 0.15
                } else {
                    value
                }
            }
            Self::Hills => 0.5 + (value - 0.5) * 0.6,
            Self::Mixed => {
                let peaks = Self::Peaks.shape(value, noise, nx, nz);
                let valleys = Self::Valleys.shape(value, noise, nx, nz);
                0.5 * (peaks + valleys)
            }
        }
    }
}

/// Planar tilt added to every tile so no tile is perfectly flat.
#[derive(Debug, Clone, Copy)]
struct TileSlope {
    cos: f32,
    sin: f32,
    magnitude: f32,
}

impl TileSlope {
    fn for_tile(coord: TileCoord, seed: u64, strength: f32) -> Self {
        let h = hash(coord.x, coord.z, seed ^ SLOPE_SALT);
        let angle = (h & 0xffff) as f32 / 65536.0 * TAU;
        let scale = ((h >> 16) & 0xffff) as f32 / 65536.0;
        Self {
            cos: angle.cos(),
            sin: angle.sin(),
            magnitude: strength * (0.5 + 0.5 * scale),
        }
    }

    fn at(&self, u: f32, v: f32) -> f32 {
        self.magnitude * ((u - 0.5) * self.cos + (v - 0.5) * self.sin)
    }
}

/// Builds tile elevation grids from a shared noise field.
#[derive(Debug, Clone)]
pub struct ElevationSampler {
    noise: Arc<NoiseField>,
    config: ElevationConfig,
    tile_size: f32,
    resolution: usize,
    height_scale: f32,
}

impl ElevationSampler {
    /// Build a sampler from an already validated terrain configuration.
    pub fn new(noise: Arc<NoiseField>, config: &TerrainConfig) -> Self {
        Self {
            noise,
            config: config.elevation.clone(),
            tile_size: config.tile_size,
            resolution: config.base_resolution,
            height_scale: config.height_scale,
        }
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    pub fn config(&self) -> &ElevationConfig {
        &self.config
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// Archetype of the region containing `coord`.
    pub fn region_archetype(&self, coord: TileCoord) -> RegionArchetype {
        let block = self.config.region_block_size.max(1) as i32;
        let rx = coord.x.div_euclid(block) as i64;
        let rz = coord.z.div_euclid(block) as i64;
        RegionArchetype::from_index(rx + rz)
    }

    /// Generate the grid for one tile.
    ///
    /// The result is a pure function of `(coord, tile_size, resolution)` and
    /// the sampler's configuration.
    pub fn generate(
        &self,
        coord: TileCoord,
        tile_size: f32,
        resolution: usize,
    ) -> Result<ElevationGrid, ElevationError> {
        if resolution < 2 {
            return Err(ElevationError::InvalidResolution(resolution));
        }
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(ElevationError::InvalidTileSize(tile_size));
        }

        let seed = self.noise.seed();
        let scale = self.noise.config().scale;
        let origin = coord.origin(tile_size);
        let last = (resolution - 1) as f32;
        let step = tile_size / last;
        let slope = TileSlope::for_tile(coord, seed, self.config.slope_strength);
        let archetype = self.region_archetype(coord);
        let (lo, hi) = (self.config.min_height, self.config.max_height);

        let mut samples = Vec::with_capacity(resolution * resolution);
        for j in 0..resolution {
            for i in 0..resolution {
                let wx = origin.x + i as f32 * step;
                let wz = origin.z + j as f32 * step;
                let raw = self.layered_value(wx, wz) + slope.at(i as f32 / last, j as f32 / last);
                let shaped = archetype.shape(raw, &self.noise, wx * scale, wz * scale);
                samples.push(shaped.clamp(lo, hi));
            }
        }

        let mut grid = ElevationGrid::new(coord, resolution, tile_size, seed, samples)?;
        if grid.range() < self.config.min_variation {
            tracing::debug!(%coord, range = grid.range(), "boosting flat tile");
            self.boost_variation(&mut grid);
        }
        Ok(grid)
    }

    /// Normalized elevation at a world position, in the clamp bounds.
    ///
    /// Uses only the continuous part of the field (multi-scale plus warp), so
    /// it has no seams at tile or region boundaries.
    pub fn normalized_elevation_at_point(&self, x: f32, z: f32) -> f32 {
        self.layered_value(x, z)
            .clamp(self.config.min_height, self.config.max_height)
    }

    /// Elevation at a world position in world height units.
    pub fn elevation_at_point(&self, x: f32, z: f32) -> f32 {
        self.normalized_elevation_at_point(x, z) * self.height_scale
    }

    /// Three weighted feature scales blended with the domain-warped layer.
    fn layered_value(&self, wx: f32, wz: f32) -> f32 {
        let scale = self.noise.config().scale;
        let (nx, nz) = (wx * scale, wz * scale);
        let layered: f32 = LAYERS
            .iter()
            .map(|&(freq, weight, offset)| {
                weight * self.noise.fractal_noise(nx * freq + offset, nz * freq - offset)
            })
            .sum();
        let warped = self.noise.warped_noise(nx, nz);
        let w = self.config.warp_weight.clamp(0.0, 1.0);
        (1.0 - w) * layered + w * warped
    }

    /// Replace a near-flat grid with a deterministic relief pattern whose
    /// spread is at least `min_variation`, centred on the grid's mean.
    fn boost_variation(&self, grid: &mut ElevationGrid) {
        let resolution = grid.resolution();
        let coord = grid.coord();
        let (lo, hi) = (self.config.min_height, self.config.max_height);
        let target = (self.config.min_variation * 1.2).min(hi - lo);
        let mean = grid.samples().iter().sum::<f32>() / grid.samples().len() as f32;
        let center = mean.clamp(lo + target * 0.5, hi - target * 0.5);

        let tile_seed = hash(coord.x, coord.z, self.noise.seed() ^ BOOST_SALT);
        let phase = (tile_seed & 0xffff) as f32 / 65536.0 * TAU;
        let last = (resolution - 1) as f32;

        let pattern: Vec<f32> = (0..resolution * resolution)
            .map(|idx| {
                let (i, j) = (idx % resolution, idx / resolution);
                let (u, v) = (i as f32 / last, j as f32 / last);
                let wave = (u * TAU + phase).sin() * (v * PI).cos();
                let radial = 1.0 - ((u - 0.5).hypot(v - 0.5) / 0.5f32.sqrt());
                let jitter = hash_unit(i as i32, j as i32, tile_seed) * 2.0 - 1.0;
                0.5 * wave + 0.3 * radial + 0.2 * jitter + 0.25 * u
            })
            .collect();

        let (pmin, pmax) = pattern
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(a, b), &p| (a.min(p), b.max(p)));
        let span = pmax - pmin;

        for (idx, p) in pattern.into_iter().enumerate() {
            let (i, j) = (idx % resolution, idx / resolution);
            let unit = if span > f32::EPSILON {
                (p - pmin) / span
            } else {
                i as f32 / last
            };
            grid.set(i, j, (center + (unit - 0.5) * target).clamp(lo, hi));
        }
    }
}
