//! Static terrain configuration.
//!
//! Every struct deserializes with `#[serde(default)]` so a config file only
//! needs to name the values it overrides. `TerrainConfig::validate` is the one
//! place configuration is checked; an invalid config is a startup error.

use serde::{Deserialize, Serialize};

use crate::types::LodLevel;

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("base resolution must be at least 2, got {0}")]
    InvalidResolution(usize),
    #[error("tile size must be positive and finite, got {0}")]
    InvalidTileSize(f32),
    #[error("height scale must be non-negative and finite, got {0}")]
    InvalidHeightScale(f32),
    #[error("noise octaves must be at least 1")]
    ZeroOctaves,
    #[error("noise scale must be positive and finite, got {0}")]
    InvalidNoiseScale(f32),
    #[error("persistence must lie in (0, 1], got {0}")]
    InvalidPersistence(f32),
    #[error("lacunarity must be at least 1, got {0}")]
    InvalidLacunarity(f32),
    #[error("warp strength and warp scale must be finite and non-negative, got strength {strength}, scale {scale}")]
    InvalidWarp { strength: f32, scale: f32 },
    #[error("clamp bounds must satisfy 0 <= min < max <= 1, got [{min}, {max}]")]
    InvalidClampBounds { min: f32, max: f32 },
    #[error("minimum variation {min_variation} does not fit inside the clamp range {range}")]
    VariationOutOfBounds { min_variation: f32, range: f32 },
    #[error("slope strength must be finite and non-negative, got {0}")]
    InvalidSlopeStrength(f32),
    #[error("warp weight must lie in [0, 1], got {0}")]
    InvalidWarpWeight(f32),
    #[error("region block size must be at least 1")]
    ZeroRegionBlockSize,
    #[error("radii must be non-negative, got load {load}, unload {unload}")]
    NegativeRadius { load: i32, unload: i32 },
    #[error("load radius {load} exceeds unload radius {unload}")]
    LoadBeyondUnload { load: i32, unload: i32 },
    #[error("LOD thresholds must be non-empty and strictly increasing, got {0:?}")]
    InvalidLodThresholds(Vec<u32>),
    #[error("LOD hysteresis must be at least 1")]
    ZeroHysteresis,
    #[error("max visible tiles must be at least 1")]
    ZeroCapacity,
    #[error("max loads per tick must be at least 1")]
    ZeroLoadBudget,
    #[error("LOD interval must be at least 1 tick")]
    ZeroLodInterval,
    #[error("resolution {resolution} cannot be decimated to LOD {max_lod}: (resolution - 1) must be divisible by {skip}")]
    ResolutionNotDecimable {
        resolution: usize,
        max_lod: LodLevel,
        skip: usize,
    },
}

/// Parameters of the deterministic noise field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub seed: u64,
    /// World units to noise-lattice units for the largest feature scale.
    pub scale: f32,
    pub octaves: u32,
    /// Amplitude multiplier per octave.
    pub persistence: f32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,
    /// Offset applied by the warp field, in noise-lattice units.
    pub warp_strength: f32,
    /// Frequency of the warp field relative to the sampled coordinates.
    pub warp_scale: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            scale: 0.004,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
            warp_strength: 0.8,
            warp_scale: 0.35,
        }
    }
}

/// Shaping applied on top of raw noise when building tile grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Lower clamp bound for normalized elevation.
    pub min_height: f32,
    /// Upper clamp bound for normalized elevation.
    pub max_height: f32,
    /// Smallest acceptable max-min spread across one tile grid.
    pub min_variation: f32,
    /// Edge length of a region, in tiles.
    pub region_block_size: u32,
    /// Peak magnitude of the per-tile guaranteed slope.
    pub slope_strength: f32,
    /// Share of the domain-warped layer in the combined value.
    pub warp_weight: f32,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            min_height: 0.1,
            max_height: 0.9,
            min_variation: 0.1,
            region_block_size: 4,
            slope_strength: 0.06,
            warp_weight: 0.25,
        }
    }
}

/// Streaming radii, LOD thresholds and per-tick budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chebyshev radius (in tiles) around the viewer that is loaded.
    pub load_radius: i32,
    /// Chebyshev radius beyond which resident tiles are evicted.
    pub unload_radius: i32,
    /// `lod_thresholds[i]` is the largest distance still drawn at LOD `i`.
    pub lod_thresholds: Vec<u32>,
    /// Minimum LOD difference that triggers a mesh rebuild.
    pub lod_hysteresis: LodLevel,
    /// Cap on resident tiles.
    pub max_visible_tiles: usize,
    /// Maximum number of tiles generated per update.
    pub max_loads_per_tick: usize,
    /// Deferral per ring of distance before a queued load may start.
    pub load_delay_ticks: u64,
    /// Interval between LOD/visibility passes.
    pub lod_interval_ticks: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            load_radius: 3,
            unload_radius: 5,
            lod_thresholds: vec![1, 2, 3],
            lod_hysteresis: 2,
            max_visible_tiles: 128,
            max_loads_per_tick: 4,
            load_delay_ticks: 1,
            lod_interval_ticks: 10,
        }
    }
}

impl StreamConfig {
    /// Coarsest LOD the thresholds can select.
    pub fn max_lod(&self) -> LodLevel {
        self.lod_thresholds.len().min(LodLevel::MAX as usize) as LodLevel
    }
}

/// Complete static configuration for the terrain core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Tile edge length in world units.
    pub tile_size: f32,
    /// Vertices per tile edge at LOD 0.
    pub base_resolution: usize,
    /// World height of a normalized elevation of 1.0.
    pub height_scale: f32,
    pub noise: NoiseConfig,
    pub elevation: ElevationConfig,
    pub stream: StreamConfig,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            tile_size: 100.0,
            base_resolution: 33,
            height_scale: 40.0,
            noise: NoiseConfig::default(),
            elevation: ElevationConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl TerrainConfig {
    /// Check every constraint the generation and streaming code relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_resolution < 2 {
            return Err(ConfigError::InvalidResolution(self.base_resolution));
        }
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(ConfigError::InvalidTileSize(self.tile_size));
        }
        if !(self.height_scale.is_finite() && self.height_scale >= 0.0) {
            return Err(ConfigError::InvalidHeightScale(self.height_scale));
        }
        self.validate_noise()?;
        self.validate_elevation()?;
        self.validate_stream()
    }

    fn validate_noise(&self) -> Result<(), ConfigError> {
        let noise = &self.noise;
        if noise.octaves == 0 {
            return Err(ConfigError::ZeroOctaves);
        }
        if !(noise.scale.is_finite() && noise.scale > 0.0) {
            return Err(ConfigError::InvalidNoiseScale(noise.scale));
        }
        if !(noise.persistence > 0.0 && noise.persistence <= 1.0) {
            return Err(ConfigError::InvalidPersistence(noise.persistence));
        }
        if !(noise.lacunarity.is_finite() && noise.lacunarity >= 1.0) {
            return Err(ConfigError::InvalidLacunarity(noise.lacunarity));
        }
        let finite_non_negative = |v: f32| v.is_finite() && v >= 0.0;
        if !(finite_non_negative(noise.warp_strength) && finite_non_negative(noise.warp_scale)) {
            return Err(ConfigError::InvalidWarp {
                strength: noise.warp_strength,
                scale: noise.warp_scale,
            });
        }
        Ok(())
    }

    fn validate_elevation(&self) -> Result<(), ConfigError> {
        let e = &self.elevation;
        if !(e.min_height >= 0.0 && e.max_height <= 1.0 && e.min_height < e.max_height) {
            return Err(ConfigError::InvalidClampBounds {
                min: e.min_height,
                max: e.max_height,
            });
        }
        let range = e.max_height - e.min_height;
        if !(e.min_variation >= 0.0 && e.min_variation < range) {
            return Err(ConfigError::VariationOutOfBounds {
                min_variation: e.min_variation,
                range,
            });
        }
        if !(e.slope_strength.is_finite() && e.slope_strength >= 0.0) {
            return Err(ConfigError::InvalidSlopeStrength(e.slope_strength));
        }
        if !(0.0..=1.0).contains(&e.warp_weight) {
            return Err(ConfigError::InvalidWarpWeight(e.warp_weight));
        }
        if e.region_block_size == 0 {
            return Err(ConfigError::ZeroRegionBlockSize);
        }
        Ok(())
    }

    fn validate_stream(&self) -> Result<(), ConfigError> {
        let s = &self.stream;
        if s.load_radius < 0 || s.unload_radius < 0 {
            return Err(ConfigError::NegativeRadius {
                load: s.load_radius,
                unload: s.unload_radius,
            });
        }
        if s.load_radius > s.unload_radius {
            return Err(ConfigError::LoadBeyondUnload {
                load: s.load_radius,
                unload: s.unload_radius,
            });
        }
        let increasing = s.lod_thresholds.windows(2).all(|w| w[0] < w[1]);
        if s.lod_thresholds.is_empty() || !increasing || s.lod_thresholds.len() > 16 {
            return Err(ConfigError::InvalidLodThresholds(s.lod_thresholds.clone()));
        }
        if s.lod_hysteresis == 0 {
            return Err(ConfigError::ZeroHysteresis);
        }
        if s.max_visible_tiles == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if s.max_loads_per_tick == 0 {
            return Err(ConfigError::ZeroLoadBudget);
        }
        if s.lod_interval_ticks == 0 {
            return Err(ConfigError::ZeroLodInterval);
        }
        let max_lod = s.max_lod();
        let skip = 1usize << max_lod;
        if (self.base_resolution - 1) % skip != 0 {
            return Err(ConfigError::ResolutionNotDecimable {
                resolution: self.base_resolution,
                max_lod,
                skip,
            });
        }
        Ok(())
    }
}
