//! Shared types for the terrastream workspace: tile coordinates and the
//! static terrain configuration every other crate is built from.
//!
//! # Invariants
//! - A `TerrainConfig` that passed `validate` never produces a per-tile
//!   configuration failure later on.

pub mod config;
pub mod types;

pub use config::{ConfigError, ElevationConfig, NoiseConfig, StreamConfig, TerrainConfig};
pub use types::{LodLevel, TileCoord};

pub fn crate_info() -> &'static str {
    "terrastream-common v0.1.0"
}
