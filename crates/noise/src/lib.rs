//! Noise field: deterministic scalar noise over the XZ plane.
//!
//! # Invariants
//! - Every function is a pure function of `(x, z, seed, config)`; there is no
//!   hidden RNG state, so results are identical across calls and processes.
//! - Invalid configurations (zero octaves, zero scale) are rejected by
//!   `TerrainConfig::validate` before a field is ever built.

mod field;

pub use field::{NoiseField, fade, hash, hash_unit};

pub fn crate_info() -> &'static str {
    "terrastream-noise v0.1.0"
}
