use terrastream_common::NoiseConfig;

const PRIME_X: u64 = 0x9e37_79b9_7f4a_7c15;
const PRIME_Z: u64 = 0xc2b2_ae3d_27d4_eb4f;
const OCTAVE_STEP: u64 = 0x632b_e59b_d9b4_e019;
const WARP_X_SALT: u64 = 0x5bd1_e995_1f12_3bb5;
const WARP_Z_SALT: u64 = 0x2545_f491_4f6c_dd1d;

/// Splitmix64 finalizer. Full avalanche: flipping one input bit flips about
/// half of the output bits.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Hash an integer lattice point together with a seed.
pub fn hash(x: i32, z: i32, seed: u64) -> u64 {
    let h = mix64(seed ^ (x as i64 as u64).wrapping_mul(PRIME_X));
    mix64(h ^ (z as i64 as u64).wrapping_mul(PRIME_Z))
}

/// `hash` mapped to `[0, 1)` using the top 24 bits.
pub fn hash_unit(x: i32, z: i32, seed: u64) -> f32 {
    (hash(x, z, seed) >> 40) as f32 / (1u64 << 24) as f32
}

/// Quintic smoothing curve `6t^5 - 15t^4 + 10t^3`.
///
/// First and second derivatives vanish at 0 and 1, so interpolated noise has
/// no visible creases along lattice lines.
pub fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lattice(x: i32, z: i32, seed: u64) -> f32 {
    hash_unit(x, z, seed) * 2.0 - 1.0
}

/// Value noise in `[-1, 1]` for an explicit seed.
fn value_noise(x: f32, z: f32, seed: u64) -> f32 {
    let x0 = x.floor();
    let z0 = z.floor();
    let tx = fade(x - x0);
    let tz = fade(z - z0);
    let (ix, iz) = (x0 as i32, z0 as i32);

    let v00 = lattice(ix, iz, seed);
    let v10 = lattice(ix.wrapping_add(1), iz, seed);
    let v01 = lattice(ix, iz.wrapping_add(1), seed);
    let v11 = lattice(ix.wrapping_add(1), iz.wrapping_add(1), seed);

    lerp(lerp(v00, v10, tx), lerp(v01, v11, tx), tz)
}

/// Deterministic noise field built once from a seed and octave parameters.
///
/// Coordinates are in noise-lattice units: callers scale world positions by
/// `NoiseConfig::scale` (or a multiple of it) before sampling.
#[derive(Debug, Clone)]
pub struct NoiseField {
    config: NoiseConfig,
}

impl NoiseField {
    pub fn new(config: NoiseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Single-octave value noise in `[-1, 1]`.
    pub fn base_noise(&self, x: f32, z: f32) -> f32 {
        value_noise(x, z, self.config.seed)
    }

    /// Fractal Brownian motion remapped to `[0, 1]`.
    pub fn fractal_noise(&self, x: f32, z: f32) -> f32 {
        let signed = self.octave_sum(x, z, self.config.seed, |n| n);
        ((signed + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Ridged multi-octave noise in `[0, 1]`; each octave contributes
    /// `(1 - |n|)^2`, which peaks sharply where the base noise crosses zero.
    pub fn ridged_noise(&self, x: f32, z: f32) -> f32 {
        self.octave_sum(x, z, self.config.seed, |n| {
            let r = 1.0 - n.abs();
            r * r
        })
        .clamp(0.0, 1.0)
    }

    /// Fractal noise sampled at a position displaced by two independent
    /// low-frequency fields.
    pub fn warped_noise(&self, x: f32, z: f32) -> f32 {
        let ws = self.config.warp_scale;
        let seed = self.config.seed;
        let qx = self.octave_sum(x * ws + 17.3, z * ws - 4.1, seed ^ WARP_X_SALT, |n| n);
        let qz = self.octave_sum(x * ws - 9.7, z * ws + 31.9, seed ^ WARP_Z_SALT, |n| n);
        let strength = self.config.warp_strength;
        self.fractal_noise(x + strength * qx, z + strength * qz)
    }

    /// Amplitude-normalized octave sum with a per-octave transform.
    fn octave_sum(&self, x: f32, z: f32, seed: u64, shape: impl Fn(f32) -> f32) -> f32 {
        let mut total = 0.0f32;
        let mut amplitude = 1.0f32;
        let mut frequency = 1.0f32;
        let mut amplitude_sum = 0.0f32;

        for octave in 0..self.config.octaves {
            let octave_seed = seed.wrapping_add(u64::from(octave).wrapping_mul(OCTAVE_STEP));
            let n = value_noise(x * frequency, z * frequency, octave_seed);
            total += amplitude * shape(n);
            amplitude_sum += amplitude;
            amplitude *= self.config.persistence;
            frequency *= self.config.lacunarity;
        }

        if amplitude_sum > 0.0 {
            total / amplitude_sum
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u64) -> NoiseField {
        NoiseField::new(NoiseConfig {
            seed,
            ..NoiseConfig::default()
        })
    }

    fn sample_points() -> impl Iterator<Item = (f32, f32)> {
        (0..400).map(|i| {
            let t = i as f32;
            (t * 0.173 - 31.0, t * -0.291 + 12.5)
        })
    }

    #[test]
    fn fractal_noise_is_deterministic() {
        let a = field(42);
        let b = field(42);
        for (x, z) in sample_points() {
            assert_eq!(a.fractal_noise(x, z), b.fractal_noise(x, z));
            assert_eq!(a.fractal_noise(x, z), a.fractal_noise(x, z));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = field(1);
        let b = field(2);
        let differing = sample_points()
            .filter(|&(x, z)| a.fractal_noise(x, z) != b.fractal_noise(x, z))
            .count();
        assert!(differing > 350);
    }

    #[test]
    fn outputs_stay_in_documented_ranges() {
        let f = field(7);
        for (x, z) in sample_points() {
            let base = f.base_noise(x, z);
            assert!((-1.0..=1.0).contains(&base), "base {base}");
            for v in [f.fractal_noise(x, z), f.ridged_noise(x, z), f.warped_noise(x, z)] {
                assert!((0.0..=1.0).contains(&v), "value {v} at ({x}, {z})");
            }
        }
    }

    #[test]
    fn base_noise_hits_lattice_values_at_integers() {
        let f = field(9);
        for (ix, iz) in [(0, 0), (3, -7), (-12, 40)] {
            let expected = hash_unit(ix, iz, 9) * 2.0 - 1.0;
            assert_eq!(f.base_noise(ix as f32, iz as f32), expected);
        }
    }

    #[test]
    fn fade_has_fixed_endpoints_and_midpoint() {
        assert_eq!(fade(0.0), 0.0);
        assert_eq!(fade(1.0), 1.0);
        assert!((fade(0.5) - 0.5).abs() < 1e-6);
        // Flat near the ends.
        assert!(fade(0.01) < 1e-4);
        assert!(1.0 - fade(0.99) < 1e-4);
    }

    #[test]
    fn hash_decorrelates_adjacent_lattice_points() {
        let mut flipped = 0u32;
        let mut pairs = 0u32;
        for x in -20..20 {
            for z in -20..20 {
                flipped += (hash(x, z, 1) ^ hash(x + 1, z, 1)).count_ones();
                flipped += (hash(x, z, 1) ^ hash(x, z + 1, 1)).count_ones();
                pairs += 2;
            }
        }
        let mean = flipped as f32 / pairs as f32;
        assert!((28.0..36.0).contains(&mean), "mean flipped bits {mean}");
    }

    #[test]
    fn hash_is_not_symmetric_in_axes() {
        assert_ne!(hash(3, 5, 0), hash(5, 3, 0));
    }

    #[test]
    fn fractal_noise_is_continuous() {
        let f = field(42);
        let eps = 1e-3;
        for (x, z) in sample_points() {
            let d = (f.fractal_noise(x, z) - f.fractal_noise(x + eps, z + eps)).abs();
            assert!(d < 0.05, "jump {d} at ({x}, {z})");
        }
    }

    #[test]
    fn ridged_noise_differs_from_fractal() {
        let f = field(3);
        let same = sample_points()
            .filter(|&(x, z)| f.ridged_noise(x, z) == f.fractal_noise(x, z))
            .count();
        assert!(same < 10);
    }

    #[test]
    fn zero_warp_strength_reduces_to_fractal() {
        let f = NoiseField::new(NoiseConfig {
            warp_strength: 0.0,
            ..NoiseConfig::default()
        });
        for (x, z) in sample_points().take(50) {
            assert_eq!(f.warped_noise(x, z), f.fractal_noise(x, z));
        }
    }
}
