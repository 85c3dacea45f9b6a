use terrastream_common::{LodLevel, StreamConfig};

/// Distance-to-LOD step function with hysteresis for re-levelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LodPolicy {
    thresholds: Vec<u32>,
    hysteresis: LodLevel,
}

impl LodPolicy {
    /// `thresholds[i]` is the largest distance still drawn at LOD `i`.
    pub fn new(thresholds: Vec<u32>, hysteresis: LodLevel) -> Self {
        Self {
            thresholds,
            hysteresis,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.lod_thresholds.clone(), config.lod_hysteresis)
    }

    pub fn max_lod(&self) -> LodLevel {
        self.thresholds.len() as LodLevel
    }

    /// Number of thresholds the distance exceeds. Non-decreasing in distance.
    pub fn calculate_lod(&self, distance: u32) -> LodLevel {
        self.thresholds.iter().filter(|&&t| distance > t).count() as LodLevel
    }

    /// Whether a tile at `current` should be rebuilt at `target`.
    pub fn needs_relevel(&self, current: LodLevel, target: LodLevel) -> bool {
        current.abs_diff(target) >= self.hysteresis
    }
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_steps() {
        let policy = LodPolicy::default();
        assert_eq!(policy.calculate_lod(0), 0);
        assert_eq!(policy.calculate_lod(1), 0);
        assert_eq!(policy.calculate_lod(2), 1);
        assert_eq!(policy.calculate_lod(3), 2);
        assert_eq!(policy.calculate_lod(4), 3);
        assert_eq!(policy.calculate_lod(1000), 3);
        assert_eq!(policy.max_lod(), 3);
    }

    #[test]
    fn lod_is_monotonic_in_distance() {
        let policy = LodPolicy::new(vec![2, 5, 6, 20], 1);
        let lods: Vec<LodLevel> = (0..64).map(|d| policy.calculate_lod(d)).collect();
        assert!(lods.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*lods.last().unwrap(), 4);
    }

    #[test]
    fn hysteresis_suppresses_single_steps() {
        let policy = LodPolicy::default();
        assert!(!policy.needs_relevel(0, 0));
        assert!(!policy.needs_relevel(0, 1));
        assert!(!policy.needs_relevel(2, 1));
        assert!(policy.needs_relevel(0, 2));
        assert!(policy.needs_relevel(3, 1));
    }
}
