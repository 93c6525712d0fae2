use serde::{Deserialize, Serialize};

/// Tiny deterministic RNG used by the simulator.
///
/// Reproducible across platforms; a seed fully determines a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Create a new deterministic RNG from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Next pseudo-random `u64`.
    #[must_use]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Next value in `[0, upper_exclusive)`.
    #[must_use]
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Uniform index into a collection of `len` elements; 0 when empty.
    #[must_use]
    pub fn next_index(&mut self, len: usize) -> usize {
        let bound = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.next_bounded(bound)).unwrap_or(0)
    }

    /// Bernoulli trial with integer percent.
    #[must_use]
    pub fn hit_rate_percent(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.next_bounded(100) < u64::from(percent)
    }

    /// Simulated latency in `[min, max]` milliseconds.
    #[must_use]
    pub fn latency_millis(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = u64::try_from(max - min).unwrap_or(0);
        min + i64::try_from(self.next_bounded(span + 1)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::DeterministicRng;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = DeterministicRng::new(42);
        let mut b = DeterministicRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn bounded_stays_in_range() {
        let mut rng = DeterministicRng::new(7);
        for _ in 0..1000 {
            assert!(rng.next_bounded(13) < 13);
        }
        assert_eq!(rng.next_bounded(0), 0);
    }

    #[test]
    fn hit_rate_extremes() {
        let mut rng = DeterministicRng::new(1);
        assert!(!rng.hit_rate_percent(0));
        assert!(rng.hit_rate_percent(100));
    }

    #[test]
    fn latency_within_bounds() {
        let mut rng = DeterministicRng::new(9);
        for _ in 0..200 {
            let latency = rng.latency_millis(50, 400);
            assert!((50..=400).contains(&latency));
        }
        assert_eq!(rng.latency_millis(100, 100), 100);
    }
}
