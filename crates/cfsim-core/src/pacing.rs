//! Randomness and timing sources.
//!
//! Every random choice a simulator makes (delays, templates, file sampling)
//! draws from a [`SimRng`] owned by that simulator, so a fixed seed plus zero
//! delays gives a fully deterministic run.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Longest wait any pacing value may ask for: one day.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// RNG used by all simulators.
pub type SimRng = ChaCha8Rng;

/// Build an RNG from an optional seed, falling back to OS entropy.
pub fn seeded_rng(seed: Option<u64>) -> SimRng {
    match seed {
        Some(seed) => SimRng::seed_from_u64(seed),
        None => SimRng::from_entropy(),
    }
}

/// Uniform delay range in seconds, inclusive of `min`, exclusive of `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    /// A range that never waits.
    pub const ZERO: Self = Self { min: 0.0, max: 0.0 };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Draw one delay. Bounds are clamped to `0..=MAX_DELAY_SECS` first;
    /// degenerate ranges collapse to `min`.
    pub fn sample(&self, rng: &mut SimRng) -> Duration {
        let (min, max) = (bounded(self.min), bounded(self.max));
        let secs = if max > min { rng.gen_range(min..max) } else { min };
        Duration::from_secs_f64(secs)
    }
}

/// NaN reads as zero.
fn bounded(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_DELAY_SECS)
    }
}

/// Convert a configured number of seconds into a [`Duration`], clamped to
/// `0..=MAX_DELAY_SECS`.
pub(crate) fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(bounded(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_sample_within_range() {
        let mut rng = seeded_rng(Some(7));
        let range = DelayRange::new(0.5, 2.5);
        for _ in 0..200 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_should_return_zero_for_zero_range() {
        let mut rng = seeded_rng(Some(1));
        assert_eq!(DelayRange::ZERO.sample(&mut rng), Duration::ZERO);
        assert_eq!(DelayRange::new(-3.0, -1.0).sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_should_clamp_out_of_range_delays() {
        let mut rng = seeded_rng(Some(5));
        let cap = Duration::from_secs_f64(MAX_DELAY_SECS);

        assert_eq!(DelayRange::new(1e20, 1e20).sample(&mut rng), cap);
        assert!(DelayRange::new(0.0, f64::INFINITY).sample(&mut rng) <= cap);
        assert!(DelayRange::new(-f64::MAX, f64::MAX).sample(&mut rng) <= cap);
        assert_eq!(DelayRange::new(f64::NAN, f64::NAN).sample(&mut rng), Duration::ZERO);

        assert_eq!(secs(1e20), cap);
        assert_eq!(secs(f64::INFINITY), cap);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(-4.0), Duration::ZERO);
    }

    #[test]
    fn test_should_repeat_sequence_for_same_seed() {
        let range = DelayRange::new(1.0, 3.0);
        let mut a = seeded_rng(Some(42));
        let mut b = seeded_rng(Some(42));
        let xs: Vec<_> = (0..5).map(|_| range.sample(&mut a)).collect();
        let ys: Vec<_> = (0..5).map(|_| range.sample(&mut b)).collect();
        assert_eq!(xs, ys);
    }
}
