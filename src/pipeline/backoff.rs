//! Exponential backoff with jitter
//!
//! The delay doubles with each consecutive failure, starting from the base
//! delay and capped at a maximum. A symmetric jitter (±20% by default)
//! spreads reconnection attempts of many processes apart.
//!
//! Until the nominal delay reaches the cap, a jittered delay never falls
//! below the largest delay the previous failure count could have drawn, so
//! consecutive delays do not shrink. Once capped, successive delays vary
//! freely within the jitter band around the cap.

use crate::core::config::MAX_INTERVAL;
use crate::core::ShipperConfig;
use rand::Rng;
use std::time::Duration;

/// Default jitter factor: delays vary by ±20%
pub const DEFAULT_JITTER: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// `max` is raised to `base` and then limited to an hour
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base).min(MAX_INTERVAL),
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn from_config(config: &ShipperConfig) -> Self {
        Self::new(config.retry_delay, config.max_backoff)
    }

    /// Set the jitter factor, clamped to `0.0..=1.0`
    #[must_use]
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Upper bound of any delay this policy can produce
    pub fn ceiling(&self) -> Duration {
        self.max.mul_f64(1.0 + self.jitter)
    }

    /// Delay without jitter after `failures` consecutive failures.
    ///
    /// Zero failures means no wait.
    pub fn nominal(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay after `failures` consecutive failures, with random jitter
    pub fn delay(&self, failures: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_jitter(failures, sample)
    }

    /// Delay with an explicit jitter sample in `-1.0..=1.0` (for testing)
    pub fn delay_with_jitter(&self, failures: u32, sample: f64) -> Duration {
        let nominal = self.nominal(failures);
        let sample = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        nominal
            .mul_f64(1.0 + self.jitter * sample)
            .max(self.floor(failures))
    }

    /// Highest delay the previous failure count can produce, while that
    /// one is still below the cap
    fn floor(&self, failures: u32) -> Duration {
        if failures < 2 {
            return Duration::ZERO;
        }
        let previous = self.nominal(failures - 1);
        if previous < self.max {
            previous.mul_f64(1.0 + self.jitter)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(backoff.nominal(0), Duration::ZERO);
        assert_eq!(backoff.nominal(1), Duration::from_secs(1));
        assert_eq!(backoff.nominal(2), Duration::from_secs(2));
        assert_eq!(backoff.nominal(3), Duration::from_secs(4));
        assert_eq!(backoff.nominal(5), Duration::from_secs(16));
        assert_eq!(backoff.nominal(6), Duration::from_secs(30)); // capped
        assert_eq!(backoff.nominal(1000), Duration::from_secs(30));
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff <= Duration::from_micros(1),
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_close(backoff.delay_with_jitter(1, -1.0), Duration::from_millis(80));
        assert_close(backoff.delay_with_jitter(1, 1.0), Duration::from_millis(120));
        assert_close(backoff.delay_with_jitter(1, 0.0), Duration::from_millis(100));
        // out-of-range samples are clamped
        assert_close(backoff.delay_with_jitter(1, 7.0), Duration::from_millis(120));
    }

    #[test]
    fn test_random_delay_within_ceiling() {
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(200));
        for failures in 0..40 {
            let delay = backoff.delay(failures);
            let slack = Duration::from_micros(1);
            assert!(delay <= backoff.ceiling() + slack, "{:?} above ceiling", delay);
            assert!(delay + slack >= backoff.nominal(failures).mul_f64(0.8));
        }
    }

    #[test]
    fn test_no_jitter() {
        let backoff = Backoff::default().with_jitter(0.0);
        assert_close(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.ceiling(), Duration::from_secs(30));
    }

    #[test]
    fn test_step_onto_cap_does_not_shrink() {
        // 16s nominal before the cap, 20s cap: 16s * 1.2 > 20s * 0.8
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(20));
        let highest_before = backoff.delay_with_jitter(5, 1.0);
        assert_close(highest_before, Duration::from_millis(19_200));

        let lowest_capped = backoff.delay_with_jitter(6, -1.0);
        assert!(lowest_capped >= highest_before);
        assert_close(lowest_capped, Duration::from_millis(19_200));

        // Past the step the full jitter band is back
        assert_close(backoff.delay_with_jitter(7, -1.0), Duration::from_secs(16));
    }

    #[test]
    fn test_max_is_limited() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(u64::MAX));
        assert_eq!(backoff.max(), MAX_INTERVAL);
        assert_eq!(backoff.nominal(u32::MAX), MAX_INTERVAL);
        assert!(backoff.delay(u32::MAX) <= backoff.ceiling());
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(5));
        assert_eq!(backoff.nominal(4), Duration::from_secs(5));
    }
}
