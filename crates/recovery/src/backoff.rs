//! Retry delay math
//!
//! `delay(attempt) = min(base × factor^(attempt-1), max) × (1 + j)` with `j` drawn uniformly from
//! `[-jitter_fraction, +jitter_fraction]`, then clamped to `[0, max]`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction;
        self
    }

    /// Whether another attempt may follow `attempt` (1-based)
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the retry that follows `attempt`, without jitter
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1).saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_ms = self.max_delay.as_secs_f64() * 1_000.0;
        let raw_ms = self.base_delay.as_secs_f64() * 1_000.0 * self.backoff_factor.max(1.0).powi(exponent);
        let capped = if raw_ms.is_finite() { raw_ms.min(max_ms) } else { max_ms };
        Duration::from_secs_f64(capped.max(0.0) / 1_000.0)
    }

    /// Jittered delay using a random sample
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.jittered_delay(attempt, sample)
    }

    /// Jittered delay for a sample in `[-1, 1]`
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let jitter = self.jitter_fraction.clamp(0.0, 1.0) * sample.clamp(-1.0, 1.0);
        let jittered = (nominal * (1.0 + jitter)).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }

    /// Nominal delays between every pair of attempts
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.nominal_delay(attempt))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_nominal_delay_is_monotone_and_capped() {
        let policy = RetryPolicy::default();
        let delays = (1..=10).map(|a| policy.nominal_delay(a)).collect::<Vec<_>>();
        assert_eq!(delays[0], ms(1_000));
        assert_eq!(delays[1], ms(2_000));
        assert_eq!(delays[4], ms(16_000));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays[9], ms(30_000));
    }

    #[test]
    fn test_jittered_delay_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=8 {
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay <= policy.max_delay.mul_f64(1.0 + policy.jitter_fraction));
                assert!(delay <= policy.max_delay);
            }
        }
        assert_eq!(policy.jittered_delay(1, 1.0), ms(1_100));
        assert_eq!(policy.jittered_delay(1, -1.0), ms(900));
        assert_eq!(policy.jittered_delay(9, 1.0), ms(30_000));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::default().with_factor(10.0);
        assert_eq!(policy.nominal_delay(u32::MAX), ms(30_000));
    }

    #[test]
    fn test_schedule_covers_retries_only() {
        let policy = RetryPolicy::new(4, ms(100), ms(250));
        assert_eq!(policy.schedule(), vec![ms(100), ms(200), ms(250)]);
        assert!(policy.allows_retry_after(3));
        assert!(!policy.allows_retry_after(4));
    }
}
