//! Retry decisions and backoff computation.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use interop_core::FailureCategory;

use crate::config::{Backoff, RetryConfig};

/// Decides whether a failed attempt is retried and how long to wait
/// before the next one.
///
/// Delays are a pure function of the attempt index and the declared
/// jitter seed, so tests can assert exact schedules.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    jitter_seed: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, jitter_seed: u64) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff.clone(),
            jitter_seed,
        }
    }

    /// Same schedule with a different attempt budget, used for
    /// per-step and per-fallback overrides.
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: self.backoff.clone(),
            jitter_seed: self.jitter_seed,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the attempt that just failed (1-based `attempt`) should
    /// be followed by another attempt of the same action.
    pub fn should_retry(&self, attempt: u32, category: FailureCategory) -> bool {
        category.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt following 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max, jitter } => {
                let shift = attempt.saturating_sub(1).min(16);
                let scaled = base.saturating_mul(1u32 << shift);
                let capped = scaled.min(*max);
                if *jitter {
                    // Deterministic jitter in [50%, 100%] keyed by seed
                    // and attempt index.
                    let mut rng =
                        StdRng::seed_from_u64(self.jitter_seed.wrapping_add(attempt as u64));
                    let factor: f64 = rng.gen_range(0.5..=1.0);
                    capped.mul_f64(factor)
                } else {
                    capped
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, backoff: Backoff) -> RetryPolicy {
        RetryPolicy::new(
            &RetryConfig {
                max_attempts,
                backoff,
            },
            7,
        )
    }

    #[test]
    fn test_retry_bounded_by_max_attempts() {
        let p = policy(3, Backoff::Fixed(Duration::from_millis(100)));
        assert!(p.should_retry(1, FailureCategory::Timeout));
        assert!(p.should_retry(2, FailureCategory::Timeout));
        assert!(!p.should_retry(3, FailureCategory::Timeout));
    }

    #[test]
    fn test_non_retryable_categories_never_retry() {
        let p = policy(5, Backoff::Fixed(Duration::from_millis(100)));
        assert!(!p.should_retry(1, FailureCategory::SessionCrashed));
        assert!(!p.should_retry(1, FailureCategory::CircuitOpen));
        assert!(!p.should_retry(1, FailureCategory::Cancelled));
        assert!(!p.should_retry(1, FailureCategory::InvalidPlan));
    }

    #[test]
    fn test_fixed_backoff() {
        let p = policy(3, Backoff::Fixed(Duration::from_millis(250)));
        assert_eq!(p.delay_for(1), Duration::from_millis(250));
        assert_eq!(p.delay_for(2), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let p = policy(
            5,
            Backoff::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_millis(350),
                jitter: false,
            },
        );
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_is_deterministic_for_a_seed() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            jitter: true,
        };
        let a = policy(3, backoff.clone());
        let b = policy(3, backoff);

        assert_eq!(a.delay_for(2), b.delay_for(2));
        // Jittered delay stays within the declared window.
        let full = Duration::from_millis(200);
        assert!(a.delay_for(2) <= full);
        assert!(a.delay_for(2) >= full.mul_f64(0.5));
    }

    #[test]
    fn test_override_keeps_schedule() {
        let p = policy(3, Backoff::Fixed(Duration::from_millis(100)));
        let narrowed = p.with_max_attempts(1);
        assert_eq!(narrowed.max_attempts(), 1);
        assert!(!narrowed.should_retry(1, FailureCategory::Timeout));
        assert_eq!(narrowed.delay_for(1), p.delay_for(1));
    }
}
