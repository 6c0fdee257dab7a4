// src/ingest/retry.rs
//! Capped exponential backoff with additive jitter.
//!
//! `delay(n) = min(cap, base * 2^n + jitter * u)` with `u` uniform in [0,1).
//! The policy is a plain value; the pipeline owns the sleeping.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay_ms: 1_000,
            max_delay_ms: 120_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// No sleeping at all; meant for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (0-based: the wait after the first
    /// failure is `delay_for(0, ..)`). `jitter_sample` is clamped to [0,1].
    pub fn delay_for(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let u = if jitter_sample.is_nan() {
            0.0
        } else {
            jitter_sample.clamp(0.0, 1.0)
        };
        let jitter = (self.jitter_ms as f64 * u) as u64;
        Duration::from_millis(exp.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// [`delay_for`](Self::delay_for) with a fresh random jitter sample.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let u: f64 = rand::rng().random();
        self.delay_for(attempt, u)
    }

    /// Whether another attempt is allowed after `attempts_made` tries.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_then_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0, 0.0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1, 0.0), Duration::from_secs(2));
        assert_eq!(p.delay_for(3, 0.0), Duration::from_secs(8));
        assert_eq!(p.delay_for(6, 0.0), Duration::from_secs(64));
        assert_eq!(p.delay_for(7, 0.0), Duration::from_secs(120));
        assert_eq!(p.delay_for(60, 0.5), Duration::from_secs(120));
    }

    #[test]
    fn jitter_is_bounded() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(2, 0.5), Duration::from_millis(4_500));
        assert_eq!(p.delay_for(2, 7.0), Duration::from_millis(5_000));
        for _ in 0..50 {
            let d = p.next_delay(2);
            assert!(d >= Duration::from_secs(4) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn attempt_budget() {
        let p = RetryPolicy::immediate(3);
        assert!(p.allows_retry(1));
        assert!(p.allows_retry(2));
        assert!(!p.allows_retry(3));
        assert_eq!(p.delay_for(5, 1.0), Duration::ZERO);
        // zero is treated as a single attempt
        assert!(!RetryPolicy::immediate(0).allows_retry(1));
    }
}
