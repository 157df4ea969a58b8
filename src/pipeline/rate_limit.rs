// src/pipeline/rate_limit.rs

//! Randomized inter-request delays.
//!
//! The delay is jittered rather than fixed so multiple runs or retries that
//! start close together do not fall into synchronized bursts against the
//! same source.

use std::time::Duration;

use rand::Rng;

use crate::models::RateLimitPolicy;

/// Enforces the per-source delay window between outbound requests.
pub struct RateLimiter;

impl RateLimiter {
    /// Draw a delay uniformly from the policy window.
    pub fn jittered_delay(policy: &RateLimitPolicy) -> Duration {
        let min = policy.min_delay_ms;
        let max = policy.max_delay_ms.max(min);
        let ms = if min == max {
            min
        } else {
            rand::rng().random_range(min..=max)
        };
        Duration::from_millis(ms)
    }

    /// Sleep for a jittered delay.
    ///
    /// Called immediately before each network-issuing call, never after, so
    /// a cancelled or completed run pays no trailing delay.
    pub async fn wait(policy: &RateLimitPolicy) {
        let delay = Self::jittered_delay(policy);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let policy = RateLimitPolicy {
            min_delay_ms: 50,
            max_delay_ms: 150,
        };
        for _ in 0..200 {
            let delay = RateLimiter::jittered_delay(&policy);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_equal_bounds_are_fixed() {
        let policy = RateLimitPolicy {
            min_delay_ms: 75,
            max_delay_ms: 75,
        };
        assert_eq!(
            RateLimiter::jittered_delay(&policy),
            Duration::from_millis(75)
        );
    }

    #[test]
    fn test_zero_window() {
        let policy = RateLimitPolicy {
            min_delay_ms: 0,
            max_delay_ms: 0,
        };
        assert!(RateLimiter::jittered_delay(&policy).is_zero());
    }
}
