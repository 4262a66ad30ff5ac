//! Retry policy for HTTP requests and SSE reconnects.

use std::time::Duration;

/// Exponential backoff with a retry cap and deterministic jitter.
///
/// Retryable failures are HTTP 5xx and transport-level network errors;
/// 4xx responses are never retried (401 has its own challenge path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay for the first retry
    pub base: Duration,
    /// Ceiling on the computed delay
    pub max_delay: Duration,
    /// Maximum retry attempts
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Policy with `max_attempts` retries starting at one second.
    pub const fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero-based), or `None` when the
    /// attempts are exhausted.
    ///
    /// Jitter is ±25%, derived from the attempt counter so no RNG
    /// dependency is needed.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let base_delay = self.base.as_millis() as u64 * 2u64.pow(attempt);
        let capped = base_delay.min(self.max_delay.as_millis() as u64);

        let jitter_range = capped / 4;
        let jitter_offset = if jitter_range > 0 {
            let hash = (attempt as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            hash % (jitter_range * 2)
        } else {
            0
        };

        let delay = capped
            .saturating_sub(jitter_range)
            .saturating_add(jitter_offset);
        Some(Duration::from_millis(delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_attempts(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_exhaust() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(policy.delay(0).is_some());
        assert!(policy.delay(2).is_some());
        assert!(policy.delay(3).is_none());
    }

    #[test]
    fn test_delays_grow_within_jitter_bounds() {
        let policy = RetryPolicy {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        };

        let d0 = policy.delay(0).unwrap();
        assert!(d0 >= Duration::from_millis(750) && d0 <= Duration::from_millis(1250));

        let d2 = policy.delay(2).unwrap();
        assert!(d2 >= Duration::from_millis(3000) && d2 <= Duration::from_millis(5000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 32,
        };
        let d10 = policy.delay(10).unwrap();
        assert!(d10 <= Duration::from_millis(37_500));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert!(policy.delay(0).is_none());
    }
}
