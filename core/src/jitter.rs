//! Jitter for retry delays and reset timeouts
//!
//! Retry delays get an additive offset in `[0, 10%)` of the computed delay so
//! that independent callers drift apart instead of retrying in lockstep.
//! Randomness comes from the thread-local, OS-seeded generator; it is never
//! derived from the clock or the attempt number.

use rand::Rng;
use std::time::Duration;

/// Upper bound of the additive retry jitter, as a fraction of the delay
pub const RETRY_JITTER_RATIO: f64 = 0.1;

/// Add up to 10% of `delay` on top of it
pub fn apply(delay: Duration) -> Duration {
    let jitter_range = delay.as_secs_f64() * RETRY_JITTER_RATIO;
    if jitter_range <= 0.0 {
        return delay;
    }

    let offset = rand::thread_rng().gen_range(0.0..jitter_range);
    delay.saturating_add(Duration::from_secs_f64(offset))
}

/// Shorten a reset timeout by up to `jitter_factor` of its length
///
/// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
pub fn reset_timeout_secs(timeout_secs: f64, jitter_factor: f64) -> f64 {
    if jitter_factor <= 0.0 {
        return timeout_secs;
    }

    let timeout_ms = (timeout_secs * 1000.0) as u64;
    let policy = chrono_machines::Policy {
        max_attempts: 1,
        base_delay_ms: timeout_ms,
        multiplier: 1.0,
        max_delay_ms: timeout_ms,
    };
    (policy.calculate_delay(1, jitter_factor.min(1.0)) as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let delay = Duration::from_secs(2);

        for _ in 0..200 {
            let jittered = apply(delay);
            assert!(jittered >= delay, "{:?} below base", jittered);
            assert!(
                jittered < Duration::from_millis(2200),
                "{:?} exceeds 10% bound",
                jittered
            );
        }
    }

    #[test]
    fn test_jitter_produces_variance() {
        let mut values = std::collections::HashSet::new();

        for _ in 0..20 {
            values.insert(apply(Duration::from_secs(1)));
        }

        assert!(
            values.len() >= 2,
            "Jitter should produce variance, got {} unique values",
            values.len()
        );
    }

    #[test]
    fn test_zero_delay_has_no_jitter() {
        assert_eq!(apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_zero_jitter_factor_keeps_reset_timeout() {
        for _ in 0..10 {
            assert_eq!(reset_timeout_secs(60.0, 0.0), 60.0);
        }
    }

    #[test]
    fn test_reset_timeout_jitter_within_bounds() {
        // With 25% jitter on 1000ms base, expect 750-1000ms range
        for _ in 0..50 {
            let timeout = reset_timeout_secs(1.0, 0.25);
            assert!(timeout >= 0.75 - 0.01, "{} below lower bound", timeout);
            assert!(timeout <= 1.0 + 0.01, "{} above upper bound", timeout);
        }
    }
}
