//! Time sources for circuit breaker timing
//!
//! This module provides different clock implementations:
//! - `MonotonicClock`: Wall-clock independent time anchored at creation
//! - `ManualClock`: Externally advanced time for deterministic tests

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Abstract time source used to measure how long a circuit has been open
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Get monotonic time in seconds (relative to an arbitrary fixed anchor)
    fn monotonic_time(&self) -> f64;
}

/// Monotonic clock backed by [`Instant`]
///
/// Immune to NTP adjustments and wall-clock jumps.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    /// Monotonic time anchor
    start_time: Instant,
}

impl MonotonicClock {
    /// Create a new clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to
///
/// Useful for exercising reset timeouts without sleeping.
///
/// # Example
///
/// ```rust
/// use retry_machines::{CircuitBreaker, ManualClock};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualClock::new());
/// let breaker = CircuitBreaker::builder("db")
///     .failure_threshold(1)
///     .reset_timeout(Duration::from_secs(10))
///     .clock(clock.clone())
///     .build();
///
/// breaker.on_failure();
/// assert!(!breaker.can_execute());
///
/// clock.advance(Duration::from_secs(10));
/// assert!(breaker.can_execute());
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: RwLock<f64>,
}

impl ManualClock {
    /// Create a clock reading zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by.as_secs_f64();
    }

    /// Set the absolute reading in seconds
    pub fn set(&self, seconds: f64) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = seconds;
    }
}

impl Clock for ManualClock {
    fn monotonic_time(&self) -> f64 {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
