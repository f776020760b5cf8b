//! RAII admission guard for calls let through a circuit breaker

use crate::circuit::CircuitBreaker;

/// Guard for one admitted call
///
/// A half-open breaker hands out a limited number of probe slots. When the
/// admitted call is abandoned before it produces an outcome (its future was
/// dropped, or it panicked) the slot goes back to the breaker on drop.
/// Call [`Admission::settle`] once the call finished; the slot then stays
/// consumed, as it does for [`CircuitBreaker::can_execute`].
///
/// Slots taken during an earlier half-open period are never handed back to
/// a later one.
#[derive(Debug)]
#[must_use = "dropping the admission immediately releases the probe slot"]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    settled: bool,
}

impl<'a> Admission<'a> {
    pub(crate) fn new(breaker: &'a CircuitBreaker, epoch: u64) -> Self {
        Self {
            breaker,
            epoch,
            settled: false,
        }
    }

    /// The breaker this admission was granted by
    pub fn breaker(&self) -> &'a CircuitBreaker {
        self.breaker
    }

    /// Mark the call as finished, keeping its slot consumed
    pub fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_trial(self.epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BreakerState, CircuitBreaker, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn half_open_breaker(probes: usize) -> CircuitBreaker {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::builder("admission")
            .failure_threshold(1)
            .reset_timeout(Duration::from_secs(1))
            .half_open_max_requests(probes)
            .clock(clock.clone())
            .build();
        breaker.on_failure();
        clock.advance(Duration::from_secs(1));
        breaker
    }

    #[test]
    fn test_closed_admission_is_unbounded() {
        let breaker = CircuitBreaker::builder("closed").build();

        let guards: Vec<_> = (0..10).filter_map(|_| breaker.admit()).collect();
        assert_eq!(guards.len(), 10);
        drop(guards);

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.trial_count(), 0);
    }

    #[test]
    fn test_open_breaker_admits_nothing() {
        let breaker = CircuitBreaker::builder("open").failure_threshold(1).build();
        breaker.on_failure();

        assert!(breaker.admit().is_none());
    }

    #[test]
    fn test_settled_admissions_keep_slots() {
        let breaker = half_open_breaker(2);

        breaker.admit().expect("first probe").settle();
        breaker.admit().expect("second probe").settle();

        assert_eq!(breaker.trial_count(), 2);
        assert!(breaker.admit().is_none());
    }

    #[test]
    fn test_unsettled_admission_releases_slot_on_panic() {
        let breaker = half_open_breaker(1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _admission = breaker.admit().expect("probe admitted");
            panic!("operation blew up");
        }));

        assert!(result.is_err());
        assert_eq!(breaker.trial_count(), 0);
        assert!(breaker.admit().is_some());
    }

    #[test]
    fn test_admission_exposes_breaker() {
        let breaker = half_open_breaker(1);
        let admission = breaker.admit().expect("probe admitted");

        assert_eq!(admission.breaker().name(), "admission");
        admission.settle();
    }
}
