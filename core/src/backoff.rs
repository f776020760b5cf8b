//! Backoff policies
//!
//! A [`BackoffPolicy`] answers two questions after a failed attempt: should
//! there be another one, and how long to wait before it. Four policies ship
//! with the crate:
//!
//! | Policy | Delay for failed attempt `k` (before jitter) |
//! |---|---|
//! | [`ExponentialBackoff`] | `base × floor(multiplier × k)`, clamped to `[base, max]` |
//! | [`LinearBackoff`] | `base × k`, clamped to `[base, max]` |
//! | [`FixedBackoff`] | `base` |
//! | [`CustomBackoff`] | `delay_calculator(k)`, used verbatim |
//!
//! The exponential policy grows with `multiplier × k`, so with the default
//! multiplier of 2.0 the very first retry already waits `2 × base`.
//!
//! # Example
//!
//! ```rust
//! use retry_machines::{BackoffPolicy, ExponentialBackoff};
//! use std::time::Duration;
//!
//! let policy = ExponentialBackoff::new()
//!     .base_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(1))
//!     .use_jitter(false);
//!
//! assert_eq!(policy.compute_delay(1), Duration::from_millis(200));
//! assert_eq!(policy.compute_delay(3), Duration::from_millis(600));
//! assert_eq!(policy.compute_delay(50), Duration::from_secs(1));
//! ```

use crate::classifier::{FailureClassifier, FailureContext, PredicateClassifier};
use crate::jitter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay and retry-eligibility computation for the retry loop
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    /// Delay before the next attempt, given the 1-based count of failed attempts
    fn compute_delay(&self, attempt: u32) -> Duration;

    /// Upper bound on the total number of attempts
    fn max_attempts(&self) -> u32;

    /// Whether another attempt should follow this failure
    ///
    /// Defaults to `attempt < max_attempts`, so the total number of attempts
    /// never exceeds [`BackoffPolicy::max_attempts`].
    fn should_retry(&self, ctx: &FailureContext<'_>) -> bool {
        ctx.attempt < self.max_attempts()
    }
}

/// Parameters shared by every backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Maximum total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Smallest delay between attempts
    pub base_delay: Duration,
    /// Largest delay between attempts (never below `base_delay`)
    pub max_delay: Duration,
    /// Add up to 10% random jitter on top of each delay
    pub use_jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            use_jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Effective upper bound; a `max_delay` below `base_delay` is lifted to it
    fn ceiling(&self) -> Duration {
        self.max_delay.max(self.base_delay)
    }

    /// Clamp a raw delay into `[base_delay, max_delay]`
    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.base_delay, self.ceiling())
    }

    /// `base_delay × factor`, saturating at the ceiling
    fn scaled(&self, factor: f64) -> Duration {
        let ceiling = self.ceiling();
        let nanos = self.base_delay.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= ceiling.as_nanos() as f64 {
            return ceiling;
        }
        if nanos <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(nanos as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.use_jitter {
            jitter::apply(delay)
        } else {
            delay
        }
    }
}

macro_rules! backoff_setters {
    ($policy:ty) => {
        impl $policy {
            /// Set the maximum total number of attempts (values below 1 become 1)
            pub fn max_attempts(mut self, attempts: u32) -> Self {
                self.config.max_attempts = attempts.max(1);
                self
            }

            /// Set the base delay
            pub fn base_delay(mut self, delay: Duration) -> Self {
                self.config.base_delay = delay;
                self
            }

            /// Set the maximum delay
            pub fn max_delay(mut self, delay: Duration) -> Self {
                self.config.max_delay = delay;
                self
            }

            /// Enable or disable jitter
            pub fn use_jitter(mut self, enabled: bool) -> Self {
                self.config.use_jitter = enabled;
                self
            }

            /// Shared parameters of this policy
            pub fn config(&self) -> &BackoffConfig {
                &self.config
            }
        }
    };
}

/// Exponential-style growth: `base × floor(multiplier × attempt)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Defaults: 3 attempts, 1s base, 30s max, jitter on, multiplier 2.0
    pub fn new() -> Self {
        Self {
            config: BackoffConfig::default(),
            multiplier: 2.0,
        }
    }

    /// Set the growth multiplier
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before jitter is applied
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let factor = (self.multiplier * f64::from(attempt)).floor();
        self.config.clamp(self.config.scaled(factor))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

backoff_setters!(ExponentialBackoff);

impl BackoffPolicy for ExponentialBackoff {
    fn compute_delay(&self, attempt: u32) -> Duration {
        self.config.jittered(self.raw_delay(attempt))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Linear growth: `base × attempt`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearBackoff {
    config: BackoffConfig,
}

impl LinearBackoff {
    /// Defaults: 3 attempts, 1s base, 30s max, jitter on
    pub fn new() -> Self {
        Self {
            config: BackoffConfig::default(),
        }
    }

    /// Delay before jitter is applied
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        self.config.clamp(self.config.base_delay.saturating_mul(attempt))
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new()
    }
}

backoff_setters!(LinearBackoff);

impl BackoffPolicy for LinearBackoff {
    fn compute_delay(&self, attempt: u32) -> Duration {
        self.config.jittered(self.raw_delay(attempt))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Constant delay of `base` between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedBackoff {
    config: BackoffConfig,
}

impl FixedBackoff {
    /// Defaults: 3 attempts, 1s delay, jitter off
    pub fn new() -> Self {
        Self {
            config: BackoffConfig {
                use_jitter: false,
                ..BackoffConfig::default()
            },
        }
    }

    /// Shorthand for `FixedBackoff::new().base_delay(delay)`
    pub fn with_delay(delay: Duration) -> Self {
        Self::new().base_delay(delay)
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new()
    }
}

backoff_setters!(FixedBackoff);

impl BackoffPolicy for FixedBackoff {
    fn compute_delay(&self, _attempt: u32) -> Duration {
        self.config.jittered(self.config.base_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Type alias for a caller-supplied delay function
pub type DelayCalculator = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Policy driven by caller-supplied functions
///
/// The delay function's result is used verbatim: it is neither clamped to
/// `[base_delay, max_delay]` nor jittered unless jitter is switched on.
/// Without a retry checker the policy retries while `attempt < max_attempts`.
///
/// # Example
///
/// ```rust
/// use retry_machines::{BackoffPolicy, CustomBackoff, FailureContext};
/// use std::time::Duration;
///
/// let policy = CustomBackoff::new(|attempt| Duration::from_millis(50 * u64::from(attempt)))
///     .retry_when(|ctx| ctx.error_as::<&str>() != Some(&"fatal"));
///
/// assert_eq!(policy.compute_delay(3), Duration::from_millis(150));
///
/// let fatal = "fatal";
/// let ctx = FailureContext { error: &fatal, attempt: 1, timed_out: false };
/// assert!(!policy.should_retry(&ctx));
/// ```
#[derive(Clone)]
pub struct CustomBackoff {
    config: BackoffConfig,
    delay_calculator: DelayCalculator,
    retry_checker: Option<Arc<dyn FailureClassifier>>,
}

impl CustomBackoff {
    /// Create a policy around a delay function; defaults to 3 attempts, jitter off
    pub fn new<F>(delay_calculator: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            config: BackoffConfig {
                use_jitter: false,
                ..BackoffConfig::default()
            },
            delay_calculator: Arc::new(delay_calculator),
            retry_checker: None,
        }
    }

    /// Decide retries with a classifier instead of the attempt budget
    pub fn retry_checker(mut self, checker: Arc<dyn FailureClassifier>) -> Self {
        self.retry_checker = Some(checker);
        self
    }

    /// Decide retries with a closure instead of the attempt budget
    pub fn retry_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&FailureContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.retry_checker(Arc::new(PredicateClassifier::new(predicate)))
    }
}

backoff_setters!(CustomBackoff);

impl BackoffPolicy for CustomBackoff {
    fn compute_delay(&self, attempt: u32) -> Duration {
        self.config.jittered((self.delay_calculator)(attempt))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    fn should_retry(&self, ctx: &FailureContext<'_>) -> bool {
        match &self.retry_checker {
            Some(checker) => checker.should_retry(ctx),
            None => ctx.attempt < self.config.max_attempts,
        }
    }
}

impl fmt::Debug for CustomBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomBackoff")
            .field("config", &self.config)
            .field("delay_calculator", &"<closure>")
            .field("retry_checker", &self.retry_checker)
            .finish()
    }
}
