//! Retry execution loop
//!
//! [`execute`] and [`execute_sync`] drive an operation through repeated
//! attempts under a [`RetryConfig`]: consult the circuit breaker, run the
//! attempt (optionally bounded by a per-attempt timeout), then either return
//! or ask the backoff policy whether and how long to wait.
//!
//! The breaker hears about failure only once per call: when the policy gives
//! up, or when a retry is refused admission. Individual retried failures are
//! invisible to it.

use crate::{
    admission::Admission,
    backoff::BackoffPolicy,
    callbacks::RetryCallbacks,
    circuit::CircuitBreaker,
    classifier::FailureContext,
    errors::{RetryError, TimeoutError},
};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a retry loop needs besides the operation itself
///
/// Cheap to clone; the policy, breaker and callbacks are shared.
///
/// # Example
///
/// ```rust
/// use retry_machines::{CircuitBreaker, ExponentialBackoff, RetryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let breaker = Arc::new(CircuitBreaker::builder("search").build());
///
/// let config = RetryConfig::new(ExponentialBackoff::new().max_attempts(4))
///     .with_circuit_breaker(breaker)
///     .with_timeout(Duration::from_secs(2))
///     .on_retry(|attempt, delay| println!("attempt {attempt} failed, waiting {delay:?}"));
///
/// assert_eq!(config.policy().max_attempts(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    policy: Arc<dyn BackoffPolicy>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    timeout: Option<Duration>,
    callbacks: RetryCallbacks,
}

impl RetryConfig {
    /// Create a configuration around a backoff policy
    pub fn new(policy: impl BackoffPolicy + 'static) -> Self {
        Self::with_shared_policy(Arc::new(policy))
    }

    /// Create a configuration around an already shared policy
    pub fn with_shared_policy(policy: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            policy,
            circuit_breaker: None,
            timeout: None,
            callbacks: RetryCallbacks::default(),
        }
    }

    /// Gate every attempt through a shared circuit breaker
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Bound each attempt (not the whole call) by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Called before each backoff sleep with the failed attempt count and delay
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_retry = Some(Arc::new(f));
        self
    }

    /// Called once when the policy gives up, with the final failure
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(&FailureContext<'_>) + Send + Sync + 'static,
    {
        self.callbacks.on_exhausted = Some(Arc::new(f));
        self
    }

    /// Called once when an attempt succeeds
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_success = Some(Arc::new(f));
        self
    }

    pub fn policy(&self) -> &dyn BackoffPolicy {
        self.policy.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Ask the breaker (if any) to admit the next attempt
    ///
    /// A rejection after `failed` attempts ends the call unsuccessfully, so
    /// the breaker hears about it like an exhausted call. Otherwise a
    /// half-open breaker whose probe failed and was retried would never
    /// leave HalfOpen.
    fn admit<E>(&self, failed: u32) -> Result<Option<Admission<'_>>, RetryError<E>> {
        let Some(breaker) = self.circuit_breaker.as_deref() else {
            return Ok(None);
        };

        match breaker.admit() {
            Some(admission) => Ok(Some(admission)),
            None => {
                let state = breaker.state();
                tracing::debug!(
                    circuit = %breaker.name(),
                    %state,
                    attempt = failed,
                    "call rejected by circuit breaker"
                );
                if failed > 0 {
                    breaker.on_failure();
                }
                Err(RetryError::CircuitOpen {
                    circuit: breaker.name().to_string(),
                    state,
                })
            }
        }
    }

    /// Turn the outcome of one attempt into the loop's next step
    fn settle<T, E: Any>(
        &self,
        outcome: Result<T, RetryError<E>>,
        attempt: &mut u32,
    ) -> Step<T, E> {
        let err = match outcome {
            Ok(value) => {
                if let Some(breaker) = &self.circuit_breaker {
                    breaker.on_success();
                }
                self.callbacks.trigger_success();
                return Step::Done(Ok(value));
            }
            Err(err) => err,
        };

        *attempt += 1;
        let Some(error) = err.failure() else {
            return Step::Done(Err(err));
        };
        let ctx = FailureContext {
            error,
            attempt: *attempt,
            timed_out: err.is_timeout(),
        };

        if !self.policy.should_retry(&ctx) {
            if let Some(breaker) = &self.circuit_breaker {
                breaker.on_failure();
            }
            tracing::warn!(
                attempt = *attempt,
                timed_out = ctx.timed_out,
                "retries exhausted"
            );
            self.callbacks.trigger_exhausted(&ctx);
            return Step::Done(Err(err));
        }

        let delay = self.policy.compute_delay(*attempt);
        tracing::debug!(
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            timed_out = ctx.timed_out,
            "attempt failed, retrying"
        );
        self.callbacks.trigger_retry(*attempt, delay);
        Step::Retry(delay)
    }
}

enum Step<T, E> {
    Done(Result<T, RetryError<E>>),
    Retry(Duration),
}

/// Run an async operation until it succeeds or the policy gives up
///
/// `operation` is called once per attempt and must produce a fresh future
/// each time. Dropping the returned future abandons the call; a half-open
/// probe slot held by the abandoned attempt goes back to the breaker.
///
/// # Example
///
/// ```rust
/// use retry_machines::{execute, FixedBackoff, RetryConfig};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let calls = AtomicU32::new(0);
/// let config = RetryConfig::new(FixedBackoff::with_delay(Duration::from_millis(1)));
///
/// let result = execute(
///     || async {
///         match calls.fetch_add(1, Ordering::SeqCst) {
///             0 => Err("warming up"),
///             n => Ok(n + 1),
///         }
///     },
///     &config,
/// )
/// .await;
///
/// assert_eq!(result.unwrap(), 2);
/// # }
/// ```
pub async fn execute<T, E, F, Fut>(
    mut operation: F,
    config: &RetryConfig,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Any,
{
    let mut attempt: u32 = 0;

    loop {
        let admission = config.admit::<E>(attempt)?;

        let outcome = match config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result.map_err(RetryError::Operation),
                Err(_) => Err(RetryError::Timeout(TimeoutError {
                    timeout,
                    attempt: attempt + 1,
                })),
            },
            None => operation().await.map_err(RetryError::Operation),
        };

        if let Some(admission) = admission {
            admission.settle();
        }

        match config.settle(outcome, &mut attempt) {
            Step::Done(result) => return result,
            Step::Retry(delay) => tokio::time::sleep(delay).await,
        }
    }
}

/// Run a blocking operation until it succeeds or the policy gives up
///
/// The operation runs on the calling thread and is never interrupted. With a
/// timeout configured, an attempt that took longer than the timeout counts as
/// a [`RetryError::Timeout`] failure once it returns, whatever its result.
/// Backoff waits block the thread.
pub fn execute_sync<T, E, F>(mut operation: F, config: &RetryConfig) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Any,
{
    let mut attempt: u32 = 0;

    loop {
        let admission = config.admit::<E>(attempt)?;

        let started = Instant::now();
        let result = operation();
        let outcome = match config.timeout {
            Some(timeout) if started.elapsed() > timeout => {
                Err(RetryError::Timeout(TimeoutError {
                    timeout,
                    attempt: attempt + 1,
                }))
            }
            _ => result.map_err(RetryError::Operation),
        };

        if let Some(admission) = admission {
            admission.settle();
        }

        match config.settle(outcome, &mut attempt) {
            Step::Done(result) => return result,
            Step::Retry(delay) => std::thread::sleep(delay),
        }
    }
}

/// An operation bundled with its retry configuration
///
/// Built by [`retryable`]; call it as many times as needed.
#[derive(Debug, Clone)]
pub struct Retryable<F> {
    operation: F,
    config: RetryConfig,
}

impl<F> Retryable<F> {
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run an async operation through [`execute`]
    pub async fn call<T, E, Fut>(&self) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Any,
    {
        execute(|| (self.operation)(), &self.config).await
    }

    /// Run a blocking operation through [`execute_sync`]
    pub fn call_sync<T, E>(&self) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Result<T, E>,
        E: Any,
    {
        execute_sync(|| (self.operation)(), &self.config)
    }
}

/// Wrap `operation` so every invocation retries under `config`
pub fn retryable<F>(operation: F, config: RetryConfig) -> Retryable<F> {
    Retryable { operation, config }
}
