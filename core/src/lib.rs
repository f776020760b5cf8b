//! RetryMachines - Resilient execution with backoff and circuit breaking
//!
//! This crate wraps fallible operations in a retry loop with:
//! - Exponential, linear, fixed and custom backoff policies with optional jitter
//! - Per-attempt timeouts (async via tokio, post-hoc for blocking calls)
//! - A shared circuit breaker state machine (Closed → Open → HalfOpen)
//! - Monotonic, injectable time for the breaker's reset timeout
//! - Callbacks for retries, exhaustion, success and breaker transitions
//!
//! # Example
//!
//! ```rust
//! use retry_machines::{execute, CircuitBreaker, ExponentialBackoff, RetryConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = Arc::new(
//!     CircuitBreaker::builder("payment_api")
//!         .failure_threshold(3)
//!         .reset_timeout(Duration::from_secs(30))
//!         .on_open(|name| println!("Circuit {} opened!", name))
//!         .build(),
//! );
//!
//! let config = RetryConfig::new(
//!     ExponentialBackoff::new()
//!         .base_delay(Duration::from_millis(10))
//!         .max_attempts(3),
//! )
//! .with_circuit_breaker(breaker.clone())
//! .with_timeout(Duration::from_secs(5));
//!
//! let result = execute(|| async { Ok::<_, String>("charged") }, &config).await;
//! assert_eq!(result.unwrap(), "charged");
//! assert!(breaker.is_closed());
//! # }
//! ```

pub mod admission;
pub mod backoff;
pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod errors;
pub mod executor;
pub mod jitter;

pub use admission::Admission;
pub use backoff::{
    BackoffConfig, BackoffPolicy, CustomBackoff, ExponentialBackoff, FixedBackoff, LinearBackoff,
};
pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, RetryCallbacks};
pub use circuit::{BreakerState, CircuitBreaker, Config};
pub use classifier::{
    FailureClassifier, FailureContext, MaxAttemptsClassifier, PredicateClassifier,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{RetryError, TimeoutError};
pub use executor::{RetryConfig, Retryable, execute, execute_sync, retryable};
