//! Failure classification for retry decisions
//!
//! This module provides traits and types for deciding whether a failed
//! attempt should be retried or end the call.

use std::any::Any;

/// Context provided to retry classifiers for error evaluation
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// The error that occurred (can be downcast to specific types)
    ///
    /// Either the operation's own error or a [`crate::TimeoutError`].
    pub error: &'a dyn Any,
    /// Number of failed attempts so far, including this one (1-indexed)
    pub attempt: u32,
    /// Whether the attempt was cut short by the per-attempt timeout
    pub timed_out: bool,
}

impl FailureContext<'_> {
    /// Downcast the error to a concrete type
    pub fn error_as<T: Any>(&self) -> Option<&T> {
        self.error.downcast_ref::<T>()
    }
}

/// Trait for classifying failures - determines if a failed attempt is retried
///
/// # Examples
///
/// ```rust
/// use retry_machines::{FailureClassifier, FailureContext};
///
/// #[derive(Debug)]
/// struct RetryTimeoutsOnly;
///
/// impl FailureClassifier for RetryTimeoutsOnly {
///     fn should_retry(&self, ctx: &FailureContext<'_>) -> bool {
///         ctx.timed_out && ctx.attempt < 5
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` if another attempt should follow this failure
    fn should_retry(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Classifier that retries every error until the attempt budget is spent
#[derive(Debug, Clone, Copy)]
pub struct MaxAttemptsClassifier {
    pub max_attempts: u32,
}

impl MaxAttemptsClassifier {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl FailureClassifier for MaxAttemptsClassifier {
    fn should_retry(&self, ctx: &FailureContext<'_>) -> bool {
        ctx.attempt < self.max_attempts
    }
}

/// Predicate-based classifier using a closure
///
/// Allows using simple closures for common filtering patterns.
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    /// Create a new predicate-based classifier
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn should_retry(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
