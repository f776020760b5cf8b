//! Error types for retry execution

use crate::circuit::BreakerState;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// A single attempt did not complete within the configured timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attempt {attempt} timed out after {timeout:?}")]
pub struct TimeoutError {
    /// The per-attempt timeout that elapsed
    pub timeout: Duration,
    /// Attempt number that timed out (1-indexed)
    pub attempt: u32,
}

/// Terminal failure of a retried operation
///
/// Only the final, unrecoverable error crosses the API boundary. The
/// operation's own error is carried unchanged in [`RetryError::Operation`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The wrapped operation failed and the policy declined to retry
    #[error("{0}")]
    Operation(E),
    /// The last attempt exceeded its timeout and the policy declined to retry
    #[error(transparent)]
    Timeout(TimeoutError),
    /// The circuit breaker refused admission; the operation was not invoked
    #[error("circuit '{circuit}' is not accepting calls (state: {state})")]
    CircuitOpen {
        circuit: String,
        state: BreakerState,
    },
}

impl<E> RetryError<E> {
    /// True if the final attempt timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout(_))
    }

    /// True if the circuit breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen { .. })
    }

    /// Borrow the operation's original error, if that is what ended the call
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's original error, if that is what ended the call
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Any> RetryError<E> {
    /// Type-erased view of the underlying failure
    ///
    /// Yields the operation's error or the [`TimeoutError`]; `None` for
    /// circuit rejections, which never reach a policy.
    pub(crate) fn failure(&self) -> Option<&dyn Any> {
        match self {
            RetryError::Operation(e) => Some(e as &dyn Any),
            RetryError::Timeout(t) => Some(t as &dyn Any),
            RetryError::CircuitOpen { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_is_verbatim() {
        let err: RetryError<&str> = RetryError::Operation("boom");

        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.operation_error(), Some(&"boom"));
        assert_eq!(err.into_operation_error(), Some("boom"));
    }

    #[test]
    fn test_timeout_display_and_kind() {
        let err: RetryError<String> = RetryError::Timeout(TimeoutError {
            timeout: Duration::from_millis(250),
            attempt: 2,
        });

        assert!(err.is_timeout());
        assert!(!err.is_circuit_open());
        assert_eq!(err.to_string(), "attempt 2 timed out after 250ms");
        assert!(err.operation_error().is_none());
    }

    #[test]
    fn test_circuit_open_display() {
        let err: RetryError<String> = RetryError::CircuitOpen {
            circuit: "payments".to_string(),
            state: BreakerState::Open,
        };

        assert!(err.is_circuit_open());
        assert_eq!(
            err.to_string(),
            "circuit 'payments' is not accepting calls (state: Open)"
        );
        assert!(err.failure().is_none());
    }

    #[test]
    fn test_failure_downcasts_to_original_type() {
        #[derive(Debug, PartialEq)]
        struct ApiError(u16);

        let err = RetryError::Operation(ApiError(503));
        let any = err.failure().expect("operation failure");
        assert_eq!(any.downcast_ref::<ApiError>(), Some(&ApiError(503)));

        let timeout: RetryError<ApiError> = RetryError::Timeout(TimeoutError {
            timeout: Duration::from_secs(1),
            attempt: 1,
        });
        let any = timeout.failure().expect("timeout failure");
        assert!(any.downcast_ref::<TimeoutError>().is_some());
    }
}
