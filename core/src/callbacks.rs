//! Callback system for circuit transitions and retry progress
//!
//! Callbacks are observational and infallible. A panicking callback unwinds
//! through the caller and aborts the retry loop; breaker accounting that was
//! already applied stays applied.

use crate::classifier::FailureContext;
use std::sync::Arc;
use std::time::Duration;

/// Callbacks for circuit breaker state transitions
#[derive(Clone)]
pub struct Callbacks {
    pub on_open: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_close: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_half_open: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self {
            on_open: None,
            on_close: None,
            on_half_open: None,
        }
    }

    pub fn trigger_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_open {
            callback(circuit);
        }
    }

    pub fn trigger_close(&self, circuit: &str) {
        if let Some(ref callback) = self.on_close {
            callback(circuit);
        }
    }

    pub fn trigger_half_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_half_open {
            callback(circuit);
        }
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

/// Type alias for the retry notification callback
pub type RetryFn = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Type alias for the exhaustion callback
pub type ExhaustedFn = Arc<dyn Fn(&FailureContext<'_>) + Send + Sync>;

/// Type alias for the success callback
pub type SuccessFn = Arc<dyn Fn() + Send + Sync>;

/// Observers of a retry loop
#[derive(Clone, Default)]
pub struct RetryCallbacks {
    /// Invoked before sleeping, with the failed attempt count and the delay
    pub on_retry: Option<RetryFn>,
    /// Invoked once when the policy gives up, with the final failure
    pub on_exhausted: Option<ExhaustedFn>,
    /// Invoked once when an attempt succeeds
    pub on_success: Option<SuccessFn>,
}

impl RetryCallbacks {
    pub fn trigger_retry(&self, attempt: u32, delay: Duration) {
        if let Some(ref callback) = self.on_retry {
            callback(attempt, delay);
        }
    }

    pub fn trigger_exhausted(&self, ctx: &FailureContext<'_>) {
        if let Some(ref callback) = self.on_exhausted {
            callback(ctx);
        }
    }

    pub fn trigger_success(&self) {
        if let Some(ref callback) = self.on_success {
            callback();
        }
    }
}

impl std::fmt::Debug for RetryCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCallbacks")
            .field("on_retry", &self.on_retry.is_some())
            .field("on_exhausted", &self.on_exhausted.is_some())
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_empty_callbacks_are_noops() {
        let callbacks = Callbacks::default();
        callbacks.trigger_open("test");
        callbacks.trigger_close("test");
        callbacks.trigger_half_open("test");

        let retry = RetryCallbacks::default();
        retry.trigger_retry(1, Duration::from_secs(1));
        retry.trigger_success();
    }

    #[test]
    fn test_retry_callbacks_receive_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let callbacks = RetryCallbacks {
            on_retry: Some(Arc::new(move |attempt: u32, delay: Duration| {
                seen_clone.lock().unwrap().push((attempt, delay));
            })),
            ..Default::default()
        };

        callbacks.trigger_retry(1, Duration::from_millis(100));
        callbacks.trigger_retry(2, Duration::from_millis(200));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200))
            ]
        );
    }

    #[test]
    fn test_debug_reports_presence_only() {
        let callbacks = Callbacks {
            on_open: Some(Arc::new(|_: &str| {})),
            ..Callbacks::new()
        };

        let rendered = format!("{:?}", callbacks);
        assert!(rendered.contains("on_open: true"));
        assert!(rendered.contains("on_close: false"));
    }
}
