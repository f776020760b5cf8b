//! Circuit breaker implementation using state machines
//!
//! The breaker is an admission-control state machine fed success and failure
//! signals:
//!
//! ```text
//! Closed ──(consecutive failures ≥ threshold)──► Open
//! Open ──(reset timeout elapsed, checked lazily on admission)──► HalfOpen
//! HalfOpen ──(any failure)──► Open
//! HalfOpen ──(any success)──► Closed
//! ```
//!
//! All mutable state sits behind a mutex, so one breaker can be shared by
//! many concurrent callers through an `Arc`. Transition callbacks run after
//! the lock is released.

use crate::{
    admission::Admission,
    callbacks::Callbacks,
    clock::{Clock, MonotonicClock},
    jitter,
};
use state_machines::state_machine;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive failures required to open the circuit (at least 1)
    pub failure_threshold: usize,

    /// Time the circuit stays open before probing recovery
    pub reset_timeout: Duration,

    /// Probe calls admitted while half-open (at least 1)
    pub half_open_max_requests: usize,

    /// Jitter factor for reset_timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Lift zero thresholds to one and bound the jitter factor
    fn sanitized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.half_open_max_requests = self.half_open_max_requests.max(1);
        self.jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        self
    }
}

/// Observable state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn from_name(name: &str) -> Self {
        match name {
            "Open" => BreakerState::Open,
            "HalfOpen" => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
            BreakerState::HalfOpen => "HalfOpen",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    /// Consecutive failure signals since the last success or reset
    pub failures: Arc<AtomicUsize>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            config: Config::default(),
            clock: Arc::new(MonotonicClock::new()),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("failures", &self.failures.load(Ordering::Acquire))
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
    /// Seconds after `opened_at` before probing, jitter drawn once per open period
    pub reset_after: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Probe calls admitted since entering HalfOpen
    pub trial_count: usize,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Check if consecutive failures reached the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.failures.load(Ordering::Acquire) >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A single failed probe reopens the circuit, regardless of threshold
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    /// Close once a success has cleared the failure streak
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        ctx.failures.load(Ordering::Acquire) == 0
    }
}

impl Circuit<Open> {
    /// Check if timeout has elapsed for Open -> HalfOpen transition
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let Some(data) = self.state_data_open() else {
            return false;
        };
        let elapsed = ctx.clock.monotonic_time() - data.opened_at;

        elapsed >= data.reset_after
    }
}

/// State transition observed while holding the lock, reported after release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
}

struct Inner {
    machine: DynamicCircuit,
    /// Bumped on every transition so stale admissions can be recognised
    epoch: u64,
}

impl Inner {
    fn state(&self) -> BreakerState {
        BreakerState::from_name(self.machine.current_state())
    }

    /// Lazily move Open -> HalfOpen once the reset timeout has elapsed
    fn attempt_reset(&mut self) -> Option<Transition> {
        if self.state() == BreakerState::Open
            && self.machine.handle(CircuitEvent::AttemptReset).is_ok()
        {
            self.epoch += 1;
            return Some(Transition::HalfOpened);
        }
        None
    }

    /// Apply Open-state bookkeeping (timestamp, jittered reset timeout, epoch)
    fn mark_open(&mut self, ctx: &CircuitContext) {
        if let Some(data) = self.machine.open_data_mut() {
            data.opened_at = ctx.clock.monotonic_time();
            data.reset_after = jitter::reset_timeout_secs(
                ctx.config.reset_timeout.as_secs_f64(),
                ctx.config.jitter_factor,
            );
        }
        self.epoch += 1;
    }
}

/// Circuit breaker public API
///
/// Cheap to share: wrap it in an `Arc` and hand clones to every caller that
/// talks to the same dependency.
///
/// # Example
///
/// ```rust
/// use retry_machines::{BreakerState, CircuitBreaker, Config};
///
/// let breaker = CircuitBreaker::new(
///     "inventory",
///     Config {
///         failure_threshold: 2,
///         ..Default::default()
///     },
/// );
///
/// breaker.on_failure();
/// breaker.on_failure();
///
/// assert_eq!(breaker.state(), BreakerState::Open);
/// assert!(!breaker.can_execute());
///
/// breaker.reset();
/// assert!(breaker.can_execute());
/// ```
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let context = CircuitContext {
            name: name.into(),
            config,
            ..Default::default()
        };

        Self::with_context_and_callbacks(context, Callbacks::new())
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(
        mut context: CircuitContext,
        callbacks: Callbacks,
    ) -> Self {
        context.config = context.config.sanitized();
        context.failures.store(0, Ordering::Release);
        let machine = DynamicCircuit::new(context.clone());

        Self {
            inner: Mutex::new(Inner { machine, epoch: 0 }),
            context,
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Ask for admission of one call
    ///
    /// Evaluates the lazy Open -> HalfOpen transition first. Closed admits
    /// every call, Open admits none, HalfOpen admits up to
    /// `half_open_max_requests` probes and counts each one.
    pub fn can_execute(&self) -> bool {
        self.acquire().is_some()
    }

    /// Like [`CircuitBreaker::can_execute`], but returns a guard
    ///
    /// Dropping the guard without calling [`Admission::settle`] hands a
    /// half-open probe slot back, so an abandoned call does not leave the
    /// breaker short of probes.
    pub fn admit(&self) -> Option<Admission<'_>> {
        self.acquire().map(|epoch| Admission::new(self, epoch))
    }

    /// Report a successful call
    ///
    /// Clears the failure streak; in HalfOpen the circuit closes.
    pub fn on_success(&self) {
        let transition = {
            let mut inner = self.lock();
            self.context.failures.store(0, Ordering::Release);

            if inner.state() == BreakerState::HalfOpen
                && inner.machine.handle(CircuitEvent::Close).is_ok()
            {
                inner.epoch += 1;
                Some(Transition::Closed)
            } else {
                None
            }
        };

        self.notify(transition);
    }

    /// Report a failed call
    ///
    /// Extends the failure streak; opens the circuit at the threshold, or
    /// immediately when half-open.
    pub fn on_failure(&self) {
        let transition = {
            let mut inner = self.lock();
            self.context.failures.fetch_add(1, Ordering::AcqRel);

            match inner.state() {
                BreakerState::Open => None,
                BreakerState::Closed | BreakerState::HalfOpen => {
                    if inner.machine.handle(CircuitEvent::Trip).is_ok() {
                        inner.mark_open(&self.context);
                        Some(Transition::Opened)
                    } else {
                        None
                    }
                }
            }
        };

        self.notify(transition);
    }

    /// Force the circuit Closed and zero every counter
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.context.failures.store(0, Ordering::Release);
        // Recreate machine in Closed state
        inner.machine = DynamicCircuit::new(self.context.clone());
        inner.epoch += 1;
        drop(inner);

        tracing::debug!(circuit = %self.context.name, "circuit reset");
    }

    /// Current state, without evaluating the lazy Open -> HalfOpen transition
    pub fn state(&self) -> BreakerState {
        self.lock().state()
    }

    /// Consecutive failure signals since the last success or reset
    pub fn failure_count(&self) -> usize {
        self.context.failures.load(Ordering::Acquire)
    }

    /// Probes admitted in the current HalfOpen period (0 in other states)
    pub fn trial_count(&self) -> usize {
        self.lock()
            .machine
            .half_open_data()
            .map(|d| d.trial_count)
            .unwrap_or(0)
    }

    /// Clock reading when the circuit last opened, if it is open
    pub fn opened_at(&self) -> Option<f64> {
        self.lock().machine.open_data().map(|d| d.opened_at)
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == BreakerState::Closed
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Hand back a half-open probe slot taken under `epoch`
    ///
    /// Ignored when the circuit has transitioned since the slot was taken.
    pub(crate) fn release_trial(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        if let Some(data) = inner.machine.half_open_data_mut() {
            data.trial_count = data.trial_count.saturating_sub(1);
        }
    }

    /// Admission decision; returns the epoch the admission belongs to
    fn acquire(&self) -> Option<u64> {
        let (admitted, transition) = {
            let mut inner = self.lock();
            let transition = inner.attempt_reset();

            let admitted = match inner.state() {
                BreakerState::Closed => true,
                BreakerState::Open => false,
                BreakerState::HalfOpen => {
                    let limit = self.context.config.half_open_max_requests;
                    match inner.machine.half_open_data_mut() {
                        Some(data) if data.trial_count < limit => {
                            data.trial_count += 1;
                            true
                        }
                        _ => false,
                    }
                }
            };

            (admitted.then_some(inner.epoch), transition)
        };

        self.notify(transition);
        admitted
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log a transition and fire its callback (lock must not be held)
    fn notify(&self, transition: Option<Transition>) {
        let name = self.context.name.as_str();
        match transition {
            Some(Transition::Opened) => {
                tracing::warn!(
                    circuit = %name,
                    failures = self.failure_count(),
                    reset_timeout_ms = self.context.config.reset_timeout.as_millis() as u64,
                    "circuit opened"
                );
                self.callbacks.trigger_open(name);
            }
            Some(Transition::HalfOpened) => {
                tracing::info!(circuit = %name, "circuit half-open, probing recovery");
                self.callbacks.trigger_half_open(name);
            }
            Some(Transition::Closed) => {
                tracing::info!(circuit = %name, "circuit closed");
                self.callbacks.trigger_close(name);
            }
            None => {}
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .field("config", &self.context.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
