//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to external collaborators. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (probing recovery).
//!
//! Outcomes are tallied in [`Counts`] that belong to a *generation*. A generation
//! ends on every state change and, while closed, every `reset_interval`. Outcomes
//! reported for an earlier generation are discarded, so a slow call that started
//! before a trip cannot skew the counts of the next window.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::retry::duration_millis;
use crate::config::{ConfigResult, ConfigurationError};
use crate::context::TaskContext;
use crate::error::ResilienceError;

const DEFAULT_MAX_HALF_OPEN_REQUESTS: u32 = 100;
const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_THRESHOLD: u32 = 5;
const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 0.5;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub name: String,
    /// Probe calls admitted while half-open; this many consecutive successes close the circuit
    pub max_half_open_requests: u32,
    /// Period after which closed-state counts are cleared
    #[serde(with = "duration_millis", rename = "reset_interval_ms")]
    pub reset_interval: Duration,
    /// Time spent open before probing
    #[serde(with = "duration_millis", rename = "open_timeout_ms")]
    pub open_timeout: Duration,
    /// Minimum requests in a generation before the failure rate is evaluated
    pub request_threshold: u32,
    /// Failure ratio in `(0, 1]` that trips the circuit
    pub failure_rate_threshold: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_half_open_requests: DEFAULT_MAX_HALF_OPEN_REQUESTS,
            reset_interval: DEFAULT_RESET_INTERVAL,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            request_threshold: DEFAULT_REQUEST_THRESHOLD,
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_half_open_requests(mut self, requests: u32) -> Self {
        self.max_half_open_requests = requests;
        self
    }

    pub fn with_reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = interval;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_request_threshold(mut self, threshold: u32) -> Self {
        self.request_threshold = threshold;
        self
    }

    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Replace zero or out-of-range values with defaults
    pub fn normalized(mut self) -> Self {
        if self.name.is_empty() {
            self.name = "default".to_string();
        }
        if self.max_half_open_requests == 0 {
            self.max_half_open_requests = DEFAULT_MAX_HALF_OPEN_REQUESTS;
        }
        if self.reset_interval.is_zero() {
            self.reset_interval = DEFAULT_RESET_INTERVAL;
        }
        if self.open_timeout.is_zero() {
            self.open_timeout = DEFAULT_OPEN_TIMEOUT;
        }
        if self.request_threshold == 0 {
            self.request_threshold = DEFAULT_REQUEST_THRESHOLD;
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            self.failure_rate_threshold = DEFAULT_FAILURE_RATE_THRESHOLD;
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.failure_rate_threshold",
                self.failure_rate_threshold,
                "must be in the range (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Request tallies for the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    pub fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Withdraw a request whose outcome will never be reported
    pub fn on_abandoned(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    pub fn clear(&mut self) {
        *self = Counts::default();
    }

    /// `total_failures / requests`, zero when no requests were made
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.total_failures as f64 / self.requests as f64
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

enum Rejection {
    Open,
    TooManyCalls,
}

/// Thread-safe circuit breaker with generation-scoped counts
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let config = config.normalized();
        info!(
            breaker = %config.name,
            request_threshold = config.request_threshold,
            failure_rate_threshold = config.failure_rate_threshold,
            open_timeout_ms = config.open_timeout.as_millis() as u64,
            max_half_open_requests = config.max_half_open_requests,
            "Circuit breaker initialized"
        );

        let expiry = Instant::now().checked_add(config.reset_interval);
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any pending timeout-driven transition
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.state
    }

    /// Snapshot of the current generation's counts
    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Closed and below the trip threshold
    pub fn is_healthy(&self) -> bool {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.state == CircuitState::Closed && !self.ready_to_trip(&inner.counts)
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(breaker = %self.config.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, CircuitState::Open, Instant::now());
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(breaker = %self.config.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, CircuitState::Closed, Instant::now());
    }

    /// Run `operation` under breaker protection
    ///
    /// Rejections never invoke the operation. A failure observed while `ctx` is
    /// done is reported as [`ResilienceError::Context`] and left out of the
    /// counts. A panic is counted as a failure and then resumed.
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &TaskContext,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(Rejection::Open) => {
                return Err(ResilienceError::CircuitOpen {
                    name: self.config.name.clone(),
                })
            }
            Err(Rejection::TooManyCalls) => {
                return Err(ResilienceError::TooManyCalls {
                    name: self.config.name.clone(),
                })
            }
        };

        let mut pending = PendingRequest {
            breaker: self,
            generation,
            settled: false,
        };

        let outcome = AssertUnwindSafe(operation()).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                pending.settle(true);
                Ok(value)
            }
            Ok(Err(err)) => match ctx.err() {
                Some(reason) => {
                    debug!(
                        breaker = %self.config.name,
                        reason = %reason,
                        "Operation failed after context was done, not counted"
                    );
                    Err(ResilienceError::Context(reason))
                }
                None => {
                    pending.settle(false);
                    Err(ResilienceError::Operation(err))
                }
            },
            Err(payload) => {
                pending.settle(false);
                std::panic::resume_unwind(payload)
            }
        }
    }

    fn before_request(&self) -> Result<u64, Rejection> {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Open => return Err(Rejection::Open),
            CircuitState::HalfOpen
                if inner.counts.requests >= self.config.max_half_open_requests =>
            {
                return Err(Rejection::TooManyCalls)
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(inner.generation)
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.current_state(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        if success {
            self.on_success(&mut inner, now);
        } else {
            self.on_failure(&mut inner, now);
        }
    }

    fn abandon_request(&self, generation: u64) {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        if inner.generation == generation {
            inner.counts.on_abandoned();
        }
    }

    fn on_success(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Closed => inner.counts.on_success(),
            CircuitState::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.config.max_half_open_requests {
                    self.set_state(inner, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                inner.counts.on_failure();
                if self.ready_to_trip(&inner.counts) {
                    self.set_state(inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.request_threshold
            && counts.failure_rate() >= self.config.failure_rate_threshold
    }

    fn current_state(&self, inner: &mut BreakerState, now: Instant) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn set_state(&self, inner: &mut BreakerState, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }

        let from = inner.state;
        let counts = inner.counts;
        inner.state = state;
        self.new_generation(inner, now);

        warn!(
            breaker = %self.config.name,
            from = %from,
            to = %state,
            requests = counts.requests,
            failures = counts.total_failures,
            "Circuit breaker state changed"
        );
    }

    fn new_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts.clear();
        inner.expiry = match inner.state {
            CircuitState::Closed => now.checked_add(self.config.reset_interval),
            CircuitState::Open => now.checked_add(self.config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

/// Tracks an admitted request until its outcome is reported
///
/// Dropped unsettled (the caller stopped polling, or the context was done)
/// it withdraws the request so an abandoned probe does not hold a half-open slot.
struct PendingRequest<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl PendingRequest<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_request(self.generation);
        }
    }
}
