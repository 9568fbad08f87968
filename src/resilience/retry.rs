//! # Retry With Backoff
//!
//! Exponential backoff with additive jitter, interruptible by the caller's
//! [`TaskContext`].
//!
//! The wait before retry `k` (0-indexed) is `initial_wait * backoff_factor^k`
//! plus a uniform jitter in `[0, jitter_factor * base]`, capped at `max_wait`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigResult, ConfigurationError};
use crate::context::TaskContext;
use crate::error::ResilienceError;

const DEFAULT_INITIAL_WAIT: Duration = Duration::from_millis(100);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(with = "duration_millis", rename = "initial_wait_ms")]
    pub initial_wait: Duration,
    #[serde(with = "duration_millis", rename = "max_wait_ms")]
    pub max_wait: Duration,
    /// Additional attempts after the first call
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Fraction of the base wait added as random jitter; 0 disables jitter
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_wait: DEFAULT_INITIAL_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Replace unset values with defaults
    ///
    /// Zero waits and backoff factors below one or non-finite fall back to
    /// their defaults. A negative or non-finite jitter factor becomes zero.
    /// `max_retries = 0` is kept: it means a single attempt.
    pub fn normalized(mut self) -> Self {
        if self.initial_wait.is_zero() {
            self.initial_wait = DEFAULT_INITIAL_WAIT;
        }
        if self.max_wait.is_zero() {
            self.max_wait = DEFAULT_MAX_WAIT;
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            self.backoff_factor = DEFAULT_BACKOFF_FACTOR;
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
            self.jitter_factor = 0.0;
        }
        self
    }

    /// Validate the configuration as loaded from files or the environment
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_factor",
                self.backoff_factor,
                "must be a finite number of at least 1.0",
            ));
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_factor",
                self.jitter_factor,
                "must be a non-negative finite number",
            ));
        }
        if !self.max_wait.is_zero() && self.max_wait < self.initial_wait {
            return Err(ConfigurationError::invalid_value(
                "retry.max_wait_ms",
                self.max_wait.as_millis(),
                "must not be shorter than retry.initial_wait_ms",
            ));
        }
        Ok(())
    }

    /// Wait before retry `attempt` (0-indexed), including jitter
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let max = self.max_wait.as_secs_f64();
        // Clamp the exponent: beyond this the cap always wins
        let exponent = attempt.min(1_000) as i32;
        let base = (self.initial_wait.as_secs_f64() * self.backoff_factor.powi(exponent)).min(max);

        let jitter = if self.jitter_factor > 0.0 && base > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_factor * base)
        } else {
            0.0
        };

        let wait = (base + jitter).min(max);
        Duration::try_from_secs_f64(wait.max(0.0)).unwrap_or(self.max_wait)
    }
}

/// Runs an operation with retries according to a [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct Retryer {
    config: RetryConfig,
}

impl Retryer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Call `operation` until it succeeds or the retry budget is spent
    ///
    /// Returns the last operation error unchanged once every attempt has failed.
    /// Returns [`ResilienceError::Context`] as soon as `ctx` is done after a failed
    /// attempt or while waiting out a backoff.
    pub async fn run<T, E, F, Fut>(
        &self,
        ctx: &TaskContext,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let Some(reason) = ctx.err() {
                return Err(ResilienceError::Context(reason));
            }

            if attempt >= self.config.max_retries {
                return Err(ResilienceError::Operation(err));
            }

            let wait = self.config.backoff_for_attempt(attempt);
            debug!(
                attempt = attempt + 1,
                remaining = self.config.max_retries - attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Operation failed, retrying after backoff"
            );

            tokio::select! {
                biased;
                reason = ctx.done() => return Err(ResilienceError::Context(reason)),
                _ = tokio::time::sleep(wait) => {}
            }

            attempt += 1;
        }
    }
}

/// Serialize a [`Duration`] as integer milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
