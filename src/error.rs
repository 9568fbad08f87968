//! # Error Taxonomy
//!
//! Errors are split by who observes them:
//!
//! - [`TaskError`] is *data*: it lives inside a [`TaskResult`](crate::execution::TaskResult)
//!   and never escapes the worker pool as a pool-level failure.
//! - [`ResilienceError`] propagates directly to the caller of a resilience-wrapped operation.
//! - [`TaskerPoolError`] covers construction-time problems such as malformed configuration.

use std::fmt;

use crate::config::ConfigurationError;
use crate::context::ContextError;

/// Failure of a single task inside the worker pool
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The per-task deadline expired before the task finished
    #[error("task timed out")]
    Timeout,

    /// The pool's context was cancelled while the task was pending or running
    #[error("worker pool cancelled")]
    PoolCancelled,

    /// The task function panicked; carries the recovered panic message
    #[error("task panicked: {0}")]
    Panic(String),

    /// The task function returned an error
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::PoolCancelled)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panic(_))
    }

    /// The error returned by the task function, if that is what failed
    pub fn task_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Downcast the task function's error back to its concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.task_error().and_then(|err| err.downcast_ref::<E>())
    }
}

impl From<ContextError> for TaskError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::DeadlineExceeded => TaskError::Timeout,
            ContextError::Cancelled => TaskError::PoolCancelled,
        }
    }
}

/// Errors surfaced by the retry / circuit breaker wrapper
///
/// `E` is the error type of the wrapped operation. The final operation error is
/// handed back unchanged in [`ResilienceError::Operation`].
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    /// Circuit is open, the operation was not invoked
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// Half-open probe budget exhausted, the operation was not invoked
    #[error("circuit breaker '{name}' rejected call: too many half-open requests")]
    TooManyCalls { name: String },

    /// The caller's context was cancelled or its deadline passed
    #[error("operation aborted: {0}")]
    Context(ContextError),

    /// The operation failed (after all retries, when retried)
    #[error("{0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_too_many_calls(&self) -> bool {
        matches!(self, ResilienceError::TooManyCalls { .. })
    }

    /// True when the breaker rejected the call without running the operation
    pub fn is_rejection(&self) -> bool {
        self.is_circuit_open() || self.is_too_many_calls()
    }

    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            ResilienceError::Context(err) => Some(*err),
            _ => None,
        }
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::Operation(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> ResilienceError<ResilienceError<E>> {
    /// Collapse a breaker error wrapping a retryer error into a single layer
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::TooManyCalls { name } => ResilienceError::TooManyCalls { name },
            ResilienceError::Context(err) => ResilienceError::Context(err),
            ResilienceError::Operation(inner) => inner,
        }
    }
}

/// Crate-level error for construction and configuration failures
#[derive(Debug, thiserror::Error)]
pub enum TaskerPoolError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, TaskerPoolError>;
