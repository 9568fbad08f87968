//! Retry inside circuit breaker protection, behind one `execute` call

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::retry::{RetryConfig, Retryer};
use crate::context::TaskContext;
use crate::error::ResilienceError;

/// Single chokepoint for calls to external collaborators
///
/// Retries happen inside the breaker's protected call, so the breaker counts one
/// outcome per `execute` no matter how many attempts it took. An open breaker
/// means the operation is not attempted at all.
///
/// Cloning is cheap and clones share the same breaker.
///
/// # Examples
///
/// ```rust
/// use tasker_pool::context::TaskContext;
/// use tasker_pool::resilience::{CircuitBreakerConfig, ResilienceExecutor, RetryConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let executor = ResilienceExecutor::new(
///     RetryConfig::default().with_max_retries(1),
///     CircuitBreakerConfig::new("inventory_api"),
/// );
///
/// let stock = executor
///     .execute(&TaskContext::new(), || async { Ok::<_, std::io::Error>(42) })
///     .await
///     .unwrap();
/// assert_eq!(stock, 42);
/// # }
/// ```
#[derive(Clone)]
pub struct ResilienceExecutor {
    breaker: Arc<CircuitBreaker>,
    retryer: Retryer,
}

impl ResilienceExecutor {
    pub fn new(retry: RetryConfig, breaker: CircuitBreakerConfig) -> Self {
        Self::from_parts(Retryer::new(retry), Arc::new(CircuitBreaker::new(breaker)))
    }

    /// Combine an existing retryer with a possibly shared breaker
    pub fn from_parts(retryer: Retryer, breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker, retryer }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retryer(&self) -> &Retryer {
        &self.retryer
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation` with retries, under circuit breaker protection
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &TaskContext,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let retryer = &self.retryer;
        let result = self
            .breaker
            .execute(ctx, || retryer.run(ctx, operation))
            .await
            .map_err(|err| err.flatten());

        if let Err(ResilienceError::CircuitOpen { name }) = &result {
            warn!(breaker = %name, "Call rejected by open circuit breaker");
        }

        result
    }
}

impl fmt::Debug for ResilienceExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceExecutor")
            .field("breaker", &self.breaker.name())
            .field("state", &self.breaker.state())
            .field("retry", self.retryer.config())
            .finish()
    }
}
