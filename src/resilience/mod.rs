//! # Resilience Module
//!
//! Fault tolerance for calls to external collaborators (HTTP, database, queue).
//!
//! ## Architecture
//!
//! - **Retryer**: exponential backoff with jitter, interruptible by the caller's context
//! - **Circuit Breaker**: fails fast once a component's failure rate crosses a threshold
//! - **ResilienceExecutor**: `breaker(retry(operation))` behind a single `execute`
//! - **ResilienceRegistry**: one executor per named component, built from settings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_pool::config::ResilienceSettings;
//! use tasker_pool::context::TaskContext;
//! use tasker_pool::resilience::ResilienceRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ResilienceRegistry::new(ResilienceSettings::default());
//! let executor = registry.executor("orders_db");
//!
//! let row_count = executor
//!     .execute(&TaskContext::new(), || async {
//!         // Database call here
//!         Ok::<u64, std::io::Error>(12)
//!     })
//!     .await?;
//! # let _ = row_count;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod executor;
pub mod manager;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts};
pub use executor::ResilienceExecutor;
pub use manager::ResilienceRegistry;
pub use retry::{RetryConfig, Retryer};
