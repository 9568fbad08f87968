#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Pool
//!
//! Bounded concurrent task execution and resilience wrappers for async Rust services.
//!
//! ## Overview
//!
//! Two cooperating subsystems:
//!
//! - a **priority-aware worker pool** that runs heterogeneous units of work across a
//!   fixed number of concurrent workers, with per-task timeouts, panic isolation and
//!   cancellation-aware result collection
//! - a **resilience executor** that every external call runs through, combining retry
//!   with exponential backoff and a circuit breaker behind one `execute` call
//!
//! ## Module Organization
//!
//! - [`context`] - Cancellation and deadline propagation
//! - [`execution`] - Tasks, the worker pool and execution metrics
//! - [`resilience`] - Retry, circuit breaker, executor and registry
//! - [`config`] - Layered configuration loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tasker_pool::{run_worker_pool, Task, TaskContext, WorkerPoolConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ctx = TaskContext::new();
//! let tasks = vec![
//!     ("fetch-users", Task::new(|_ctx, n: u32| async move { Ok(n + 1) }, 1).with_priority(2)),
//!     ("fetch-orders", Task::new(|_ctx, n: u32| async move { Ok(n * 10) }, 4)),
//! ];
//!
//! let config = WorkerPoolConfig::new()
//!     .with_task_timeout(Duration::from_secs(5))
//!     .with_priority_support(true);
//!
//! let results = run_worker_pool(&ctx, tasks, 2, config).await;
//! assert_eq!(results["fetch-orders"].value, Some(40));
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod logging;
pub mod resilience;

pub use config::{ConfigManager, TaskerPoolConfig};
pub use context::{ContextError, TaskContext};
pub use error::{ResilienceError, Result, TaskError, TaskerPoolError};
pub use execution::{
    run_batch_worker_pool, run_worker_pool, MetricsCollector, Task, TaskResult, WorkerPoolConfig,
};
pub use logging::init_structured_logging;
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceExecutor, ResilienceRegistry,
    RetryConfig, Retryer,
};
