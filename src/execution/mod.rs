//! # Execution
//!
//! Bounded concurrent execution of heterogeneous async tasks.
//!
//! - [`Task`]: an async function with its input and a priority tag
//! - [`run_worker_pool`] / [`run_batch_worker_pool`]: fan tasks out to workers
//!   and collect one [`TaskResult`] per task
//! - [`MetricsCollector`]: pluggable per-execution metrics sink

pub mod metrics;
pub mod task;
mod worker;
pub mod worker_pool;

pub use metrics::{
    InMemoryMetricsCollector, MetricsCollector, TaskExecutionStats, TracingMetricsCollector,
};
pub use task::{Task, TaskFn, TaskFuture, TaskItem, TaskOutcome};
pub use worker_pool::{
    run_batch_worker_pool, run_worker_pool, ResultCallback, TaskResult, WorkerPoolConfig,
};
