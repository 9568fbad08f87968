//! # Worker Pool
//!
//! Runs a set of named [`Task`]s across a fixed number of concurrent workers and
//! collects one [`TaskResult`] per task.
//!
//! ## Architecture
//!
//! ```text
//! tasks ─► schedule (optional priority sort) ─► producer ─► [task channel]
//!                                                               │
//!                                 ┌──────────────┬──────────────┤
//!                                 ▼              ▼              ▼
//!                              worker 0       worker 1  ...  worker N-1
//!                                 │              │              │
//!                                 └──────► [result channel] ◄───┘
//!                                                  │
//!                                                  ▼
//!                                  collector (caller's future) ─► HashMap<id, TaskResult>
//! ```
//!
//! Priority ordering is applied once, when the channel is filled. With more than
//! one worker the completion order is unordered; only a single-worker pool
//! executes strictly in priority order.
//!
//! ## Failure Semantics
//!
//! No task failure aborts the pool. Per-task errors are carried in
//! [`TaskResult::error`]. A result timeout or a done caller context returns the
//! results collected so far, so callers detect truncation by comparing the
//! returned map's length with the number of submitted tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::metrics::MetricsCollector;
use super::task::{schedule, Task, TaskItem};
use super::worker::Worker;
use crate::context::TaskContext;
use crate::error::TaskError;

/// Result of one task, produced exactly once per executed task
#[derive(Debug)]
pub struct TaskResult<O> {
    pub id: String,
    pub error: Option<TaskError>,
    pub value: Option<O>,
    pub elapsed_ms: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub priority: i32,
}

impl<O> TaskResult<O> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback fired synchronously for every collected result, in collection order
pub type ResultCallback<O> = Arc<dyn Fn(&TaskResult<O>) + Send + Sync>;

/// Options for one pool invocation
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use tasker_pool::execution::WorkerPoolConfig;
///
/// let config: WorkerPoolConfig<u64> = WorkerPoolConfig::new()
///     .with_task_timeout(Duration::from_secs(5))
///     .with_result_timeout(Duration::from_secs(30))
///     .with_priority_support(true);
///
/// assert!(config.use_priority);
/// ```
pub struct WorkerPoolConfig<O> {
    /// Per-task deadline; `None` ties tasks to the pool context only
    pub task_timeout: Option<Duration>,
    /// Deadline for collecting all results; `None` waits for every worker
    pub result_timeout: Option<Duration>,
    /// Sort tasks by descending priority before scheduling
    pub use_priority: bool,
    span: Option<Span>,
    metrics_collector: Option<Arc<dyn MetricsCollector>>,
    on_result: Option<ResultCallback<O>>,
}

impl<O> WorkerPoolConfig<O> {
    pub fn new() -> Self {
        Self {
            task_timeout: None,
            result_timeout: None,
            use_priority: false,
            span: None,
            metrics_collector: None,
            on_result: None,
        }
    }

    /// Set the per-task timeout; zero disables it
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set the result-collection timeout; zero disables it
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Emit the pool's events as children of `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_metrics_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics_collector = Some(collector);
        self
    }

    pub fn with_result_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskResult<O>) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(callback));
        self
    }

    pub fn with_priority_support(mut self, enabled: bool) -> Self {
        self.use_priority = enabled;
        self
    }

    fn pool_span(&self, total: usize, num_workers: usize) -> Span {
        let pool_id = Uuid::new_v4();
        match &self.span {
            Some(parent) => info_span!(
                parent: parent,
                "worker_pool",
                pool_id = %pool_id,
                tasks = total,
                workers = num_workers
            ),
            None => info_span!(
                "worker_pool",
                pool_id = %pool_id,
                tasks = total,
                workers = num_workers
            ),
        }
    }
}

impl<O> Default for WorkerPoolConfig<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for WorkerPoolConfig<O> {
    fn clone(&self) -> Self {
        Self {
            task_timeout: self.task_timeout,
            result_timeout: self.result_timeout,
            use_priority: self.use_priority,
            span: self.span.clone(),
            metrics_collector: self.metrics_collector.clone(),
            on_result: self.on_result.clone(),
        }
    }
}

impl<O> fmt::Debug for WorkerPoolConfig<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolConfig")
            .field("task_timeout", &self.task_timeout)
            .field("result_timeout", &self.result_timeout)
            .field("use_priority", &self.use_priority)
            .field("has_metrics_collector", &self.metrics_collector.is_some())
            .field("has_result_callback", &self.on_result.is_some())
            .finish()
    }
}

/// Run `tasks` on `num_workers` concurrent workers and collect their results
///
/// `num_workers` is clamped to at least one. Returns fewer results than tasks
/// only when `ctx` is done or the result timeout elapses before every worker
/// has reported. Task ids are keys: a repeated id replaces the earlier task
/// and is logged at warn level.
///
/// # Examples
///
/// ```rust
/// use tasker_pool::context::TaskContext;
/// use tasker_pool::execution::{run_worker_pool, Task, WorkerPoolConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let tasks = (1..=3u64).map(|n| {
///     (format!("square-{n}"), Task::new(|_ctx, n: u64| async move { Ok(n * n) }, n))
/// });
///
/// let results = run_worker_pool(&TaskContext::new(), tasks, 2, WorkerPoolConfig::new()).await;
/// assert_eq!(results["square-3"].value, Some(9));
/// # }
/// ```
pub async fn run_worker_pool<K, I, O>(
    ctx: &TaskContext,
    tasks: impl IntoIterator<Item = (K, Task<I, O>)>,
    num_workers: usize,
    config: WorkerPoolConfig<O>,
) -> HashMap<String, TaskResult<O>>
where
    K: Into<String>,
    I: Send + 'static,
    O: Send + 'static,
{
    let items = schedule(tasks, config.use_priority);
    run_scheduled(ctx, items, num_workers, &config).await
}

/// Run `tasks` in fixed-size batches, one fresh pool per batch
///
/// Batches are cut after the optional priority sort, so higher-priority tasks
/// land in earlier batches. No new batch starts once `ctx` is done; the batch in
/// flight is not cancelled by this function. A `batch_size` of zero runs
/// everything as one batch.
pub async fn run_batch_worker_pool<K, I, O>(
    ctx: &TaskContext,
    tasks: impl IntoIterator<Item = (K, Task<I, O>)>,
    num_workers: usize,
    batch_size: usize,
    config: WorkerPoolConfig<O>,
) -> HashMap<String, TaskResult<O>>
where
    K: Into<String>,
    I: Send + 'static,
    O: Send + 'static,
{
    let mut remaining = schedule(tasks, config.use_priority);
    let total = remaining.len();
    let batch_size = if batch_size == 0 {
        total.max(1)
    } else {
        batch_size
    };

    let mut results = HashMap::with_capacity(total);
    let mut batch_index = 0usize;

    while !remaining.is_empty() {
        if let Some(reason) = ctx.err() {
            warn!(
                reason = %reason,
                batches_run = batch_index,
                tasks_skipped = remaining.len(),
                "Context done, not issuing further batches"
            );
            break;
        }

        let rest = remaining.split_off(batch_size.min(remaining.len()));
        let batch = std::mem::replace(&mut remaining, rest);

        debug!(
            batch_index = batch_index,
            batch_len = batch.len(),
            "Running worker pool batch"
        );

        results.extend(run_scheduled(ctx, batch, num_workers, &config).await);
        batch_index += 1;
    }

    results
}

async fn run_scheduled<I, O>(
    ctx: &TaskContext,
    items: Vec<TaskItem<I, O>>,
    num_workers: usize,
    config: &WorkerPoolConfig<O>,
) -> HashMap<String, TaskResult<O>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return HashMap::new();
    }

    let num_workers = num_workers.max(1);
    let span = config.pool_span(total, num_workers);

    collect_results(ctx, items, num_workers, config)
        .instrument(span)
        .await
}

async fn collect_results<I, O>(
    ctx: &TaskContext,
    items: Vec<TaskItem<I, O>>,
    num_workers: usize,
    config: &WorkerPoolConfig<O>,
) -> HashMap<String, TaskResult<O>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let total = items.len();

    // Scoped to this call: cancelled on return so no worker outlives it
    let pool_ctx = ctx.child();
    let _pool_guard = pool_ctx.token().clone().drop_guard();

    let (task_tx, task_rx) = mpsc::channel::<TaskItem<I, O>>(total);
    let (result_tx, mut result_rx) = mpsc::channel::<TaskResult<O>>(total);
    let task_rx = Arc::new(Mutex::new(task_rx));

    let producer_ctx = pool_ctx.clone();
    let producer = tokio::spawn(
        async move {
            for item in items {
                tokio::select! {
                    biased;
                    _ = producer_ctx.done() => {
                        debug!("Pool context done, producer stopped enqueueing");
                        break;
                    }
                    sent = task_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        .instrument(Span::current()),
    );

    let workers: Vec<_> = (0..num_workers)
        .map(|id| {
            let worker = Worker {
                id,
                pool_ctx: pool_ctx.clone(),
                task_timeout: config.task_timeout,
                tasks: Arc::clone(&task_rx),
                results: result_tx.clone(),
                metrics: config.metrics_collector.clone(),
            };
            tokio::spawn(worker.run().instrument(Span::current()))
        })
        .collect();

    // Holds the last result sender until every worker has exited
    let supervisor = tokio::spawn(
        async move {
            for handle in workers {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task terminated abnormally");
                }
            }
            drop(result_tx);
            debug!("All workers finished, result channel closed");
        }
        .instrument(Span::current()),
    );

    let deadline = config
        .result_timeout
        .and_then(|timeout| Instant::now().checked_add(timeout));
    let mut results = HashMap::with_capacity(total);
    let mut truncated = false;

    loop {
        let received = tokio::select! {
            biased;
            reason = ctx.done() => {
                warn!(
                    reason = %reason,
                    collected = results.len(),
                    expected = total,
                    "Context done before all results were collected, returning partial results"
                );
                truncated = true;
                break;
            }
            _ = sleep_until(deadline) => {
                warn!(
                    collected = results.len(),
                    expected = total,
                    result_timeout_ms = config.result_timeout.map(|t| t.as_millis() as u64),
                    "Result timeout elapsed, returning partial results"
                );
                truncated = true;
                break;
            }
            received = result_rx.recv() => received,
        };

        let Some(result) = received else {
            break;
        };

        if let Some(callback) = &config.on_result {
            callback(&result);
        }
        results.insert(result.id.clone(), result);
    }

    if truncated {
        pool_ctx.cancel();
    } else {
        let _ = producer.await;
        let _ = supervisor.await;
    }

    let failed = results.values().filter(|r| !r.is_success()).count();
    info!(
        expected = total,
        collected = results.len(),
        failed = failed,
        truncated = truncated,
        "Worker pool finished"
    );

    results
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
