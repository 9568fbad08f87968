//! Worker loop: dequeue, execute with panic isolation and deadline, emit result

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use super::metrics::MetricsCollector;
use super::task::{round_millis, TaskItem};
use super::worker_pool::TaskResult;
use crate::context::TaskContext;
use crate::error::TaskError;

/// Shared task queue; workers take turns receiving from it
pub(crate) type TaskQueue<I, O> = Arc<Mutex<mpsc::Receiver<TaskItem<I, O>>>>;

/// One of the pool's concurrent executors
pub(crate) struct Worker<I, O> {
    pub id: usize,
    pub pool_ctx: TaskContext,
    pub task_timeout: Option<Duration>,
    pub tasks: TaskQueue<I, O>,
    pub results: mpsc::Sender<TaskResult<O>>,
    pub metrics: Option<Arc<dyn MetricsCollector>>,
}

impl<I, O> Worker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Process tasks until the queue drains or the pool context is done
    pub async fn run(self) {
        debug!(worker_id = self.id, "Worker started");
        let mut processed = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.pool_ctx.done() => None,
                item = async { self.tasks.lock().await.recv().await } => item,
            };

            let Some(item) = next else {
                break;
            };

            let result = self.process(item).await;
            processed += 1;

            tokio::select! {
                biased;
                sent = self.results.send(result) => {
                    if sent.is_err() {
                        debug!(worker_id = self.id, "Result receiver dropped, stopping worker");
                        break;
                    }
                }
                _ = self.pool_ctx.done() => {
                    debug!(worker_id = self.id, "Pool context done while emitting result");
                    break;
                }
            }
        }

        debug!(worker_id = self.id, processed = processed, "Worker stopped");
    }

    async fn process(&self, item: TaskItem<I, O>) -> TaskResult<O> {
        let TaskItem { id, task } = item;
        let priority = task.priority();

        let task_ctx = match self.task_timeout {
            Some(timeout) => self.pool_ctx.with_timeout(timeout),
            None => self.pool_ctx.child(),
        };

        let start_time = Utc::now();
        let started = Instant::now();

        // The task runs on its own tokio task so one that never yields back to
        // the worker cannot stall the queue.
        let inner_ctx = task_ctx.clone();
        let mut handle = tokio::spawn(async move {
            AssertUnwindSafe(task.execute(&inner_ctx))
                .catch_unwind()
                .await
        });

        let (outcome, reported_ms) = tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(Ok(outcome)) => (outcome.result, Some(outcome.duration_ms)),
                Ok(Err(payload)) => (Err(self.panicked(&id, payload)), None),
                Err(join_err) if join_err.is_panic() => {
                    (Err(self.panicked(&id, join_err.into_panic())), None)
                }
                Err(_) => (Err(TaskError::PoolCancelled), None),
            },
            reason = task_ctx.done() => {
                handle.abort();
                let err = TaskError::from(reason);
                if err.is_timeout() {
                    warn!(
                        worker_id = self.id,
                        task_id = %id,
                        timeout_ms = self.task_timeout.map(|t| t.as_millis() as u64),
                        "Task exceeded its deadline"
                    );
                } else {
                    debug!(worker_id = self.id, task_id = %id, "Task cancelled with the pool");
                }
                (Err(err), None)
            }
        };

        // A task that gave up because its context ended reports why the context ended
        let outcome = match (outcome, task_ctx.err()) {
            (Err(TaskError::Failed(_)), Some(reason)) => Err(TaskError::from(reason)),
            (outcome, _) => outcome,
        };

        // Release the per-task token
        task_ctx.cancel();

        let elapsed = started.elapsed();
        let elapsed_ms = reported_ms.unwrap_or_else(|| round_millis(elapsed));

        if let Some(metrics) = &self.metrics {
            metrics.record_task_execution(&id, elapsed, outcome.is_ok());
        }

        let (value, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };

        TaskResult {
            id,
            error,
            value,
            elapsed_ms,
            start_time,
            end_time: Utc::now(),
            priority,
        }
    }

    fn panicked(&self, task_id: &str, payload: Box<dyn Any + Send>) -> TaskError {
        let message = panic_message(payload.as_ref());
        error!(
            worker_id = self.id,
            task_id = %task_id,
            panic_msg = %message,
            "Task panicked"
        );
        TaskError::Panic(message)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
