//! # Task Execution Metrics
//!
//! Metrics sinks are injected into the worker pool through
//! [`WorkerPoolConfig::with_metrics_collector`](crate::execution::WorkerPoolConfig::with_metrics_collector).
//! Two collectors ship with the crate: [`TracingMetricsCollector`] forwards every
//! execution to `tracing`, and [`InMemoryMetricsCollector`] aggregates per-task
//! statistics for inspection and tests.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Metrics collection trait for integration with monitoring systems
pub trait MetricsCollector: Send + Sync {
    /// Record one task execution
    fn record_task_execution(&self, task_id: &str, duration: Duration, success: bool);
}

/// Collector that emits a debug event per execution
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsCollector;

impl MetricsCollector for TracingMetricsCollector {
    fn record_task_execution(&self, task_id: &str, duration: Duration, success: bool) {
        tracing::debug!(
            task_id = task_id,
            duration_ms = duration.as_millis() as u64,
            success = success,
            "Task execution recorded"
        );
    }
}

/// Aggregated statistics for one task id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionStats {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl TaskExecutionStats {
    pub fn average_duration(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_duration.as_nanos() / u128::from(self.executions);
        // Never exceeds total_duration, so the seconds fit in u64
        Duration::new((nanos / 1_000_000_000) as u64, (nanos % 1_000_000_000) as u32)
    }

    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.successes as f64 / self.executions as f64
    }
}

/// Thread-safe in-memory collector keyed by task id
#[derive(Debug, Default)]
pub struct InMemoryMetricsCollector {
    stats: DashMap<String, TaskExecutionStats>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats_for(&self, task_id: &str) -> Option<TaskExecutionStats> {
        self.stats.get(task_id).map(|entry| entry.value().clone())
    }

    pub fn total_executions(&self) -> u64 {
        self.stats.iter().map(|entry| entry.executions).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.stats.iter().map(|entry| entry.failures).sum()
    }

    pub fn task_count(&self) -> usize {
        self.stats.len()
    }

    pub fn reset(&self) {
        self.stats.clear();
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn record_task_execution(&self, task_id: &str, duration: Duration, success: bool) {
        let mut entry = self.stats.entry(task_id.to_string()).or_default();
        entry.executions += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        entry.total_duration = entry.total_duration.saturating_add(duration);
        entry.max_duration = entry.max_duration.max(duration);
    }
}
