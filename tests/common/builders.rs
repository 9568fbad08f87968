use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasker_pool::{CircuitBreakerConfig, ResilienceExecutor, RetryConfig, Task};

/// Error a task or operation returns when its upstream refuses the call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream refused request {request_id}")]
pub struct UpstreamError {
    pub request_id: u32,
}

/// What a scenario task does when executed
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed { after: Duration, value: &'static str },
    Fail { request_id: u32 },
    Panic { message: &'static str },
    /// Sleeps without watching its context
    Hang { for_: Duration },
}

pub fn behavior_task(behavior: Behavior) -> Task<Behavior, String> {
    Task::new(
        |_ctx, behavior: Behavior| async move {
            match behavior {
                Behavior::Succeed { after, value } => {
                    tokio::time::sleep(after).await;
                    Ok(value.to_string())
                }
                Behavior::Fail { request_id } => Err(UpstreamError { request_id }.into()),
                Behavior::Panic { message } => panic!("{}", message),
                Behavior::Hang { for_ } => {
                    tokio::time::sleep(for_).await;
                    Ok("woke up".to_string())
                }
            }
        },
        behavior,
    )
}

/// Task that sleeps while honouring cancellation of its context
pub fn cooperative_sleeper(duration: Duration) -> Task<Duration, &'static str> {
    Task::new(
        |ctx, duration: Duration| async move {
            tokio::select! {
                _ = ctx.done() => anyhow::bail!("stopped early"),
                _ = tokio::time::sleep(duration) => Ok("slept"),
            }
        },
        duration,
    )
}

/// Operation that fails `failures` times before succeeding, counting every call
#[derive(Debug, Clone, Default)]
pub struct FlakyOperation {
    calls: Arc<AtomicU32>,
    failures: u32,
}

impl FlakyOperation {
    pub fn failing(failures: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn call(&self) -> Result<u32, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(UpstreamError { request_id: n })
        } else {
            Ok(n)
        }
    }
}

/// Executor with millisecond backoff suitable for tests
pub fn fast_executor(
    name: &str,
    max_retries: u32,
    request_threshold: u32,
    open_timeout: Duration,
) -> ResilienceExecutor {
    ResilienceExecutor::new(
        RetryConfig::new()
            .with_initial_wait(Duration::from_millis(1))
            .with_max_wait(Duration::from_millis(5))
            .with_max_retries(max_retries),
        CircuitBreakerConfig::new(name)
            .with_request_threshold(request_threshold)
            .with_failure_rate_threshold(0.5)
            .with_open_timeout(open_timeout)
            .with_max_half_open_requests(1),
    )
}
