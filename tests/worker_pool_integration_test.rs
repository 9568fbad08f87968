//! Worker pool behaviour across mixed outcomes, priorities and cancellation

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::*;
use tasker_pool::execution::InMemoryMetricsCollector;
use tasker_pool::{run_batch_worker_pool, run_worker_pool, Task, TaskContext, WorkerPoolConfig};

#[tokio::test]
async fn test_mixed_outcomes_all_report() {
    let tasks = vec![
        ("A", behavior_task(Behavior::Fail { request_id: 7 }).with_priority(3)),
        (
            "B",
            behavior_task(Behavior::Succeed {
                after: Duration::from_millis(5),
                value: "b-done",
            })
            .with_priority(1),
        ),
        (
            "C",
            behavior_task(Behavior::Panic {
                message: "bad state in C",
            })
            .with_priority(2),
        ),
        (
            "D",
            behavior_task(Behavior::Hang {
                for_: Duration::from_millis(500),
            })
            .with_priority(0),
        ),
        (
            "E",
            behavior_task(Behavior::Succeed {
                after: Duration::ZERO,
                value: "e-done",
            })
            .with_priority(3),
        ),
    ];

    let config = WorkerPoolConfig::new()
        .with_task_timeout(Duration::from_millis(50))
        .with_priority_support(true);

    let results = run_worker_pool(&TaskContext::new(), tasks, 2, config).await;
    assert_eq!(results.len(), 5);

    let a = &results["A"];
    assert_eq!(
        a.error.as_ref().and_then(|e| e.downcast_ref::<UpstreamError>()),
        Some(&UpstreamError { request_id: 7 })
    );
    assert_eq!(a.priority, 3);

    let b = &results["B"];
    assert!(b.is_success());
    assert_eq!(b.value.as_deref(), Some("b-done"));

    let c = &results["C"];
    let c_err = c.error.as_ref().unwrap();
    assert!(c_err.is_panic());
    assert!(c_err.to_string().contains("bad state in C"));

    let d = &results["D"];
    assert!(d.error.as_ref().unwrap().is_timeout());
    assert!(d.value.is_none());

    let e = &results["E"];
    assert!(e.is_success());
    assert_eq!(e.value.as_deref(), Some("e-done"));

    for result in results.values() {
        assert!(result.end_time >= result.start_time);
    }
}

#[tokio::test]
async fn test_single_worker_runs_in_priority_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let priorities = [("low", 1), ("urgent", 9), ("normal", 5), ("high", 7), ("lowest", -2)];

    let tasks = priorities.iter().map(|(id, priority)| {
        let order = Arc::clone(&order);
        let task = Task::new(
            move |_ctx, id: &'static str| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(id);
                    Ok(id)
                }
            },
            *id,
        )
        .with_priority(*priority);
        (*id, task)
    });

    let config = WorkerPoolConfig::new().with_priority_support(true);
    let results = run_worker_pool(&TaskContext::new(), tasks, 1, config).await;

    assert_eq!(results.len(), 5);
    assert_eq!(
        *order.lock().unwrap(),
        vec!["urgent", "high", "normal", "low", "lowest"]
    );

    let mut by_start: Vec<_> = results.values().collect();
    by_start.sort_by_key(|r| std::cmp::Reverse(r.priority));
    for pair in by_start.windows(2) {
        assert!(pair[0].start_time <= pair[1].start_time);
    }
}

#[tokio::test]
async fn test_cancelled_context_returns_promptly() {
    let ctx = TaskContext::new();
    ctx.cancel();

    let tasks = (0..20).map(|n| {
        (
            format!("sleeper-{n}"),
            cooperative_sleeper(Duration::from_secs(5)),
        )
    });

    let started = Instant::now();
    let results = run_worker_pool(&ctx, tasks, 4, WorkerPoolConfig::new()).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(results.len() <= 20);
    assert!(results.values().all(|r| !r.is_success()));
}

#[tokio::test]
async fn test_cancellation_mid_run_returns_partial_results() {
    let ctx = TaskContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut tasks: Vec<(String, Task<Duration, &'static str>)> = vec![(
        "quick".to_string(),
        cooperative_sleeper(Duration::from_millis(1)),
    )];
    tasks.extend((0..8).map(|n| {
        (
            format!("slow-{n}"),
            cooperative_sleeper(Duration::from_secs(10)),
        )
    }));

    let started = Instant::now();
    let results = run_worker_pool(&ctx, tasks, 3, WorkerPoolConfig::new()).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(results.len() < 9);
    assert_eq!(results["quick"].value, Some("slept"));
}

#[tokio::test]
async fn test_per_task_timeout_does_not_cancel_siblings() {
    let tasks = vec![
        ("slow", cooperative_sleeper(Duration::from_millis(300))),
        ("fast-1", cooperative_sleeper(Duration::from_millis(5))),
        ("fast-2", cooperative_sleeper(Duration::from_millis(5))),
    ];

    let config = WorkerPoolConfig::new().with_task_timeout(Duration::from_millis(60));
    let results = run_worker_pool(&TaskContext::new(), tasks, 3, config).await;

    assert!(results["slow"].error.as_ref().unwrap().is_timeout());
    assert!(results["fast-1"].is_success());
    assert!(results["fast-2"].is_success());
}

#[tokio::test]
async fn test_tasks_see_their_deadline() {
    let task = Task::new(
        |ctx: TaskContext, _: ()| async move { Ok(ctx.deadline().is_some()) },
        (),
    );

    let config = WorkerPoolConfig::new().with_task_timeout(Duration::from_secs(1));
    let tasks = vec![("deadline_check", task)];
    let results = run_worker_pool(&TaskContext::new(), tasks, 1, config).await;
    assert_eq!(results["deadline_check"].value, Some(true));
}

#[tokio::test]
async fn test_result_callback_and_metrics() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let metrics = Arc::new(InMemoryMetricsCollector::new());

    let config = WorkerPoolConfig::new()
        .with_result_callback(move |result: &tasker_pool::TaskResult<String>| {
            sink.lock().unwrap().push(result.id.clone());
        })
        .with_metrics_collector(metrics.clone())
        .with_span(tracing::info_span!("nightly_import"));

    let tasks = vec![
        ("ok", behavior_task(Behavior::Succeed { after: Duration::ZERO, value: "ok" })),
        ("bad", behavior_task(Behavior::Fail { request_id: 1 })),
    ];

    let results = run_worker_pool(&TaskContext::new(), tasks, 2, config).await;
    assert_eq!(results.len(), 2);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["bad".to_string(), "ok".to_string()]);

    assert_eq!(metrics.total_executions(), 2);
    assert_eq!(metrics.total_failures(), 1);
    assert_eq!(metrics.stats_for("ok").unwrap().successes, 1);
}

#[tokio::test]
async fn test_batched_run_merges_all_batches() {
    let tasks: HashMap<String, Task<Behavior, String>> = (0..10)
        .map(|n| {
            (
                format!("item-{n}"),
                behavior_task(Behavior::Succeed {
                    after: Duration::from_millis(1),
                    value: "done",
                })
                .with_priority(n),
            )
        })
        .collect();

    let config = WorkerPoolConfig::new().with_priority_support(true);
    let results = run_batch_worker_pool(&TaskContext::new(), tasks, 2, 4, config).await;

    assert_eq!(results.len(), 10);
    assert!(results.values().all(|r| r.is_success()));
}

#[tokio::test]
async fn test_zero_batch_size_runs_single_batch() {
    let tasks = (0..5).map(|n| (format!("t{n}"), cooperative_sleeper(Duration::from_millis(1))));
    let results =
        run_batch_worker_pool(&TaskContext::new(), tasks, 2, 0, WorkerPoolConfig::new()).await;
    assert_eq!(results.len(), 5);
}
