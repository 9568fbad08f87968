//! Task definition and single-task execution

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::context::TaskContext;
use crate::error::TaskError;

/// Boxed future returned by a task function
pub type TaskFuture<O> = Pin<Box<dyn Future<Output = anyhow::Result<O>> + Send>>;

/// Type-erased task function
pub type TaskFn<I, O> = Arc<dyn Fn(TaskContext, I) -> TaskFuture<O> + Send + Sync>;

/// A unit of work: an async function, its input and a priority tag
///
/// Higher priorities are scheduled first when the pool runs with priority
/// support enabled. There is no enforced range.
///
/// # Examples
///
/// ```rust
/// use tasker_pool::execution::Task;
///
/// let task = Task::new(
///     |_ctx, n: u64| async move { Ok(n * 2) },
///     21,
/// )
/// .with_priority(5);
///
/// assert_eq!(task.priority(), 5);
/// ```
pub struct Task<I, O> {
    function: TaskFn<I, O>,
    args: I,
    priority: i32,
}

/// Outcome of [`Task::execute`]
#[derive(Debug)]
pub struct TaskOutcome<O> {
    pub result: Result<O, TaskError>,
    pub duration_ms: u64,
}

impl<I, O> Task<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F, Fut>(function: F, args: I) -> Self
    where
        F: Fn(TaskContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self {
            function: Arc::new(move |ctx, args| Box::pin(function(ctx, args))),
            args,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Run the task function against `ctx`
    ///
    /// Fails with the context's error and zero duration, without calling the
    /// function, when `ctx` is already done.
    pub async fn execute(self, ctx: &TaskContext) -> TaskOutcome<O> {
        if let Some(err) = ctx.err() {
            return TaskOutcome {
                result: Err(err.into()),
                duration_ms: 0,
            };
        }

        let started = Instant::now();
        let result = (self.function)(ctx.clone(), self.args)
            .await
            .map_err(TaskError::Failed);

        TaskOutcome {
            result,
            duration_ms: round_millis(started.elapsed()),
        }
    }
}

impl<I, O> Task<I, O> {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn args(&self) -> &I {
        &self.args
    }
}

impl<I: Clone, O> Clone for Task<I, O> {
    fn clone(&self) -> Self {
        Self {
            function: Arc::clone(&self.function),
            args: self.args.clone(),
            priority: self.priority,
        }
    }
}

impl<I: fmt::Debug, O> fmt::Debug for Task<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("args", &self.args)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A task paired with its caller-assigned id
pub struct TaskItem<I, O> {
    pub id: String,
    pub task: Task<I, O>,
}

impl<I, O> TaskItem<I, O> {
    pub fn new(id: impl Into<String>, task: Task<I, O>) -> Self {
        Self {
            id: id.into(),
            task,
        }
    }

    pub fn priority(&self) -> i32 {
        self.task.priority()
    }
}

/// Flatten caller tasks, optionally stable-sorted by descending priority
///
/// Ids are unique in the result: a repeated id replaces the earlier task in
/// place, the same way inserting into a map would.
pub(crate) fn schedule<K, I, O>(
    tasks: impl IntoIterator<Item = (K, Task<I, O>)>,
    use_priority: bool,
) -> Vec<TaskItem<I, O>>
where
    K: Into<String>,
{
    let mut items: Vec<TaskItem<I, O>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (id, task) in tasks {
        let item = TaskItem::new(id, task);
        match positions.get(&item.id) {
            Some(&index) => {
                warn!(task_id = %item.id, "Duplicate task id, replacing earlier task");
                items[index] = item;
            }
            None => {
                positions.insert(item.id.clone(), items.len());
                items.push(item);
            }
        }
    }

    if use_priority {
        // sort_by_key is stable: equal priorities keep caller order
        items.sort_by_key(|item| std::cmp::Reverse(item.priority()));
    }

    items
}

pub(crate) fn round_millis(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}
