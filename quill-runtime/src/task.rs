//! Units of asynchronous work and their outcome records.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Identifier of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A unit of work executed once by a pool worker.
///
/// `priority` is advisory: the pool queue is strictly FIFO.
#[async_trait]
pub trait Task: Send + 'static {
    fn id(&self) -> TaskId;

    fn priority(&self) -> i32 {
        0
    }

    /// Run the task. `cancel` fires when the pool begins shutting down.
    async fn execute(self: Box<Self>, cancel: CancellationToken) -> Result<(), TaskError>;
}

/// Outcome of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    /// Present iff `success` is false.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl TaskResult {
    /// Build the record for a task that started at `started_at` / `clock`.
    pub fn finish(
        task_id: TaskId,
        started_at: DateTime<Utc>,
        clock: Instant,
        outcome: &Result<(), TaskError>,
    ) -> Self {
        let duration = clock.elapsed();
        let finished_at = started_at
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        TaskResult {
            task_id,
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
            started_at,
            finished_at,
            duration,
        }
    }
}

/// Wraps an async closure as a [`Task`].
pub struct FnTask<F> {
    id: TaskId,
    priority: i32,
    body: F,
}

impl<F, Fut> FnTask<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(id: TaskId, body: F) -> Self {
        FnTask {
            id,
            priority: 0,
            body,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn id(&self) -> TaskId {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn execute(self: Box<Self>, cancel: CancellationToken) -> Result<(), TaskError> {
        (self.body)(cancel).await
    }
}
