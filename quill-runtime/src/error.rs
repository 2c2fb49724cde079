use std::time::Duration;

use thiserror::Error;

use quill_core::GenerationError;

/// Errors from [`crate::pool::WorkerPool`] submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("task queue is full")]
    QueueFull,

    #[error("worker pool is shutting down")]
    ShuttingDown,

    #[error("timed out after {0:?} waiting for queue space")]
    Timeout(Duration),

    #[error("worker pool must be started inside a Tokio runtime")]
    NoRuntime,
}

/// Errors surfaced synchronously by [`crate::renderer::AsyncRenderer`].
#[derive(Debug, Error)]
pub enum AsyncError {
    #[error("submission failed: {0}")]
    Submit(#[from] PoolError),

    #[error("tasks still running after {0:?}")]
    CompletionTimeout(Duration),

    #[error("async renderer has not been started")]
    NotStarted,
}

/// Failure reported by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Render(#[from] GenerationError),

    #[error("task body panicked or was cancelled: {0}")]
    Join(String),

    #[error("{0}")]
    Failed(String),
}
