//! Concurrent rendering runtime: a bounded [`WorkerPool`] and the
//! [`AsyncRenderer`] that fans render requests out over it.

pub mod error;
pub mod pool;
pub mod renderer;
pub mod task;

pub use error::{AsyncError, PoolError, TaskError};
pub use pool::{WorkerPool, WorkerPoolStats};
pub use renderer::{AsyncRenderer, RenderRequest, ResultHandle, COMPLETION_POLL_INTERVAL};
pub use task::{FnTask, Task, TaskId, TaskResult};
