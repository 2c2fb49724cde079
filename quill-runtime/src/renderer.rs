//! Concurrent renderer: render requests become [`RenderTask`]s on a
//! [`WorkerPool`], each delivering one [`TaskResult`] to its [`ResultHandle`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use quill_core::{EngineConfig, PoolConfig, SourceTree};
use quill_renderer::{Context, Renderer};

use crate::error::{AsyncError, TaskError};
use crate::pool::{WorkerPool, WorkerPoolStats};
use crate::task::{Task, TaskId, TaskResult};

/// Interval between stats samples in [`AsyncRenderer::wait_for_completion`].
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(10);

type Pending = Arc<RwLock<HashMap<TaskId, oneshot::Sender<TaskResult>>>>;

/// One template to render to one output path.
#[derive(Clone)]
pub struct RenderRequest {
    pub tree: Arc<dyn SourceTree>,
    pub template_path: PathBuf,
    /// Relative paths resolve under the renderer's output root.
    pub output_path: PathBuf,
    pub data: Arc<Context>,
}

impl RenderRequest {
    pub fn new(
        tree: Arc<dyn SourceTree>,
        template_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        data: Arc<Context>,
    ) -> Self {
        RenderRequest {
            tree,
            template_path: template_path.into(),
            output_path: output_path.into(),
            data,
        }
    }
}

/// Receives the single [`TaskResult`] of one submitted render.
#[derive(Debug)]
pub struct ResultHandle {
    task_id: TaskId,
    rx: oneshot::Receiver<TaskResult>,
}

impl ResultHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for the result. `None` means the task was lost to shutdown.
    pub async fn wait(self) -> Option<TaskResult> {
        self.rx.await.ok()
    }
}

fn unregister(pending: &Pending, id: TaskId) -> Option<oneshot::Sender<TaskResult>> {
    pending
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
}

/// Hand `result` to its handle without ever blocking.
///
/// Once shutdown has begun the delivery is abandoned; dropping the sender
/// closes the handle so nobody waits forever.
fn deliver(pending: &Pending, cancel: &CancellationToken, result: TaskResult) {
    let task_id = result.task_id;
    let sender = unregister(pending, task_id);
    if cancel.is_cancelled() {
        tracing::debug!(task_id = %task_id, "pool shutting down; result delivery abandoned");
        return;
    }
    match sender {
        Some(tx) => {
            if tx.send(result).is_err() {
                tracing::debug!(task_id = %task_id, "result handle dropped before delivery");
            }
        }
        None => tracing::debug!(task_id = %task_id, "no result handle registered"),
    }
}

/// Render-and-write unit of work.
struct RenderTask {
    id: TaskId,
    request: RenderRequest,
    renderer: Arc<Renderer>,
    pending: Pending,
}

#[async_trait]
impl Task for RenderTask {
    fn id(&self) -> TaskId {
        self.id
    }

    async fn execute(self: Box<Self>, cancel: CancellationToken) -> Result<(), TaskError> {
        let RenderTask {
            id,
            request,
            renderer,
            pending,
        } = *self;
        let started_at = Utc::now();
        let clock = Instant::now();

        let joined = tokio::task::spawn_blocking(move || {
            renderer.render_to_path(
                request.tree.as_ref(),
                &request.template_path,
                &request.output_path,
                &request.data,
            )
        })
        .await;
        let outcome = match joined {
            Ok(rendered) => rendered.map(|_| ()).map_err(TaskError::from),
            Err(err) => Err(TaskError::Join(err.to_string())),
        };

        let result = TaskResult::finish(id, started_at, clock, &outcome);
        deliver(&pending, &cancel, result);
        outcome
    }
}

/// Worker pool plus the synchronous [`Renderer`] as the task body.
pub struct AsyncRenderer {
    pool: WorkerPool,
    renderer: Arc<Renderer>,
    next_id: AtomicU64,
    pending: Pending,
}

impl AsyncRenderer {
    pub fn new(renderer: Arc<Renderer>, pool: &PoolConfig) -> Self {
        AsyncRenderer {
            pool: WorkerPool::new(pool),
            renderer,
            next_id: AtomicU64::new(1),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the renderer and the pool from one config.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Arc::new(Renderer::new(config)), &config.pool)
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    pub fn start(&self) -> Result<(), AsyncError> {
        self.pool.start()?;
        Ok(())
    }

    /// Stop the pool, then close every handle still waiting for a result.
    pub async fn stop(&self) {
        self.pool.stop().await;
        let closed = {
            let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
            let n = pending.len();
            pending.clear();
            n
        };
        if closed > 0 {
            tracing::info!(closed, "closed undelivered result handles");
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    /// Handles registered but not yet delivered.
    pub fn pending_handles(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Submit one render; see [`AsyncRenderer::submit`].
    pub fn render_async(
        &self,
        tree: Arc<dyn SourceTree>,
        template_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        data: Arc<Context>,
    ) -> Result<ResultHandle, AsyncError> {
        self.submit(RenderRequest::new(tree, template_path, output_path, data))
    }

    /// Queue `request` without blocking.
    ///
    /// If the pool rejects it the handle is discarded and the error returned.
    pub fn submit(&self, request: RenderRequest) -> Result<ResultHandle, AsyncError> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        let task = RenderTask {
            id,
            request,
            renderer: Arc::clone(&self.renderer),
            pending: Arc::clone(&self.pending),
        };
        if let Err(err) = self.pool.submit(Box::new(task)) {
            unregister(&self.pending, id);
            return Err(AsyncError::Submit(err));
        }
        tracing::debug!(task_id = %id, "render submitted");
        Ok(ResultHandle { task_id: id, rx })
    }

    /// Submit every request, then collect results in submission order.
    ///
    /// Requests the pool rejects are skipped. Results lost to a concurrent
    /// shutdown are missing from the output.
    pub async fn render_batch(
        &self,
        requests: Vec<RenderRequest>,
    ) -> Result<Vec<TaskResult>, AsyncError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if !self.pool.is_started() {
            return Err(AsyncError::NotStarted);
        }

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let template = request.template_path.clone();
            match self.submit(request) {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::debug!(
                    template = %template.display(),
                    error = %err,
                    "batch request skipped",
                ),
            }
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let id = handle.task_id();
            if let Some(result) = handle.wait().await {
                results.push(result);
            }
            unregister(&self.pending, id);
        }
        Ok(results)
    }

    /// Poll pool stats until nothing is queued or running.
    ///
    /// A task counts as queued or in flight from acceptance until its
    /// outcome is recorded, so an idle sample means every accepted task has
    /// run. Await individual handles when exact per-task acknowledgement
    /// matters.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Result<(), AsyncError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut ticker = tokio::time::interval(COMPLETION_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let stats = self.pool.stats();
            if stats.in_flight == 0 && stats.queue_depth == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AsyncError::CompletionTimeout(timeout));
            }
        }
    }
}
