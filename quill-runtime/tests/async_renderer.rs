//! End-to-end behavior of the asynchronous renderer over a real worker pool.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_core::{EngineConfig, MemoryTree, PoolConfig, SourceTree, TreeEntry, TreeId};
use quill_renderer::{Context, PostProcessError, PostProcessor, Renderer};
use quill_runtime::{AsyncError, AsyncRenderer, PoolError, RenderRequest};
use tempfile::TempDir;

/// Delays reads of one path so its render finishes last.
struct SlowTree {
    inner: MemoryTree,
    slow: PathBuf,
    delay: Duration,
}

impl SourceTree for SlowTree {
    fn id(&self) -> TreeId {
        self.inner.id()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if path == self.slow {
            std::thread::sleep(self.delay);
        }
        self.inner.read(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<TreeEntry>> {
        self.inner.read_dir(path)
    }
}

fn slow_tree(delay: Duration) -> Arc<dyn SourceTree> {
    Arc::new(SlowTree {
        inner: MemoryTree::new()
            .with_file("slow.txt.tera", "slow {{ n }}")
            .with_file("fast.txt.tera", "fast {{ n }}"),
        slow: PathBuf::from("slow.txt.tera"),
        delay,
    })
}

fn data() -> Arc<Context> {
    let mut ctx = Context::new();
    ctx.insert("n", &1);
    Arc::new(ctx)
}

fn async_renderer(out: &Path, workers: usize) -> AsyncRenderer {
    let config = EngineConfig {
        pool: PoolConfig::with_workers(workers),
        ..EngineConfig::default().with_output_root(out)
    };
    AsyncRenderer::from_config(&config)
}

/// Sleeps before passing through output bound for `slow.txt`.
struct SlowStage(Duration);

impl PostProcessor for SlowStage {
    fn name(&self) -> &str {
        "slow-stage"
    }

    fn process(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        if path.ends_with("slow.txt") {
            std::thread::sleep(self.0);
        }
        Ok(content.to_vec())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_results_follow_submission_order() {
    let out = TempDir::new().unwrap();
    let config = EngineConfig::default().with_output_root(out.path());
    let renderer =
        Renderer::new(&config).with_post_processor(SlowStage(Duration::from_millis(150)));
    let r = AsyncRenderer::new(Arc::new(renderer), &PoolConfig::with_workers(2));
    r.start().unwrap();

    let tree = slow_tree(Duration::ZERO);
    let requests = vec![
        RenderRequest::new(Arc::clone(&tree), "slow.txt.tera", "slow.txt", data()),
        RenderRequest::new(Arc::clone(&tree), "fast.txt.tera", "fast.txt", data()),
    ];
    let results = r.render_batch(requests).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].task_id < results[1].task_id);
    assert!(results.iter().all(|res| res.success));
    assert!(results[0].duration >= Duration::from_millis(150));
    assert!(results[0].finished_at > results[1].finished_at);
    assert_eq!(
        std::fs::read_to_string(out.path().join("slow.txt")).unwrap(),
        "slow 1"
    );
    assert_eq!(r.pending_handles(), 0);
    r.stop().await;
}

#[tokio::test]
async fn full_queue_rejects_and_discards_handle() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 1);
    let tree: Arc<dyn SourceTree> = Arc::new(MemoryTree::new().with_file("a.tera", "a"));

    r.render_async(Arc::clone(&tree), "a.tera", "1", data()).unwrap();
    r.render_async(Arc::clone(&tree), "a.tera", "2", data()).unwrap();
    let err = r
        .render_async(Arc::clone(&tree), "a.tera", "3", data())
        .unwrap_err();

    assert!(matches!(err, AsyncError::Submit(PoolError::QueueFull)));
    assert_eq!(r.pending_handles(), 2);
    r.stop().await;
}

#[tokio::test]
async fn stop_closes_handles_of_queued_tasks() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 1);
    let tree: Arc<dyn SourceTree> = Arc::new(MemoryTree::new().with_file("a.tera", "a"));

    let handle = r.render_async(tree, "a.tera", "a", data()).unwrap();
    r.stop().await;

    let waited = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("handle must not hang after stop");
    assert!(waited.is_none());
    assert_eq!(r.pending_handles(), 0);
    assert!(!out.path().join("a").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_for_completion_observes_idle_pool() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 2);
    r.start().unwrap();

    let tree = slow_tree(Duration::from_millis(20));
    let _a = r.render_async(Arc::clone(&tree), "slow.txt.tera", "a.txt", data()).unwrap();
    let _b = r.render_async(Arc::clone(&tree), "fast.txt.tera", "b.txt", data()).unwrap();

    r.wait_for_completion(Duration::from_secs(5)).await.unwrap();
    let stats = r.stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.in_flight, 0);
    assert!(out.path().join("a.txt").exists());
    r.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_for_completion_times_out_on_slow_work() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 1);
    r.start().unwrap();

    let tree = slow_tree(Duration::from_millis(400));
    let _slow = r.render_async(tree, "slow.txt.tera", "slow.txt", data()).unwrap();

    let timeout = Duration::from_millis(50);
    let err = r.wait_for_completion(timeout).await.unwrap_err();
    assert!(matches!(err, AsyncError::CompletionTimeout(t) if t == timeout));
    r.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_cache_parses_each_template_once_across_tasks() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 2);
    r.start().unwrap();

    let tree: Arc<dyn SourceTree> =
        Arc::new(MemoryTree::new().with_file("shared.tera", "{{ n }}"));
    let requests = (0..4)
        .map(|i| RenderRequest::new(Arc::clone(&tree), "shared.tera", format!("out{i}"), data()))
        .collect();
    let results = r.render_batch(requests).await.unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(r.renderer().cache().len(), 1);
    r.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renders_to_one_output_all_succeed() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 4);
    r.start().unwrap();
    let tree: Arc<dyn SourceTree> = Arc::new(MemoryTree::new().with_file("same.tera", "{{ n }}"));

    for round in 0..10 {
        let requests = (0..8)
            .map(|i| {
                let mut ctx = Context::new();
                ctx.insert("n", &(round * 8 + i));
                RenderRequest::new(Arc::clone(&tree), "same.tera", "same.txt", Arc::new(ctx))
            })
            .collect();
        let results = r.render_batch(requests).await.unwrap();
        assert_eq!(results.len(), 8);
        for result in &results {
            assert!(result.success, "round {round}: {:?}", result.error);
        }
    }
    let leftovers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name != "same.txt")
        .collect();
    assert!(leftovers.is_empty(), "stray files: {leftovers:?}");
    r.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_render_abandons_delivery() {
    let out = TempDir::new().unwrap();
    let r = async_renderer(out.path(), 1);
    r.start().unwrap();

    let tree = slow_tree(Duration::from_millis(300));
    let handle = r
        .render_async(tree, "slow.txt.tera", "slow.txt", data())
        .unwrap();
    for _ in 0..200 {
        if r.stats().in_flight == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(r.stats().in_flight, 1, "render should be running");

    tokio::time::timeout(Duration::from_secs(5), r.stop())
        .await
        .expect("stop returns once the running render finishes");

    assert_eq!(r.stats().completed, 1, "the running render still finishes");
    assert!(out.path().join("slow.txt").exists());
    let waited = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("handle must not hang after stop");
    assert!(waited.is_none(), "delivery after shutdown is abandoned");
    assert_eq!(r.pending_handles(), 0);
}
