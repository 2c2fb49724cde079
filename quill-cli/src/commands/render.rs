//! `quill render` — render a template directory, synchronously or over the
//! worker pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;

use quill_core::{DirTree, EngineConfig, EngineError, FailureMode, SourceTree};
use quill_renderer::{Context, RenderSummary, Renderer};
use quill_runtime::{AsyncRenderer, RenderRequest, TaskId, TaskResult};

/// Arguments for `quill render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Directory holding the templates.
    pub templates: PathBuf,

    /// Output root (overrides `output_root` from the config file).
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// YAML or JSON mapping exposed to every template.
    #[arg(long, short)]
    pub data: Option<PathBuf>,

    /// Engine config file (YAML).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Failure handling: fail-fast, fail-at-end or best-effort.
    #[arg(long)]
    pub mode: Option<FailureMode>,

    /// Render through the worker pool.
    #[arg(long = "async")]
    pub concurrent: bool,

    /// Worker count for `--async` (0 = available parallelism).
    #[arg(long, requires = "concurrent")]
    pub workers: Option<usize>,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let data = match &self.data {
            Some(path) => load_data(path)?,
            None => Context::new(),
        };
        let tree = DirTree::new(&self.templates);

        if self.concurrent {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(render_concurrent(&config, Arc::new(tree), Arc::new(data)))
        } else {
            render_sequential(&config, &tree, &data)
        }
    }

    fn load_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(out) = &self.out {
            config.output_root = out.clone();
        }
        if let Some(mode) = self.mode {
            config.failure_mode = mode;
        }
        if let Some(workers) = self.workers {
            config.pool.workers = Some(workers);
        }
        Ok(config)
    }
}

/// Read a YAML or JSON data file. The top level must be a mapping.
fn load_data(path: &Path) -> Result<Context> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let value: serde_json::Value = if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid YAML in {}", path.display()))?
    };
    if value.is_null() {
        return Ok(Context::new());
    }
    if !value.is_object() {
        bail!("data file {} must contain a mapping", path.display());
    }
    Context::from_value(value)
        .with_context(|| format!("unusable data in {}", path.display()))
}

fn render_sequential(config: &EngineConfig, tree: &DirTree, data: &Context) -> Result<()> {
    let renderer = Renderer::new(config);
    match renderer.render_dir(tree, Path::new(""), data) {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(EngineError::Multi(errors)) => {
            for err in &errors {
                eprintln!("  ✗  {err}");
            }
            bail!("{} template(s) failed", errors.len())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_summary(summary: &RenderSummary) {
    println!(
        "✓ rendered ({} written, {} unchanged, {} failed)",
        summary.written.len(),
        summary.unchanged.len(),
        summary.failures.len()
    );
    for path in &summary.written {
        println!("  ✎  {}", path.display());
    }
    for path in &summary.unchanged {
        println!("  ·  {}", path.display());
    }
    for err in &summary.failures {
        println!("  ✗  {err}");
    }
}

async fn render_concurrent(
    config: &EngineConfig,
    tree: Arc<DirTree>,
    data: Arc<Context>,
) -> Result<()> {
    let renderer = AsyncRenderer::from_config(config);
    let mut templates = Vec::new();
    collect_templates(tree.as_ref(), Path::new(""), renderer.renderer(), &mut templates)
        .with_context(|| format!("failed to list {}", tree.root().display()))?;

    renderer.start()?;
    let source: Arc<dyn SourceTree> = tree;
    let chunk = renderer.stats().queue_capacity.max(1);
    let mut origins: HashMap<TaskId, PathBuf> = HashMap::with_capacity(templates.len());
    let mut results: Vec<TaskResult> = Vec::with_capacity(templates.len());
    let mut lost = 0usize;
    for batch in templates.chunks(chunk) {
        // Chunks never exceed the queue, so submission does not overflow it.
        let mut handles = Vec::with_capacity(batch.len());
        for template in batch {
            let request = RenderRequest::new(
                Arc::clone(&source),
                template.clone(),
                renderer.renderer().relative_output_for(template),
                Arc::clone(&data),
            );
            let handle = renderer
                .submit(request)
                .with_context(|| format!("failed to queue {}", template.display()))?;
            origins.insert(handle.task_id(), template.clone());
            handles.push(handle);
        }
        for handle in handles {
            let task_id = handle.task_id();
            match handle.wait().await {
                Some(result) => results.push(result),
                None => {
                    tracing::warn!(task_id = %task_id, "render result lost to shutdown");
                    lost += 1;
                }
            }
        }
        if config.failure_mode == FailureMode::FailFast && results.iter().any(|r| !r.success) {
            tracing::info!("stopping after first failure");
            break;
        }
    }
    renderer.stop().await;

    let rendered = results.iter().filter(|r| r.success).count();
    let failed = results.len() - rendered + lost;
    tracing::info!(
        templates = templates.len(),
        rendered,
        failed,
        "concurrent render complete",
    );
    println!(
        "✓ rendered {rendered} of {} template(s) ({failed} failed)",
        templates.len()
    );
    for result in &results {
        let template = origins
            .get(&result.task_id)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| result.task_id.to_string());
        match &result.error {
            None => println!("  ✎  {template} ({} ms)", result.duration.as_millis()),
            Some(err) => println!("  ✗  {err}"),
        }
    }

    if failed > 0 && config.failure_mode != FailureMode::BestEffort {
        bail!("{failed} template(s) failed");
    }
    Ok(())
}

/// Depth-first list of template paths in walk order.
fn collect_templates(
    tree: &dyn SourceTree,
    dir: &Path,
    renderer: &Renderer,
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in tree.read_dir(dir)? {
        if entry.is_dir {
            collect_templates(tree, &entry.path, renderer, out)?;
        } else if renderer.is_template(&entry.path) {
            out.push(entry.path);
        }
    }
    Ok(())
}
