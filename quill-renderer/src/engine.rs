//! Synchronous directory renderer.
//!
//! For each template the render step is: fetch-or-parse from the
//! [`TemplateCache`], execute against the data, run the post-processing chain
//! (best-effort), then atomically write the bytes.
//!
//! # Failure modes
//!
//! | Mode        | On a file or traversal error | End of run                       |
//! |-------------|------------------------------|----------------------------------|
//! | FailFast    | abort the walk               | the first error                  |
//! | FailAtEnd   | record, continue             | [`MultiError`] if anything failed|
//! | BestEffort  | record, continue             | `Ok`, failures in the summary    |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tera::Context;

use quill_core::{
    EngineConfig, EngineError, FailureMode, GenerationError, GenerationErrorKind, MultiError,
    SourceTree,
};

use crate::cache::TemplateCache;
use crate::error::error_chain;
use crate::functions::TemplateFunctions;
use crate::postprocess::{PostProcessChain, PostProcessor};
use crate::writer::{atomic_write, WriteOutcome};

/// What a directory render did.
#[derive(Debug, Default)]
pub struct RenderSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Entries that were not templates.
    pub skipped: usize,
    /// Failures recorded under BestEffort. Always empty for other modes.
    pub failures: MultiError,
}

impl RenderSummary {
    /// Number of templates rendered successfully.
    pub fn rendered(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }

    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written { path } => self.written.push(path),
            WriteOutcome::Unchanged { path } => self.unchanged.push(path),
        }
    }
}

/// Walk state for one `render_dir` call.
struct DirRun {
    mode: FailureMode,
    summary: RenderSummary,
}

impl DirRun {
    /// Apply the failure mode to one error. `Err` aborts the walk.
    fn fail(&mut self, err: GenerationError) -> Result<(), GenerationError> {
        match self.mode {
            FailureMode::FailFast => Err(err),
            FailureMode::FailAtEnd | FailureMode::BestEffort => {
                tracing::warn!(
                    path = %err.path.display(),
                    kind = %err.kind,
                    mode = %self.mode,
                    error = %err.message,
                    "generation failed; continuing",
                );
                self.summary.failures.push(err);
                Ok(())
            }
        }
    }
}

/// Renders template trees into an output root.
///
/// Create once and reuse; the cache is shared with any [`Renderer`] built
/// from the same `Arc<TemplateCache>`.
pub struct Renderer {
    cache: Arc<TemplateCache>,
    post: PostProcessChain,
    output_root: PathBuf,
    template_suffix: String,
    failure_mode: FailureMode,
}

impl Renderer {
    /// Renderer with a fresh cache carrying the standard template functions.
    pub fn new(config: &EngineConfig) -> Self {
        let cache = Arc::new(TemplateCache::with_functions(TemplateFunctions::standard()));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: &EngineConfig, cache: Arc<TemplateCache>) -> Self {
        Renderer {
            cache,
            post: PostProcessChain::from_config(&config.post_process),
            output_root: config.output_root.clone(),
            template_suffix: config.template_suffix.clone(),
            failure_mode: config.failure_mode,
        }
    }

    /// Append a stage to the post-processing chain.
    pub fn with_post_processor(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.post.push(processor);
        self
    }

    pub fn with_post_chain(mut self, chain: PostProcessChain) -> Self {
        self.post = chain;
        self
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn template_suffix(&self) -> &str {
        &self.template_suffix
    }

    /// Whether `path` names a template source.
    pub fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.len() > self.template_suffix.len() && n.ends_with(&self.template_suffix))
            .unwrap_or(false)
    }

    /// Output location for a template: suffix stripped, under the output root.
    pub fn output_path_for(&self, template_path: &Path) -> PathBuf {
        self.output_root.join(self.relative_output_for(template_path))
    }

    /// Tree-relative output path: the template path minus its suffix.
    pub fn relative_output_for(&self, template_path: &Path) -> PathBuf {
        let rel = quill_core::tree::normalize_path(template_path);
        let stripped = rel
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(self.template_suffix.as_str()));
        match stripped {
            Some(name) => rel.with_file_name(name),
            None => rel,
        }
    }

    /// Relative paths land under the output root; absolute ones are kept.
    pub fn resolve_output(&self, output_path: &Path) -> PathBuf {
        if output_path.is_absolute() {
            output_path.to_path_buf()
        } else {
            self.output_root.join(output_path)
        }
    }

    /// Execute a template and run post-processing, without writing.
    pub fn render_bytes(
        &self,
        tree: &dyn SourceTree,
        template_path: &Path,
        output_path: &Path,
        data: &Context,
    ) -> Result<Vec<u8>, GenerationError> {
        let template = self.cache.get(tree, template_path)?;
        let rendered = template.render(data).map_err(|e| {
            GenerationError::new(template_path, GenerationErrorKind::Execute, error_chain(&e))
                .with_cause(e)
        })?;
        let raw = rendered.into_bytes();

        if self.post.is_empty() {
            return Ok(raw);
        }
        match self.post.apply(output_path, &raw) {
            Ok(processed) => Ok(processed),
            Err(err) => {
                tracing::warn!(
                    path = %output_path.display(),
                    error = %err,
                    "post-processing failed; writing unprocessed output",
                );
                Ok(raw)
            }
        }
    }

    /// Render `template_path` and write it to `output_path`.
    pub fn render_to_path(
        &self,
        tree: &dyn SourceTree,
        template_path: &Path,
        output_path: &Path,
        data: &Context,
    ) -> Result<WriteOutcome, GenerationError> {
        let output = self.resolve_output(output_path);
        let bytes = self.render_bytes(tree, template_path, &output, data)?;
        atomic_write(&output, &bytes)
    }

    /// Render `template_path` to its derived output path.
    pub fn render_file(
        &self,
        tree: &dyn SourceTree,
        template_path: &Path,
        data: &Context,
    ) -> Result<WriteOutcome, GenerationError> {
        let output = self.output_path_for(template_path);
        self.render_to_path(tree, template_path, &output, data)
    }

    /// Render every template under `dir` in deterministic walk order.
    pub fn render_dir(
        &self,
        tree: &dyn SourceTree,
        dir: &Path,
        data: &Context,
    ) -> Result<RenderSummary, EngineError> {
        let mut run = DirRun {
            mode: self.failure_mode,
            summary: RenderSummary::default(),
        };

        if let Err(err) = self.walk(tree, dir, data, &mut run) {
            tracing::error!(path = %err.path.display(), error = %err.message, "generation aborted");
            return Err(EngineError::Generation(err));
        }

        let summary = run.summary;
        tracing::info!(
            written = summary.written.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failures.len(),
            mode = %self.failure_mode,
            "render complete",
        );

        if self.failure_mode == FailureMode::FailAtEnd && !summary.failures.is_empty() {
            return Err(EngineError::Multi(summary.failures));
        }
        Ok(summary)
    }

    fn walk(
        &self,
        tree: &dyn SourceTree,
        dir: &Path,
        data: &Context,
        run: &mut DirRun,
    ) -> Result<(), GenerationError> {
        let entries = match tree.read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                let err = GenerationError::new(dir, GenerationErrorKind::Traverse, e.to_string())
                    .with_cause(e);
                return run.fail(err);
            }
        };

        for entry in entries {
            if entry.is_dir {
                self.walk(tree, &entry.path, data, run)?;
                continue;
            }
            if !self.is_template(&entry.path) {
                run.summary.skipped += 1;
                continue;
            }
            match self.render_file(tree, &entry.path, data) {
                Ok(outcome) => run.summary.record(outcome),
                Err(err) => run.fail(err)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::MemoryTree;
    use tempfile::TempDir;

    fn renderer(root: &Path) -> Renderer {
        Renderer::new(&EngineConfig::default().with_output_root(root))
    }

    #[test]
    fn is_template_requires_suffix_and_a_name() {
        let r = renderer(Path::new("/out"));
        assert!(r.is_template(Path::new("a/b.rs.tera")));
        assert!(!r.is_template(Path::new("a/b.rs")));
        assert!(!r.is_template(Path::new(".tera")));
    }

    #[test]
    fn output_path_strips_suffix_under_root() {
        let r = renderer(Path::new("/out"));
        assert_eq!(
            r.output_path_for(Path::new("./models/user.rs.tera")),
            PathBuf::from("/out/models/user.rs")
        );
        assert_eq!(
            r.relative_output_for(Path::new("models/user.rs.tera")),
            PathBuf::from("models/user.rs")
        );
    }

    #[test]
    fn resolve_output_keeps_absolute_paths() {
        let r = renderer(Path::new("/out"));
        assert_eq!(r.resolve_output(Path::new("x.rs")), PathBuf::from("/out/x.rs"));
        assert_eq!(r.resolve_output(Path::new("/abs/x.rs")), PathBuf::from("/abs/x.rs"));
    }

    #[test]
    fn execution_failure_is_typed() {
        let tmp = TempDir::new().unwrap();
        let tree = MemoryTree::new().with_file("a.rs.tera", "{{ missing_field }}");
        let err = renderer(tmp.path())
            .render_file(&tree, Path::new("a.rs.tera"), &Context::new())
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Execute);
        assert_eq!(err.path, PathBuf::from("a.rs.tera"));
        assert!(err.message.contains("missing_field"), "got: {}", err.message);
    }

    #[test]
    fn render_file_uses_standard_filters() {
        let tmp = TempDir::new().unwrap();
        let tree = MemoryTree::new().with_file("model.rs.tera", "struct {{ name | pascal_case }};");
        let mut ctx = Context::new();
        ctx.insert("name", "order_line");
        let outcome = renderer(tmp.path())
            .render_file(&tree, Path::new("model.rs.tera"), &ctx)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(outcome.path()).unwrap(),
            "struct OrderLine;"
        );
    }

    #[test]
    fn missing_directory_is_traverse_error() {
        let tmp = TempDir::new().unwrap();
        let tree = MemoryTree::new().with_file("a.rs.tera", "a");
        let err = renderer(tmp.path())
            .render_dir(&tree, Path::new("nope"), &Context::new())
            .unwrap_err();
        match err {
            EngineError::Generation(e) => assert_eq!(e.kind, GenerationErrorKind::Traverse),
            other => panic!("expected single error, got {other}"),
        }
    }
}
