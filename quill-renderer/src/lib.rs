//! # quill-renderer
//!
//! Tera-based directory renderer: a parse-once [`TemplateCache`], an optional
//! [`PostProcessChain`], atomic writes, and failure-mode aware traversal.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use quill_core::{DirTree, EngineConfig, FailureMode};
//! use quill_renderer::{Context, Renderer};
//!
//! let config = EngineConfig::default()
//!     .with_output_root("generated")
//!     .with_failure_mode(FailureMode::FailAtEnd);
//! let renderer = Renderer::new(&config);
//! let tree = DirTree::new("templates");
//! let mut data = Context::new();
//! data.insert("service", "billing");
//! match renderer.render_dir(&tree, Path::new(""), &data) {
//!     Ok(summary) => println!("{} files rendered", summary.rendered()),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod functions;
pub mod postprocess;
pub mod writer;

pub use cache::{CacheKey, CompiledTemplate, TemplateCache};
pub use engine::{RenderSummary, Renderer};
pub use error::CacheError;
pub use functions::TemplateFunctions;
pub use postprocess::{
    InsertHeader, NormalizeLineEndings, PostProcessChain, PostProcessError, PostProcessor,
    TrimTrailingWhitespace,
};
pub use tera::Context;
pub use writer::WriteOutcome;
