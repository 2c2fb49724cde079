//! Error types for quill-renderer.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use quill_core::{GenerationError, GenerationErrorKind};

/// Failures from [`crate::cache::TemplateCache::get`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Source content could not be read from the tree.
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source content is not a valid template.
    #[error("failed to parse template {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: tera::Error,
    },
}

impl From<CacheError> for GenerationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Read { path, source } => {
                GenerationError::new(path, GenerationErrorKind::Read, source.to_string())
                    .with_cause(source)
            }
            CacheError::Parse { path, source } => {
                GenerationError::new(path, GenerationErrorKind::Parse, error_chain(&source))
                    .with_cause(source)
            }
        }
    }
}

/// Flatten an error and its sources into one line.
///
/// Tera keeps the useful detail (line, column, missing variable) in the
/// source chain rather than the top-level message.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        let text = source.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        current = source.source();
    }
    out
}
