//! Atomic output writer.
//!
//! 1. Compare with the bytes already on disk → skip if identical.
//! 2. Ensure the parent directory exists.
//! 3. Write to a uniquely named `.<name>.XXXXXX.quill.tmp` sibling.
//! 4. Rename it over the final path (atomic on POSIX). A temp file that is
//!    never persisted is removed when dropped.
//!
//! Concurrent writers to one path each get their own temp file; the last
//! rename wins.

use std::io::Write;
use std::path::{Path, PathBuf};

use quill_core::{GenerationError, GenerationErrorKind};

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped; content on disk already matches.
    Unchanged { path: PathBuf },
}

impl WriteOutcome {
    pub fn path(&self) -> &Path {
        match self {
            WriteOutcome::Written { path } | WriteOutcome::Unchanged { path } => path,
        }
    }
}

const TMP_SUFFIX: &str = ".quill.tmp";

fn write_err(path: &Path, source: std::io::Error) -> GenerationError {
    GenerationError::new(path, GenerationErrorKind::Write, source.to_string()).with_cause(source)
}

/// Atomically write `content` to `path`.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<WriteOutcome, GenerationError> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == content {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(WriteOutcome::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| write_err(path, e))?;
    let written = tmp.write_all(content).and_then(|()| tmp.flush());
    written.map_err(|e| write_err(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| write_err(path, e.error))?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "wrote");
    Ok(WriteOutcome::Written {
        path: path.to_path_buf(),
    })
}
