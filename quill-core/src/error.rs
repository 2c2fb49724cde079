//! Error types for quill-core.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Boxed underlying cause attached to a [`GenerationError`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which stage of a single-file render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationErrorKind {
    /// Template source could not be read.
    Read,
    /// Template source is syntactically malformed.
    Parse,
    /// Template failed while executing against the supplied data.
    Execute,
    /// Rendered output could not be written.
    Write,
    /// A directory in the source tree could not be listed.
    Traverse,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GenerationErrorKind::Read => "read",
            GenerationErrorKind::Parse => "parse",
            GenerationErrorKind::Execute => "execute",
            GenerationErrorKind::Write => "write",
            GenerationErrorKind::Traverse => "traverse",
        };
        f.write_str(s)
    }
}

/// A failure tied to one path of a generation run.
#[derive(Debug, Error)]
#[error("{kind} failed for {}: {message}", .path.display())]
pub struct GenerationError {
    pub path: PathBuf,
    pub kind: GenerationErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Cause>,
}

impl GenerationError {
    pub fn new(
        path: impl Into<PathBuf>,
        kind: GenerationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        GenerationError {
            path: path.into(),
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }
}

/// Ordered, append-only collection of [`GenerationError`]s.
///
/// Errors keep their discovery order and full detail (path, message, cause).
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<GenerationError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: GenerationError) {
        self.errors.push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenerationError> {
        self.errors.iter()
    }

    /// Paths of every failure, in discovery order.
    pub fn paths(&self) -> Vec<&Path> {
        self.errors.iter().map(|e| e.path.as_path()).collect()
    }

    pub fn into_inner(self) -> Vec<GenerationError> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) failed to generate", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<Vec<GenerationError>> for MultiError {
    fn from(errors: Vec<GenerationError>) -> Self {
        MultiError { errors }
    }
}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a GenerationError;
    type IntoIter = std::slice::Iter<'a, GenerationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Error returned from a directory render.
#[derive(Debug, Error)]
pub enum EngineError {
    /// FailFast: the first failure aborted the walk.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// FailAtEnd: every failure recorded during the walk.
    #[error(transparent)]
    Multi(#[from] MultiError),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
