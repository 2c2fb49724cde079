//! Engine configuration, loaded from YAML.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```yaml
//! output_root: generated
//! template_suffix: .tera
//! failure_mode: fail-at-end
//! post_process:
//!   normalize_line_endings: true
//!   trim_trailing_whitespace: true
//!   header: "Code generated by quill. DO NOT EDIT."
//! pool:
//!   workers: 4
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::FailureMode;

pub const DEFAULT_TEMPLATE_SUFFIX: &str = ".tera";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory rendered files are written under.
    pub output_root: PathBuf,
    /// Only sources whose name ends with this suffix are rendered.
    pub template_suffix: String,
    pub failure_mode: FailureMode,
    pub post_process: PostProcessConfig,
    pub pool: PoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            output_root: PathBuf::from("."),
            template_suffix: DEFAULT_TEMPLATE_SUFFIX.to_string(),
            failure_mode: FailureMode::default(),
            post_process: PostProcessConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parse config from an in-memory YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, Path::new("<inline>"))
    }

    fn parse(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

/// Which built-in post-processors run after rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Rewrite CRLF line endings to LF.
    pub normalize_line_endings: bool,
    /// Strip trailing spaces and tabs from every line.
    pub trim_trailing_whitespace: bool,
    /// Comment header prepended to files with a known comment syntax.
    pub header: Option<String>,
}

impl PostProcessConfig {
    pub fn is_empty(&self) -> bool {
        !self.normalize_line_endings && !self.trim_trailing_whitespace && self.header.is_none()
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker count; `None` or `0` means the host's available parallelism.
    pub workers: Option<usize>,
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        PoolConfig {
            workers: Some(workers),
        }
    }

    pub fn resolved_workers(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// The task queue holds twice as many tasks as there are workers.
    pub fn queue_capacity(&self) -> usize {
        self.resolved_workers() * 2
    }
}
