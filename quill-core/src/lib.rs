//! Quill core library: errors, failure modes, source trees and config.
//!
//! - [`error`]: [`GenerationError`], [`MultiError`], [`EngineError`], [`ConfigError`]
//! - [`types`]: [`FailureMode`]
//! - [`tree`]: the [`SourceTree`] collaborator and its disk/memory implementations
//! - [`config`]: [`EngineConfig`] loaded from YAML

pub mod config;
pub mod error;
pub mod tree;
pub mod types;

pub use config::{EngineConfig, PoolConfig, PostProcessConfig};
pub use error::{ConfigError, EngineError, GenerationError, GenerationErrorKind, MultiError};
pub use tree::{DirTree, MemoryTree, SourceTree, TreeEntry, TreeId};
pub use types::FailureMode;
