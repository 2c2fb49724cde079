//! Memoized, concurrency-safe template parse cache.
//!
//! Artifacts are keyed by `(tree identity, normalized path)`. The first
//! request for a key reads and parses the source; every later request for the
//! same key gets the same [`Arc<CompiledTemplate>`] back without touching the
//! tree. Concurrent first requests for one key still parse exactly once: the
//! read-lock fast path is followed by a re-check under the write lock before
//! any parse work starts.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tera::{Context, Tera};

use quill_core::tree::{normalize_path, SourceTree, TreeId};

use crate::error::CacheError;
use crate::functions::TemplateFunctions;

/// Composite cache key: source tree identity plus relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tree: TreeId,
    path: PathBuf,
}

impl CacheKey {
    pub fn new(tree: TreeId, path: &Path) -> Self {
        CacheKey {
            tree,
            path: normalize_path(path),
        }
    }

    pub fn tree(&self) -> TreeId {
        self.tree
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A parsed template, ready for repeated execution. Never mutated after parse.
pub struct CompiledTemplate {
    name: String,
    tera: Tera,
}

impl CompiledTemplate {
    fn parse(name: String, source: &str, functions: &TemplateFunctions) -> tera::Result<Self> {
        let mut tera = Tera::default();
        // Generated sources are not HTML; never escape.
        tera.autoescape_on(vec![]);
        functions.install(&mut tera);
        tera.add_raw_template(&name, source)?;
        Ok(CompiledTemplate { name, tera })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute against `ctx`.
    pub fn render(&self, ctx: &Context) -> tera::Result<String> {
        self.tera.render(&self.name, ctx)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Parse-once cache of [`CompiledTemplate`]s.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<CacheKey, Arc<CompiledTemplate>>>,
    functions: TemplateFunctions,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose artifacts all see `functions`.
    pub fn with_functions(functions: TemplateFunctions) -> Self {
        TemplateCache {
            entries: RwLock::new(HashMap::new()),
            functions,
        }
    }

    /// Fetch the artifact for `path` in `tree`, reading and parsing it on a miss.
    pub fn get(
        &self,
        tree: &dyn SourceTree,
        path: &Path,
    ) -> Result<Arc<CompiledTemplate>, CacheError> {
        let key = CacheKey::new(tree.id(), path);

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = entries.get(&key) {
                return Ok(Arc::clone(hit));
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = entries.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(self.load(tree, &key)?);
        tracing::debug!(tree = %key.tree, path = %key.path.display(), "template parsed");
        entries.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn load(&self, tree: &dyn SourceTree, key: &CacheKey) -> Result<CompiledTemplate, CacheError> {
        let read_err = |source| CacheError::Read {
            path: key.path.clone(),
            source,
        };
        let bytes = tree.read(&key.path).map_err(read_err)?;
        let source = String::from_utf8(bytes).map_err(|e| {
            read_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let name = key.path.to_string_lossy().replace('\\', "/");
        CompiledTemplate::parse(name, &source, &self.functions).map_err(|source| {
            CacheError::Parse {
                path: key.path.clone(),
                source,
            }
        })
    }

    /// Whether an artifact for `path` in `tree` is currently cached.
    pub fn contains(&self, tree: &dyn SourceTree, path: &Path) -> bool {
        let key = CacheKey::new(tree.id(), path);
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "template cache cleared");
    }
}
