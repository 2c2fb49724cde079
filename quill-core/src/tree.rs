//! Source trees — read-only, path-keyed collections of template sources.
//!
//! Every tree carries a [`TreeId`] that is stable for the lifetime of the
//! tree and distinct from every other tree in the process. Paths handed to a
//! tree are relative to its root; `""` and `"."` name the root itself.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token distinguishing one source tree from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    /// Allocate a fresh, process-unique identity.
    pub fn next() -> Self {
        TreeId(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree#{}", self.0)
    }
}

/// One child returned by [`SourceTree::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the tree root.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// A byte-addressable, path-keyed, read-only tree.
pub trait SourceTree: Send + Sync {
    fn id(&self) -> TreeId;

    /// Read the full content stored at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// List the direct children of `path`, sorted by path.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<TreeEntry>>;
}

/// Strip `.` components so `"./a/b"`, `"a/./b"` and `"a/b"` compare equal.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn reject_escape(path: &Path) -> io::Result<()> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path escapes the source tree: {}", path.display()),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DirTree
// ---------------------------------------------------------------------------

/// A tree backed by a directory on disk.
#[derive(Debug)]
pub struct DirTree {
    id: TreeId,
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirTree {
            id: TreeId::next(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        reject_escape(path)?;
        Ok(self.root.join(normalize_path(path)))
    }
}

impl SourceTree for DirTree {
    fn id(&self) -> TreeId {
        self.id
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path)?)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<TreeEntry>> {
        let rel = normalize_path(path);
        let dir = self.resolve(&rel)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            entries.push(TreeEntry {
                path: rel.join(entry.file_name()),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// MemoryTree
// ---------------------------------------------------------------------------

/// An in-memory tree, for embedded templates and tests.
#[derive(Debug)]
pub struct MemoryTree {
    id: TreeId,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        MemoryTree {
            id: TreeId::next(),
            files: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files
            .insert(normalize_path(path.as_ref()), content.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceTree for MemoryTree {
    fn id(&self) -> TreeId {
        self.id
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        reject_escape(path)?;
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such file: {}", path.display()),
                )
            })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<TreeEntry>> {
        reject_escape(path)?;
        let dir = normalize_path(path);
        if self.files.contains_key(&dir) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            ));
        }

        // name -> is_dir; BTreeMap keeps the listing sorted.
        let mut children: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for file in self.files.keys() {
            let Ok(rest) = file.strip_prefix(&dir) else { continue };
            let mut components = rest.components();
            let Some(first) = components.next() else { continue };
            let is_dir = components.next().is_some();
            let child = dir.join(first.as_os_str());
            let entry = children.entry(child).or_insert(is_dir);
            *entry |= is_dir;
        }

        if children.is_empty() && !dir.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {}", path.display()),
            ));
        }

        Ok(children
            .into_iter()
            .map(|(path, is_dir)| TreeEntry { path, is_dir })
            .collect())
    }
}
