//! Post-processing chain applied to rendered output before it is written.
//!
//! Stages run in registration order. A failing stage fails the whole chain;
//! the [`Renderer`](crate::Renderer) then logs a warning and writes the
//! unprocessed bytes.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use quill_core::PostProcessConfig;

#[derive(Debug, Error)]
#[error("post-processor `{processor}` failed for {path}: {message}")]
pub struct PostProcessError {
    pub processor: String,
    pub path: PathBuf,
    pub message: String,
}

impl PostProcessError {
    pub fn new(processor: impl Into<String>, path: &Path, message: impl Into<String>) -> Self {
        PostProcessError {
            processor: processor.into(),
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// One transformation from `(output path, bytes)` to bytes.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError>;
}

/// Ordered list of [`PostProcessor`]s.
#[derive(Default)]
pub struct PostProcessChain {
    processors: Vec<Box<dyn PostProcessor>>,
}

impl PostProcessChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in stages enabled in `config`.
    ///
    /// Order: line endings, trailing whitespace, header.
    pub fn from_config(config: &PostProcessConfig) -> Self {
        let mut chain = Self::new();
        if config.normalize_line_endings {
            chain.push(NormalizeLineEndings);
        }
        if config.trim_trailing_whitespace {
            chain.push(TrimTrailingWhitespace);
        }
        if let Some(header) = &config.header {
            chain.push(InsertHeader::new(header.clone()));
        }
        chain
    }

    pub fn push(&mut self, processor: impl PostProcessor + 'static) {
        self.processors.push(Box::new(processor));
    }

    /// Register a closure as a named stage.
    pub fn push_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Path, &[u8]) -> Result<Vec<u8>, PostProcessError> + Send + Sync + 'static,
    {
        self.push(FnProcessor {
            name: name.into(),
            f,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run every stage in order.
    pub fn apply(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        let mut current = content.to_vec();
        for processor in &self.processors {
            current = processor.process(path, &current)?;
        }
        Ok(current)
    }
}

impl fmt::Debug for PostProcessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

struct FnProcessor<F> {
    name: String,
    f: F,
}

impl<F> PostProcessor for FnProcessor<F>
where
    F: Fn(&Path, &[u8]) -> Result<Vec<u8>, PostProcessError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        (self.f)(path, content)
    }
}

// ---------------------------------------------------------------------------
// Built-in stages
// ---------------------------------------------------------------------------

/// Rewrites CRLF to LF.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeLineEndings;

impl PostProcessor for NormalizeLineEndings {
    fn name(&self) -> &str {
        "normalize_line_endings"
    }

    fn process(&self, _path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        let mut out = Vec::with_capacity(content.len());
        let mut iter = content.iter().peekable();
        while let Some(&b) = iter.next() {
            if b == b'\r' && iter.peek() == Some(&&b'\n') {
                continue;
            }
            out.push(b);
        }
        Ok(out)
    }
}

/// Strips trailing spaces and tabs from every line. Requires UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTrailingWhitespace;

impl PostProcessor for TrimTrailingWhitespace {
    fn name(&self) -> &str {
        "trim_trailing_whitespace"
    }

    fn process(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        let text = std::str::from_utf8(content)
            .map_err(|e| PostProcessError::new(self.name(), path, e.to_string()))?;
        let lines: Vec<String> = text
            .split('\n')
            .map(|line| match line.strip_suffix('\r') {
                Some(body) => format!("{}\r", body.trim_end_matches([' ', '\t'])),
                None => line.trim_end_matches([' ', '\t']).to_string(),
            })
            .collect();
        Ok(lines.join("\n").into_bytes())
    }
}

/// Prepends a comment header using the comment syntax of the file extension.
///
/// Files with an unknown extension pass through untouched; a file that
/// already starts with the header is left as-is.
#[derive(Debug, Clone)]
pub struct InsertHeader {
    text: String,
}

impl InsertHeader {
    pub fn new(text: impl Into<String>) -> Self {
        InsertHeader { text: text.into() }
    }

    fn comment_prefix(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let prefix = match ext.as_str() {
            "rs" | "go" | "js" | "jsx" | "ts" | "tsx" | "c" | "h" | "cc" | "cpp" | "hpp"
            | "java" | "kt" | "swift" | "cs" | "scala" | "dart" | "proto" => "//",
            "py" | "sh" | "bash" | "yaml" | "yml" | "toml" | "rb" | "pl" | "r" | "tf" => "#",
            "sql" | "lua" | "hs" => "--",
            _ => return None,
        };
        Some(prefix)
    }

    fn render(&self, prefix: &str) -> String {
        let mut header = String::new();
        for line in self.text.lines() {
            if line.is_empty() {
                header.push_str(prefix);
            } else {
                header.push_str(&format!("{prefix} {line}"));
            }
            header.push('\n');
        }
        header.push('\n');
        header
    }
}

impl PostProcessor for InsertHeader {
    fn name(&self) -> &str {
        "insert_header"
    }

    fn process(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PostProcessError> {
        let Some(prefix) = Self::comment_prefix(path) else {
            return Ok(content.to_vec());
        };
        let header = self.render(prefix);

        // Keep a shebang on the first line.
        let split = if content.starts_with(b"#!") {
            content
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| i + 1)
                .unwrap_or(content.len())
        } else {
            0
        };
        let (head, body) = content.split_at(split);
        if body.starts_with(header.as_bytes()) {
            return Ok(content.to_vec());
        }

        let mut out = Vec::with_capacity(content.len() + header.len() + 1);
        out.extend_from_slice(head);
        if !head.is_empty() && !head.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        Ok(out)
    }
}
