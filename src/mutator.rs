// File mutator: in-memory snapshot of the target source plus the two
// on-disk operations, writing one mutated variant and restoring the original.
// No file handle outlives a single call.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Substring that identifies the thread-count declaration by default.
pub const DEFAULT_THREAD_DEFINE: &str = "#define NUM_THREADS";

/// Original content of the target file, captured once before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    raw: String,
    lines: Vec<String>,
}

impl SourceSnapshot {
    /// Read `path` and split it into lines. A trailing newline does not
    /// produce an extra empty line; `\r` is kept as part of the line.
    pub fn capture(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::from_text(raw))
    }

    pub fn from_text(raw: String) -> Self {
        let body = raw.strip_suffix('\n').unwrap_or(&raw);
        let lines = if raw.is_empty() {
            Vec::new()
        } else {
            body.split('\n').map(str::to_owned).collect()
        };
        Self { raw, lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn has_declaration(&self, thread_define: &str) -> bool {
        self.lines.iter().any(|l| l.contains(thread_define))
    }

    /// Text of the variant with `directive` inserted before `target_line`
    /// (1-indexed) and every thread declaration set to `threads`.
    pub fn render(
        &self,
        thread_define: &str,
        threads: usize,
        target_line: usize,
        directive: &str,
    ) -> String {
        let mut out = String::with_capacity(self.raw.len() + directive.len() + 16);
        for (i, line) in self.lines.iter().enumerate() {
            if i + 1 == target_line {
                out.push_str(directive);
                out.push('\n');
            }
            if line.contains(thread_define) {
                out.push_str(thread_define);
                out.push(' ');
                out.push_str(&threads.to_string());
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    }

    /// Overwrite `path` with one mutated variant.
    pub fn apply(
        &self,
        path: &Path,
        thread_define: &str,
        threads: usize,
        target_line: usize,
        directive: &str,
    ) -> Result<()> {
        let text = self.render(thread_define, threads, target_line, directive);
        fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    /// Put the original bytes back on disk.
    pub fn restore(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.raw).map_err(|e| Error::io(path, e))
    }

    /// Apply a variant, run `f`, then restore regardless of what happened.
    /// The first error wins: a failed apply or `f` is reported even when the
    /// restore after it also fails.
    pub fn with_configuration<T, F>(
        &self,
        path: &Path,
        thread_define: &str,
        threads: usize,
        target_line: usize,
        directive: &str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let outcome = self
            .apply(path, thread_define, threads, target_line, directive)
            .and_then(|()| f());
        let restored = self.restore(path);
        let value = outcome?;
        restored?;
        Ok(value)
    }
}
