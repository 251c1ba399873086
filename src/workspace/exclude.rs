//! `.mgit/exclude`: one glob pattern per line.
use std::fs;
use std::io;
use std::path::Path;

use glob::Pattern;

/// Ordered exclude patterns. A repository is excluded when its folder name or its
/// root-relative path matches any pattern.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Parse exclude text. Blank lines and `#` comments are ignored; invalid globs are
    /// logged and skipped.
    pub fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Pattern::new(line) {
                Ok(p) => patterns.push(p),
                Err(e) => tracing::warn!(pattern = line, error = %e, "ignoring invalid exclude pattern"),
            }
        }
        Self { patterns }
    }

    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::parse(&text)
    }

    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable exclude file");
                Self::default()
            }
        }
    }

    /// `rel_path` uses `/` separators regardless of platform.
    pub fn is_excluded(&self, folder_name: &str, rel_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches(folder_name) || p.matches(rel_path))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
