//! Repository discovery under a workspace root.
//!
//! Rules:
//! - Walk at most `max_depth` levels below the root; hidden (`.`-prefixed) directories are skipped.
//! - A directory holding a `.git` marker is a repository root; its subdirectories are not descended.
//! - Excluded directories are pruned before the marker check.
//! - Unreadable directories become [`ScanWarning`]s; the walk continues.
//! - Output is sorted by root-relative path so display order is stable across runs.
//! - Repository paths are canonical; a symlink to an already listed checkout is dropped.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::ScanWarning;
use crate::repo::{resolve_git_dir, Repository};
use crate::workspace::{AliasMap, ExcludeSet};

pub const DEFAULT_SCAN_DEPTH: usize = 1;
pub const MAX_SCAN_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub max_depth: usize,
    pub use_real_names: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_SCAN_DEPTH,
            use_real_names: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub repositories: Vec<Repository>,
    pub warnings: Vec<ScanWarning>,
    /// Directories pruned by an exclude pattern.
    pub excluded: usize,
}

pub struct RepoScanner<'a> {
    aliases: &'a AliasMap,
    excludes: &'a ExcludeSet,
    options: ScanOptions,
}

impl<'a> RepoScanner<'a> {
    pub fn new(aliases: &'a AliasMap, excludes: &'a ExcludeSet, options: ScanOptions) -> Self {
        Self {
            aliases,
            excludes,
            options,
        }
    }

    pub fn scan(&self, root: &Path) -> ScanReport {
        let mut report = ScanReport::default();
        let depth = self.options.max_depth.clamp(1, MAX_SCAN_DEPTH);
        let mut it = WalkDir::new(root)
            .min_depth(1)
            .max_depth(depth)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = it.next() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    let detail = e
                        .io_error()
                        .map(|io| io.to_string())
                        .unwrap_or_else(|| e.to_string());
                    tracing::warn!(path = %path.display(), %detail, "skipping unreadable directory");
                    report.warnings.push(ScanWarning { path, detail });
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                it.skip_current_dir();
                continue;
            }
            let rel_path = relative_slash_path(root, entry.path());
            if self.excludes.is_excluded(&name, &rel_path) {
                tracing::debug!(path = %rel_path, "excluded");
                report.excluded += 1;
                it.skip_current_dir();
                continue;
            }
            if resolve_git_dir(entry.path()).is_some() {
                let shown = self.aliases.display_name(&name, self.options.use_real_names);
                tracing::debug!(path = %rel_path, name = %shown, "found repository");
                let path = fs::canonicalize(entry.path())
                    .unwrap_or_else(|_| entry.path().to_path_buf());
                report.repositories.push(Repository::new(path, rel_path, shown));
                it.skip_current_dir();
            }
        }

        report
            .repositories
            .sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        let mut seen = HashSet::new();
        report.repositories.retain(|r| {
            let first = seen.insert(r.path.clone());
            if !first {
                tracing::debug!(
                    path = %r.rel_path,
                    target = %r.path.display(),
                    "duplicate checkout skipped"
                );
            }
            first
        });
        report
    }
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
