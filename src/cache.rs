//! Persistent per-workspace result cache.
//!
//! Invariants:
//! - An entry is returned only while its stored fingerprint equals the key's fingerprint
//!   and it is younger than the freshness window. Stale entries are never returned.
//! - All access is serialized through one mutex; the file is rewritten after every mutation
//!   (temp file + atomic rename, under an fs2 lock on `cache.lock`).
//! - Unreadable or invalid storage is treated as an empty cache.
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::errors::CacheError;
use crate::operation::{OperationResult, Task};
use crate::repo::{resolve_git_dir, Repository};
use crate::util::{fnv1a_hex, secs_since_epoch};

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub task: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(repo: &Repository, task: &Task, fingerprint: String) -> Self {
        Self {
            path: repo.path.clone(),
            task: task.name().to_string(),
            fingerprint,
        }
    }

    fn path_slot(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// Seconds since the Unix epoch.
    pub recorded_at: u64,
    pub result: OperationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    /// repository path -> task name -> entry
    repositories: BTreeMap<String, BTreeMap<String, CacheEntry>>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            repositories: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct State {
    file: CacheFile,
    hits: u64,
    misses: u64,
}

#[derive(Debug)]
pub struct ResultCache {
    /// None: memory only (tests, or a workspace whose state dir cannot be created).
    path: Option<PathBuf>,
    ttl: Option<Duration>,
    inner: Mutex<State>,
}

impl ResultCache {
    /// Load the cache file at `path`. Missing means empty; corruption is logged and means empty.
    pub fn open(path: PathBuf, ttl: Option<Duration>) -> Self {
        let file = match load_file(&path) {
            Ok(f) => f,
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache unreadable; starting empty");
                CacheFile::default()
            }
        };
        Self {
            path: Some(path),
            ttl,
            inner: Mutex::new(State {
                file,
                ..State::default()
            }),
        }
    }

    pub fn in_memory(ttl: Option<Duration>) -> Self {
        Self {
            path: None,
            ttl,
            inner: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<OperationResult> {
        let now = secs_since_epoch(SystemTime::now());
        let mut st = self.state();
        let found = st
            .file
            .repositories
            .get(&key.path_slot())
            .and_then(|tasks| tasks.get(&key.task))
            .filter(|e| e.fingerprint == key.fingerprint && self.is_fresh(e, now))
            .map(|e| e.result.clone());
        if found.is_some() {
            st.hits += 1;
        } else {
            st.misses += 1;
        }
        found
    }

    fn is_fresh(&self, entry: &CacheEntry, now: u64) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => now.saturating_sub(entry.recorded_at) <= ttl.as_secs(),
        }
    }

    pub fn put(&self, key: &CacheKey, result: OperationResult) {
        self.put_at(key, result, secs_since_epoch(SystemTime::now()));
    }

    fn put_at(&self, key: &CacheKey, result: OperationResult, recorded_at: u64) {
        let mut st = self.state();
        st.file
            .repositories
            .entry(key.path_slot())
            .or_default()
            .insert(
                key.task.clone(),
                CacheEntry {
                    fingerprint: key.fingerprint.clone(),
                    recorded_at,
                    result,
                },
            );
        self.flush(&st);
    }

    /// Drop every entry for one repository.
    pub fn invalidate(&self, path: &Path) {
        let mut st = self.state();
        if st
            .file
            .repositories
            .remove(path.to_string_lossy().as_ref())
            .is_some()
        {
            tracing::debug!(path = %path.display(), "cache invalidated");
            self.flush(&st);
        }
    }

    pub fn clear(&self) {
        let mut st = self.state();
        st.file = CacheFile::default();
        self.flush(&st);
    }

    pub fn stats(&self) -> CacheStats {
        let st = self.state();
        CacheStats {
            hits: st.hits,
            misses: st.misses,
            entries: st.file.repositories.values().map(BTreeMap::len).sum(),
        }
    }

    /// Called with the state lock held, so writers never interleave.
    fn flush(&self, st: &State) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(e) = write_file(path, &st.file) {
            tracing::warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }
}

fn load_file(path: &Path) -> Result<CacheFile, CacheError> {
    let text = fs::read_to_string(path)?;
    let file: CacheFile = serde_json::from_str(&text)?;
    if file.version != CACHE_FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion(file.version));
    }
    Ok(file)
}

fn write_file(path: &Path, file: &CacheFile) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let lock = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(dir.join("cache.lock"))?;
    lock.lock_exclusive()?;

    let result = (|| -> Result<(), CacheError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, file)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    })();

    let _ = lock.unlock();
    result
}

/// Digest of the on-disk state that local status depends on: HEAD, index, refs,
/// packed-refs (also in the common dir of linked worktrees) and the working-tree root.
/// None when the directory is no longer a repository.
pub fn repo_fingerprint(repo_path: &Path) -> Option<String> {
    let git_dir = resolve_git_dir(repo_path)?;
    let mut parts: Vec<String> = Vec::new();

    let mut push_mtime = |label: &str, p: &Path| {
        if let Some(ns) = mtime_nanos(p) {
            parts.push(format!("{label}={ns}"));
        }
    };
    push_mtime("worktree", repo_path);
    push_mtime("HEAD", &git_dir.join("HEAD"));
    push_mtime("index", &git_dir.join("index"));

    let mut ref_dirs = vec![git_dir.clone()];
    if let Ok(common) = fs::read_to_string(git_dir.join("commondir")) {
        let c = PathBuf::from(common.trim());
        ref_dirs.push(if c.is_absolute() { c } else { git_dir.join(c) });
    }
    for base in &ref_dirs {
        push_mtime("packed-refs", &base.join("packed-refs"));
        for entry in WalkDir::new(base.join("refs"))
            .sort_by_file_name()
            .into_iter()
            .flatten()
        {
            if entry.file_type().is_file() {
                let label = entry.path().to_string_lossy().to_string();
                push_mtime(&label, entry.path());
            }
        }
    }
    if let Ok(head) = fs::read_to_string(git_dir.join("HEAD")) {
        parts.push(format!("head-ref={}", head.trim()));
    }

    Some(fnv1a_hex(parts.iter().map(|s| s.as_bytes())))
}

fn mtime_nanos(p: &Path) -> Option<u128> {
    let m = fs::metadata(p).ok()?.modified().ok()?;
    m.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_nanos())
}
