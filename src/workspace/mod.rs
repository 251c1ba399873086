//! Workspace root and its hidden `.mgit/` state directory.
//!
//! Layout:
//! - `.mgit/alias`      folder=alias lines
//! - `.mgit/exclude`    glob patterns
//! - `.mgit/cache.json` result cache
//! - `.mgit/cache.lock` advisory lock taken while the cache file is rewritten
pub mod alias;
pub mod exclude;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use alias::AliasMap;
pub use exclude::ExcludeSet;

use crate::errors::StartupError;

pub const STATE_DIR_NAME: &str = ".mgit";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Validate and canonicalize the root. A missing or non-directory root is FatalStartup.
    pub fn open(root: &Path) -> Result<Self, StartupError> {
        let meta = fs::metadata(root).map_err(|e| StartupError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(StartupError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn ensure_state_dir(&self) -> io::Result<PathBuf> {
        let dir = self.state_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn alias_path(&self) -> PathBuf {
        self.state_dir().join("alias")
    }

    pub fn exclude_path(&self) -> PathBuf {
        self.state_dir().join("exclude")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.state_dir().join("cache.json")
    }

    pub fn aliases(&self) -> AliasMap {
        AliasMap::load(&self.alias_path())
    }

    pub fn excludes(&self) -> ExcludeSet {
        ExcludeSet::load(&self.exclude_path())
    }
}
