//! Repository identity and git metadata location.
use std::fs;
use std::path::{Path, PathBuf};

/// One discovered checkout. Identity is the absolute path; everything else is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub path: PathBuf,
    /// Root-relative path with `/` separators; also the stable sort key.
    pub rel_path: String,
    pub folder_name: String,
    /// Alias, or the folder name when no alias applies.
    pub display_name: String,
}

impl Repository {
    pub fn new(path: PathBuf, rel_path: String, display_name: String) -> Self {
        let folder_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_path.clone());
        Self {
            path,
            rel_path,
            folder_name,
            display_name,
        }
    }

    pub fn git_dir(&self) -> Option<PathBuf> {
        resolve_git_dir(&self.path)
    }

    pub fn is_repository(&self) -> bool {
        self.git_dir().is_some()
    }
}

/// Locate the git metadata directory of a working tree: `.git/` itself, or the target of a
/// `.git` file of the form `gitdir: <path>` (linked worktrees, submodules).
pub fn resolve_git_dir(dir: &Path) -> Option<PathBuf> {
    let dot = dir.join(".git");
    let meta = fs::metadata(&dot).ok()?;
    if meta.is_dir() {
        return Some(dot);
    }
    if !meta.is_file() {
        return None;
    }
    let text = fs::read_to_string(&dot).ok()?;
    let target = text.lines().find_map(|l| l.trim().strip_prefix("gitdir:"))?.trim();
    if target.is_empty() {
        return None;
    }
    let p = PathBuf::from(target);
    Some(if p.is_absolute() { p } else { dir.join(p) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_git_dir_directory_and_file_forms() {
        let td = tempfile::tempdir().expect("tmpdir");
        let plain = td.path().join("plain");
        fs::create_dir_all(plain.join(".git")).unwrap();
        assert_eq!(resolve_git_dir(&plain), Some(plain.join(".git")));

        let linked = td.path().join("linked");
        fs::create_dir_all(&linked).unwrap();
        fs::write(linked.join(".git"), "gitdir: ../plain/.git/worktrees/linked\n").unwrap();
        assert_eq!(
            resolve_git_dir(&linked),
            Some(linked.join("../plain/.git/worktrees/linked"))
        );

        let none = td.path().join("none");
        fs::create_dir_all(&none).unwrap();
        assert_eq!(resolve_git_dir(&none), None);
    }

    #[test]
    fn test_folder_name_is_last_component() {
        let r = Repository::new(
            PathBuf::from("/ws/group/api"),
            "group/api".to_string(),
            "API".to_string(),
        );
        assert_eq!(r.folder_name, "api");
        assert_eq!(r.display_name, "API");
    }
}
