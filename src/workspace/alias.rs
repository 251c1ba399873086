//! `.mgit/alias`: `folder_name=display_alias` per line.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Folder name -> display alias. Read-only for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    aliases: BTreeMap<String, String>,
}

impl AliasMap {
    /// Parse alias text. Blank lines, `#` comments and lines without `=` are ignored;
    /// keys and values are trimmed; a later duplicate key overrides an earlier one.
    pub fn parse(text: &str) -> Self {
        let mut aliases = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((folder, alias)) = line.split_once('=') {
                let folder = folder.trim();
                let alias = alias.trim();
                if folder.is_empty() || alias.is_empty() {
                    continue;
                }
                aliases.insert(folder.to_string(), alias.to_string());
            }
        }
        Self { aliases }
    }

    /// Load from a file; a missing file is an empty map, an unreadable one is logged and empty.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable alias file");
                Self::default()
            }
        }
    }

    pub fn get(&self, folder: &str) -> Option<&str> {
        self.aliases.get(folder).map(String::as_str)
    }

    /// Alias when known and not overridden by `use_real_names`; the folder name otherwise.
    pub fn display_name(&self, folder: &str, use_real_names: bool) -> String {
        if use_real_names {
            return folder.to_string();
        }
        self.get(folder).unwrap_or(folder).to_string()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
