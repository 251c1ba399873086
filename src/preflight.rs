//! Startup checks for the external programs.
use std::path::PathBuf;

use crate::errors::StartupError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programs {
    pub git: PathBuf,
    /// Hosting CLI; only the PR and web-URL columns depend on it.
    pub gh: Option<PathBuf>,
}

/// Resolve git and gh from PATH. Missing git aborts; missing gh is reported and tolerated.
pub fn locate_programs() -> Result<Programs, StartupError> {
    locate_with(|name| which::which(name).ok())
}

pub fn locate_with<F>(find: F) -> Result<Programs, StartupError>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let git = find("git").ok_or(StartupError::MissingProgram { program: "git" })?;
    let gh = find("gh");
    match &gh {
        Some(p) => tracing::debug!(gh = %p.display(), "hosting cli found"),
        None => tracing::info!("gh not found in PATH; pull request and web URL columns stay empty"),
    }
    tracing::debug!(git = %git.display(), "git found");
    Ok(Programs { git, gh })
}
