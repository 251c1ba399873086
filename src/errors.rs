//! Error taxonomy and exit-code mapping.
//! - Per-repository failures are values ([`OperationFailure`]) attached to that repository's result.
//! - Scan and cache problems are warnings; the run continues.
//! - Only [`StartupError`] aborts, and only before any work is scheduled.
//! - Map io::ErrorKind::NotFound and missing programs to exit code 127; other startup errors to 1.
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every repository succeeded.
pub const EXIT_OK: u8 = 0;
/// At least one repository failed or was skipped.
pub const EXIT_FAILURES: u8 = 1;
/// Run was interrupted (SIGINT); partial results were still rendered.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// A directory that could not be read while scanning. Skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {detail}", path.display())]
pub struct ScanWarning {
    pub path: PathBuf,
    pub detail: String,
}

/// Unreadable or invalid cache storage. Callers treat the cache as empty.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o: {0}")]
    Io(#[from] io::Error),
    #[error("cache file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported cache format version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    CommandError,
    Timeout,
    NotARepository,
    BranchNotFound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CommandError => "command-error",
            FailureKind::Timeout => "timeout",
            FailureKind::NotARepository => "not-a-repository",
            FailureKind::BranchNotFound => "branch-not-found",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one task against one repository. Isolated: never aborts the fleet run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{task} in {}: {kind}: {detail}", repository.display())]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub task: String,
    pub repository: PathBuf,
    pub exit_code: Option<i32>,
    pub detail: String,
}

/// Conditions that abort before scheduling begins.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{program} is required for this command and was not found in PATH")]
    MissingProgram { program: &'static str },
    #[error("workspace root {} is not usable: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convert StartupError to exit code (parity with io::Error mapping).
pub fn exit_code_for_startup_error(e: &StartupError) -> u8 {
    match e {
        StartupError::MissingProgram { .. } => 127,
        StartupError::InvalidRoot { .. } => 1,
        StartupError::Io(ioe) => exit_code_for_io_error(ioe),
    }
}
