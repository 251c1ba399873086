//! mgit: run git status, checkout and pull across every repository under a workspace root.
//!
//! Data flow: [`scanner`] finds repositories, [`scheduler`] runs a local phase then a
//! network phase over them (consulting [`cache`] for local status), and [`render`] draws the
//! results in scan order as they complete. [`fleet`] wires the pieces for one invocation.
pub mod cache;
pub mod color;
pub mod config;
pub mod errors;
pub mod fleet;
pub mod logging;
pub mod operation;
pub mod preflight;
pub mod render;
pub mod repo;
pub mod scanner;
pub mod scheduler;
pub mod signal;
pub mod util;
pub mod workspace;

pub use cache::{repo_fingerprint, CacheKey, CacheStats, ResultCache};
pub use color::{
    color_enabled_stderr, color_enabled_stdout, log_error_stderr, log_info_stderr,
    log_warn_stderr, paint, set_color_mode, ColorMode,
};
pub use config::FleetConfig;
pub use errors::{
    exit_code_for_startup_error, FailureKind, OperationFailure, ScanWarning, StartupError,
    EXIT_FAILURES, EXIT_INTERRUPTED, EXIT_OK,
};
pub use fleet::{execute, run_fleet, FleetCommand, FleetOptions};
pub use operation::{
    GitRunner, LocalStatus, OperationResult, Payload, Phase, RemoteStatus, SyncState, Task,
    TaskRunner,
};
pub use render::{ProgressRenderer, RenderOptions};
pub use repo::Repository;
pub use scanner::{RepoScanner, ScanOptions, ScanReport};
pub use scheduler::{
    CancelToken, FleetEvent, FleetPlan, FleetRun, FleetScheduler, RepoOutcome, RunSummary,
    SkipReason, TaskState, Verdict,
};
pub use workspace::{AliasMap, ExcludeSet, Workspace};
