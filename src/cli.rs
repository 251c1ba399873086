use std::path::PathBuf;

use clap::{Parser, Subcommand};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt:  ",
    env!("MGIT_BUILD_DATE"),
    "\ntarget: ",
    env!("MGIT_BUILD_TARGET"),
    "\nrustc:  ",
    env!("MGIT_BUILD_RUSTC"),
);

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Show branch, unstaged changes, open pull request and sync state (default)
    Status,
    /// Switch every repository to a branch; falls back to origin/<branch>, then creates it
    Checkout {
        /// Branch to switch to
        branch: String,
        /// Fail instead of creating the branch when neither a local nor a remote one exists
        #[arg(long = "no-create")]
        no_create: bool,
    },
    /// Pull every repository
    Pull,
}

#[derive(Parser, Debug)]
#[command(
    name = "mgit",
    version,
    long_version = LONG_VERSION,
    about = "Run git status, checkout and pull across all repositories in a workspace.",
    after_long_help = "Workspace files:\n  .mgit/alias     folder=Display Name lines\n  .mgit/exclude   one glob per line (matched against folder name and relative path)\n  .mgit/cache.json  cached local status (see --clear-cache)\n\nExamples:\n  mgit\n  mgit --local-only\n  mgit checkout feature/login\n  mgit --no-parallel pull\n"
)]
pub(crate) struct Cli {
    /// Show folder names instead of aliases
    #[arg(long, global = true)]
    pub(crate) names: bool,

    /// Drop all cached results before running
    #[arg(long = "clear-cache", global = true)]
    pub(crate) clear_cache: bool,

    /// Run one repository at a time, in display order
    #[arg(long = "no-parallel", global = true)]
    pub(crate) no_parallel: bool,

    /// Worker threads for the local phase (default 8, or MGIT_JOBS)
    #[arg(long, short = 'j', global = true, value_parser = clap::value_parser!(u64).range(1..=256))]
    pub(crate) jobs: Option<u64>,

    /// Status only: skip fetch, sync and pull request lookups
    #[arg(long = "local-only", global = true)]
    pub(crate) local_only: bool,

    /// Workspace root (default: current directory)
    #[arg(long, global = true)]
    pub(crate) root: Option<PathBuf>,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<mgit::ColorMode>,

    /// Debug logging and cache statistics on stderr
    #[arg(long, short = 'v', global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_default_and_flags_are_global() {
        let cli = Cli::try_parse_from(["mgit", "--names", "-j", "3"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(cli.names);
        assert_eq!(cli.jobs, Some(3));

        let cli = Cli::try_parse_from(["mgit", "checkout", "dev", "--no-create", "--no-parallel"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Checkout {
                branch: "dev".to_string(),
                no_create: true
            })
        );
        assert!(cli.no_parallel);
    }

    #[test]
    fn test_jobs_must_be_positive() {
        assert!(Cli::try_parse_from(["mgit", "--jobs", "0"]).is_err());
        assert!(Cli::try_parse_from(["mgit", "checkout"]).is_err());
    }
}
