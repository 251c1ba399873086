use std::path::PathBuf;
use std::process::ExitCode;

use mgit::{FleetCommand, FleetConfig, FleetOptions, StartupError};

use crate::cli::{Cli, Command};

fn options_from_cli(cli: &Cli, cwd: PathBuf) -> FleetOptions {
    let command = match cli.command.clone().unwrap_or(Command::Status) {
        Command::Status => FleetCommand::Status,
        Command::Checkout { branch, no_create } => FleetCommand::Checkout {
            branch,
            create: !no_create,
        },
        Command::Pull => FleetCommand::Pull,
    };
    FleetOptions {
        root: cli.root.clone().unwrap_or(cwd),
        command,
        use_real_names: cli.names,
        clear_cache: cli.clear_cache,
        no_parallel: cli.no_parallel,
        jobs: cli.jobs.map(|j| j as usize),
        local_only: cli.local_only,
        verbose: cli.verbose,
    }
}

/// Run status/checkout/pull and map the outcome to the process exit code.
pub fn run_fleet_command(cli: &Cli) -> ExitCode {
    let use_err = mgit::color_enabled_stderr();
    let cwd = match std::env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            mgit::log_error_stderr(use_err, &format!("mgit: cannot determine current directory: {e}"));
            return ExitCode::from(mgit::errors::exit_code_for_io_error(&e));
        }
    };
    let opts = options_from_cli(cli, cwd);
    if cli.verbose {
        mgit::log_info_stderr(use_err, &format!("mgit: workspace {}", opts.root.display()));
    }

    match mgit::run_fleet(&opts, FleetConfig::from_env()) {
        Ok(run) => {
            if run.interrupted {
                mgit::log_warn_stderr(use_err, "mgit: interrupted");
            }
            ExitCode::from(run.exit_code())
        }
        Err(e) => {
            mgit::log_error_stderr(use_err, &format!("mgit: error: {e:#}"));
            let code = e
                .downcast_ref::<StartupError>()
                .map(mgit::exit_code_for_startup_error)
                .unwrap_or(mgit::EXIT_FAILURES);
            ExitCode::from(code)
        }
    }
}
