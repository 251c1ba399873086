use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(mode) = cli.color {
        mgit::set_color_mode(mode);
    }
    mgit::logging::init_logging(cli.verbose);

    commands::run_fleet_command(&cli)
}
