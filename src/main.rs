//! Command-line entry point for blueprint.

use std::process::ExitCode;

use clap::Parser;

use blueprint_cli::cli::{self, Command};
use blueprint_cli::commands;
use blueprint_cli::logging::{self, Logger};

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose, args.command.name());
    let log = Logger::new(args.command.name());

    let result = match &args.command {
        Command::Apply(opts) => commands::apply::run(&args.global, opts, &log),
        Command::Plan(opts) => commands::apply::plan(&args.global, opts, &log),
        Command::Status(opts) => commands::status::run(&args.global, opts, &log),
        Command::Completions { shell } => {
            commands::completions::run(*shell);
            Ok(true)
        }
        Command::Version => {
            commands::version::run();
            Ok(true)
        }
    };

    if let Err(e) = &result {
        log.error(&format!("{e:#}"));
    }
    commands::exit_code(&result)
}
