//! Commands: apply a blueprint, or print its plan.
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{BlueprintOpts, GlobalOpts};
use crate::engine::Engine;
use crate::exec::SystemExecutor;
use crate::logging::Logger;
use crate::session::DialoguerPrompter;

/// Run the `apply` command.
///
/// With `--dry-run` the plan is printed and nothing is executed. Returns
/// whether every rule succeeded.
///
/// # Errors
///
/// Returns an error if the blueprint cannot be parsed or resolved, or the
/// status file cannot be read or written.
#[allow(clippy::print_stdout)]
pub fn run(global: &GlobalOpts, opts: &BlueprintOpts, log: &Logger) -> Result<bool> {
    let setup = CommandSetup::init(global, log)?;
    let status_path = setup.status_path.clone();
    let engine = engine(setup);
    let plan = engine.plan(&opts.file, &status_path, log)?;

    if global.dry_run {
        log.dry_run(&format!("{} rule(s) would run", plan.rules.len()));
        print!("{}", engine.render(&plan));
        return Ok(true);
    }

    let report = engine.apply(&plan, &status_path, log)?;
    log.print_summary();
    Ok(report.is_success())
}

/// Run the `plan` command: resolve and print, never execute.
///
/// # Errors
///
/// Returns an error if the blueprint cannot be parsed or resolved, or the
/// status file cannot be read.
#[allow(clippy::print_stdout)]
pub fn plan(global: &GlobalOpts, opts: &BlueprintOpts, log: &Logger) -> Result<bool> {
    let setup = CommandSetup::init(global, log)?;
    let status_path = setup.status_path.clone();
    let engine = engine(setup);
    let plan = engine.plan(&opts.file, &status_path, log)?;
    print!("{}", engine.render(&plan));
    Ok(true)
}

fn engine(setup: CommandSetup) -> Engine {
    Engine::new(
        Arc::new(SystemExecutor),
        Arc::new(DialoguerPrompter),
        setup.platform,
        setup.settings,
    )
}
